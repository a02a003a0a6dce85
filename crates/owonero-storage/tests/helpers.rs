#![allow(dead_code)]

use std::fs;

use owonero_core::{genesis_block, pow::mine_block, Block, Transaction};
use owonero_storage::sled_store::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let store = SledStore::open(temp_dir.path()).expect("Failed to open SledStore");
    (temp_dir, store)
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Genesis followed by `len - 1` blocks mined at difficulty 0.
pub fn linked_chain(len: usize) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    while chain.len() < len {
        let parent = chain.last().expect("chain is never empty");
        let reward = Transaction::coinbase(format!("OWO-test-{}", chain.len()), 1);
        let mined = mine_block(parent, vec![reward], 0, None, || false).expect("difficulty 0 always mines");
        chain.push(mined.block);
    }
    chain
}
