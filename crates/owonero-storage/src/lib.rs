pub mod json_store;
pub mod sled_store;

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};
use owonero_core::{Block, ChainStore, DifficultyController, Ledger};

pub use json_store::JsonFileStore;
pub use sled_store::SledStore;

/// Block-at-a-time access for backends that keep blocks individually.
pub trait BlockStorage: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, index: u64) -> Result<Option<Block>>;
    /// `None` for an empty store.
    fn tip_height(&self) -> Result<Option<u64>>;
    fn tip_hash(&self) -> Result<Option<String>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Json,
    Sled,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sled" => Ok(Self::Sled),
            other => bail!("unknown store kind {other:?} (expected json or sled)"),
        }
    }
}

pub fn open_store(kind: StoreKind, path: impl AsRef<Path>) -> Result<Box<dyn ChainStore>> {
    Ok(match kind {
        StoreKind::Json => Box::new(JsonFileStore::new(path)),
        StoreKind::Sled => Box::new(SledStore::open(path)?),
    })
}

/// Load the JSON chain document at `path`, creating it with a genesis block
/// when missing.
pub fn load_from_file(path: impl AsRef<Path>, controller: DifficultyController) -> Result<Ledger> {
    Ledger::load(&JsonFileStore::new(path), controller)
}

pub fn save_to_file(ledger: &Ledger, path: impl AsRef<Path>) -> Result<()> {
    ledger.save(&JsonFileStore::new(path))
}
