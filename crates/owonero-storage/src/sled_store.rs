use crate::BlockStorage;
use anyhow::{bail, Context, Result};
use owonero_core::{Block, ChainStore};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Blocks keyed by big-endian index so sled's ordering is chain order.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled db {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drop every block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  fn decode(ivec: IVec) -> Result<Block> {
    bincode::deserialize(&ivec).context("decoding stored block")
  }
}

impl BlockStorage for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index.to_be_bytes();
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(key, bytes)?;

    // Tip only ever moves forward.
    if self.tip_height()?.map_or(true, |h| block.index >= h) {
      self.db.insert(KEY_TIP_HEIGHT, key.to_vec())?;
      self.db.insert(KEY_TIP_HASH, block.hash.as_bytes())?;
    }

    self.db.flush()?;
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self.blocks.get(index.to_be_bytes())?.map(Self::decode).transpose()
  }

  fn tip_height(&self) -> Result<Option<u64>> {
    match self.db.get(KEY_TIP_HEIGHT)? {
      None => Ok(None),
      Some(v) => {
        let arr = <[u8; 8]>::try_from(&v[..]).context("corrupt tip height")?;
        Ok(Some(u64::from_be_bytes(arr)))
      }
    }
  }

  fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("corrupt tip hash"))
      .transpose()
  }
}

impl ChainStore for SledStore {
  fn load_chain(&self) -> Result<Option<Vec<Block>>> {
    if self.blocks.is_empty() {
      return Ok(None);
    }
    let mut chain = Vec::with_capacity(self.blocks.len());
    for entry in self.blocks.iter() {
      let (_, value) = entry?;
      let block = Self::decode(value)?;
      if block.index != chain.len() as u64 {
        bail!("sled store has a gap before block {}", block.index);
      }
      chain.push(block);
    }
    Ok(Some(chain))
  }

  /// Chains are append-only, so only blocks past the stored tip are written.
  fn save_chain(&self, chain: &[Block]) -> Result<()> {
    let start = self.tip_height()?.map_or(0, |h| h as usize + 1);
    if start > chain.len() {
      // The in-memory chain is shorter than what is stored: a wholesale resync.
      self.clear()?;
      return self.save_chain(chain);
    }
    for block in &chain[start..] {
      self.put_block(block)?;
    }
    debug!(written = chain.len() - start, "sled chain saved");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use owonero_core::genesis_block;

  #[test]
  fn empty_store_has_no_tip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledStore::open(dir.path()).unwrap();
    assert_eq!(store.tip_height().unwrap(), None);
    assert_eq!(store.tip_hash().unwrap(), None);
    assert!(store.load_chain().unwrap().is_none());
  }

  #[test]
  fn put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledStore::open(dir.path()).unwrap();
    let g = genesis_block();
    store.put_block(&g).unwrap();
    assert_eq!(store.get_block(0).unwrap(), Some(g.clone()));
    assert_eq!(store.tip_height().unwrap(), Some(0));
    assert_eq!(store.tip_hash().unwrap(), Some(g.hash));
  }
}
