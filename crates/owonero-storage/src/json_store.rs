use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owonero_core::{Block, ChainDocument, ChainStore};
use tracing::debug;

/// The `{"chain":[...]}` document on disk. Every save writes a sibling temp
/// file and renames it over the target, so readers never see a partial chain.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "chain.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ChainStore for JsonFileStore {
    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        let doc: ChainDocument = serde_json::from_slice(&data)
            .with_context(|| format!("parsing chain document {}", self.path.display()))?;
        Ok(Some(doc.chain))
    }

    fn save_chain(&self, chain: &[Block]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let doc = ChainDocument {
            chain: chain.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.tmp_path();
        {
            let mut file =
                fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = %self.path.display(), blocks = chain.len(), "chain saved");
        Ok(())
    }
}
