use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use owonero_core::constants::DEFAULT_TARGET_BLOCK_TIME;
use owonero_core::DifficultyController;
use owonero_storage::StoreKind;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{DEFAULT_CHAIN_PATH, DEFAULT_CONFIG_PATH, DEFAULT_PORT, DEFAULT_SYNC_INTERVAL_SECS};

#[derive(Parser, Debug)]
#[command(name = "owonero-node", about = "Owonero proof-of-work node")]
pub struct Args {
    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Chain file (json) or directory (sled)
    #[arg(long)]
    pub chain: Option<PathBuf>,

    /// Storage backend: json or sled
    #[arg(long)]
    pub store: Option<StoreKind>,

    /// Comma-separated peers, host:port
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Peer to sync from at startup
    #[arg(short, long)]
    pub node: Option<String>,

    /// Start with an empty chain instead of creating genesis
    #[arg(long)]
    pub no_init: bool,

    /// Mine pool blocks and accept shares
    #[arg(long)]
    pub pool: bool,

    /// Disable periodic sync
    #[arg(long)]
    pub standalone: bool,

    /// Target seconds between blocks
    #[arg(long)]
    pub target_block_time: Option<i64>,

    /// Seconds between sync rounds
    #[arg(long)]
    pub sync_interval: Option<u64>,
}

/// On-disk node settings. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub daemon_port: u16,
    pub peers: Vec<String>,
    pub target_block_time: i64,
    pub sync_interval_secs: u64,
    pub chain_path: PathBuf,
    pub store: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            daemon_port: DEFAULT_PORT,
            peers: Vec::new(),
            target_block_time: DEFAULT_TARGET_BLOCK_TIME,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            chain_path: PathBuf::from(DEFAULT_CHAIN_PATH),
            store: "json".to_string(),
        }
    }
}

impl NodeConfig {
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Fully resolved runtime settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub listen: String,
    pub port: u16,
    pub chain_path: PathBuf,
    pub store: StoreKind,
    pub peers: Vec<String>,
    pub no_init: bool,
    pub pool: bool,
    pub standalone: bool,
    pub controller: DifficultyController,
    pub sync_interval: Duration,
}

impl Settings {
    pub fn resolve(args: Args) -> Result<Self> {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = NodeConfig::load(&config_path)?;
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: NodeConfig) -> Result<Self> {
        let store = match args.store {
            Some(kind) => kind,
            None => file.store.parse()?,
        };
        let mut peers = file.peers;
        peers.extend(args.peers);
        peers.extend(args.node);
        peers.retain(|p| !p.trim().is_empty());
        peers.dedup();
        Ok(Self {
            listen: args.listen,
            port: args.port.unwrap_or(file.daemon_port),
            chain_path: args.chain.unwrap_or(file.chain_path),
            store,
            peers,
            no_init: args.no_init,
            pool: args.pool,
            standalone: args.standalone,
            controller: DifficultyController::with_target_block_time(
                args.target_block_time.unwrap_or(file.target_block_time),
            ),
            sync_interval: Duration::from_secs(args.sync_interval.unwrap_or(file.sync_interval_secs).max(1)),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}
