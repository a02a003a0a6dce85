use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_CHAIN_PATH: &str = "blockchain.json";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

pub const GREETING_PREFIX: &str = "owonero-daemon height=";

/// Upper bound for one protocol line; a full `getchain` reply must fit.
pub const MAX_LINE_BYTES: usize = 256 * 1024 * 1024;

pub const SYNC_CHUNK_SIZE: u64 = 100;
pub const PEER_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const SERVICE_QUEUE_DEPTH: usize = 256;
pub const POOL_ROUND_PAUSE: Duration = Duration::from_secs(1);
