pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Size of the hash engine scratch buffer (1 MiB).
pub const SCRATCHPAD_SIZE: usize = 1024 * 1024;
pub const ACC_SAMPLES: u64 = 8;
pub const ACC_STRIDE: u64 = 7919;

pub const GENESIS_TIMESTAMP: &str = "2025-10-11T00:00:00Z";
pub const GENESIS_SENDER: &str = "genesis";
pub const GENESIS_RECIPIENT: &str = "network";
pub const COINBASE_SENDER: &str = "coinbase";

pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 7;
pub const DIFFICULTY_WINDOW: usize = 10;
pub const DEFAULT_TARGET_BLOCK_TIME: i64 = 30;
/// Pool shares are accepted this many nibbles below the block difficulty.
pub const SHARE_DIFFICULTY_OFFSET: u32 = 2;

pub const BLOCK_REWARD: u64 = 1;
pub const POOL_REWARD: u64 = 100;
pub const POOL_ACCOUNT: &str = "pool";
