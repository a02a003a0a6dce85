use std::time::Duration;

pub const DEFAULT_NODE: &str = "127.0.0.1:6969";

pub const CANDIDATE_QUEUE_DEPTH: usize = 16;
pub const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);
pub const REJECT_BACKOFF: Duration = Duration::from_millis(200);
pub const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(2);
