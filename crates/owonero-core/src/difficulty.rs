use chrono::DateTime;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_TARGET_BLOCK_TIME, DIFFICULTY_WINDOW, MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::Block;

/// Rolling difficulty: each append past the window nudges the previous value by
/// one step toward the target block time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifficultyController {
    pub min: u32,
    pub max: u32,
    pub window: usize,
    /// Seconds.
    pub target_block_time: i64,
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self {
            min: MIN_DIFFICULTY,
            max: MAX_DIFFICULTY,
            window: DIFFICULTY_WINDOW,
            target_block_time: DEFAULT_TARGET_BLOCK_TIME,
        }
    }
}

impl DifficultyController {
    pub fn with_target_block_time(target_block_time: i64) -> Self {
        Self {
            target_block_time,
            ..Self::default()
        }
    }

    /// Average seconds per block over the last `window` blocks of `chain`, or
    /// `None` when the chain is too short or a timestamp does not parse.
    pub fn average_block_time(&self, chain: &[Block]) -> Option<i64> {
        if chain.len() <= self.window {
            return None;
        }
        let latest = &chain[chain.len() - 1];
        let earlier = &chain[chain.len() - 1 - self.window];
        let parse = |ts: &str| match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(timestamp = ts, error = %e, "unparsable block timestamp");
                None
            }
        };
        let elapsed = parse(&latest.timestamp)? - parse(&earlier.timestamp)?;
        Some(elapsed.num_seconds() / self.window as i64)
    }

    /// Difficulty required for the block after `chain`, given the value that
    /// was required for `chain`'s own tip.
    pub fn adjust(&self, current: u32, chain: &[Block]) -> u32 {
        let Some(avg) = self.average_block_time(chain) else {
            return if chain.len() <= self.window {
                self.min
            } else {
                current.clamp(self.min, self.max)
            };
        };
        let next = if avg < self.target_block_time {
            current.saturating_add(1)
        } else if avg > self.target_block_time {
            current.saturating_sub(1)
        } else {
            current
        };
        let next = next.clamp(self.min, self.max);
        debug!(avg, target = self.target_block_time, current, next, "difficulty adjusted");
        next
    }

    /// Fold `adjust` over every prefix of `chain`.
    pub fn replay(&self, chain: &[Block]) -> u32 {
        (1..=chain.len()).fold(self.min, |d, len| self.adjust(d, &chain[..len]))
    }
}
