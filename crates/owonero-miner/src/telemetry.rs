use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One day of one-second samples.
pub const HISTORY_CAP: usize = 86_400;
const REPORT_EVERY: u64 = 10;

/// Per-second attempt counts, newest last.
#[derive(Clone, Debug, Default)]
pub struct HashrateWindow {
    samples: VecDeque<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Hashrates {
    pub current: u64,
    pub minute: f64,
    pub hour: f64,
    pub day: f64,
}

impl HashrateWindow {
    pub fn push(&mut self, attempts: u64) {
        self.samples.push_back(attempts);
        while self.samples.len() > HISTORY_CAP {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the newest `n` samples, or of all when fewer exist.
    pub fn average(&self, n: usize) -> f64 {
        let n = n.min(self.samples.len());
        if n == 0 {
            return 0.0;
        }
        self.samples.iter().rev().take(n).sum::<u64>() as f64 / n as f64
    }

    pub fn rates(&self) -> Hashrates {
        Hashrates {
            current: self.samples.back().copied().unwrap_or(0),
            minute: self.average(60),
            hour: self.average(3_600),
            day: self.average(HISTORY_CAP),
        }
    }
}

/// Drain `attempts` once a second into a window and log the moving averages.
pub fn spawn_telemetry(attempts: Arc<AtomicU64>, cancel: CancellationToken) -> tokio::task::JoinHandle<HashrateWindow> {
    tokio::spawn(async move {
        let mut window = HashrateWindow::default();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    window.push(attempts.swap(0, Ordering::Relaxed));
                    ticks += 1;
                    let r = window.rates();
                    debug!(hps = r.current, "hashrate sample");
                    if ticks % REPORT_EVERY == 0 {
                        info!(
                            hps = r.current,
                            avg_1m = r.minute,
                            avg_1h = r.hour,
                            avg_24h = r.day,
                            "hashrate"
                        );
                    }
                }
            }
        }
        window
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_use_available_samples() {
        let mut w = HashrateWindow::default();
        assert_eq!(w.rates(), Hashrates::default());
        for n in [10, 20, 30] {
            w.push(n);
        }
        let r = w.rates();
        assert_eq!(r.current, 30);
        assert_eq!(r.minute, 20.0);
        assert_eq!(r.hour, 20.0);
        assert_eq!(r.day, 20.0);
    }

    #[test]
    fn minute_average_looks_at_newest_sixty() {
        let mut w = HashrateWindow::default();
        for _ in 0..60 {
            w.push(0);
        }
        for _ in 0..60 {
            w.push(100);
        }
        assert_eq!(w.average(60), 100.0);
        assert_eq!(w.rates().hour, 50.0);
    }

    #[test]
    fn history_is_capped() {
        let mut w = HashrateWindow::default();
        for i in 0..(HISTORY_CAP as u64 + 5) {
            w.push(i);
        }
        assert_eq!(w.len(), HISTORY_CAP);
        assert_eq!(w.samples.front().copied(), Some(5));
    }
}
