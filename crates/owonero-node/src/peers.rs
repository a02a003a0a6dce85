use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

/// Known peer addresses. Insertion order is kept and adds are idempotent.
/// Reads hand out copies, never a live view.
#[derive(Clone, Debug, Default)]
pub struct PeerRegistry {
    inner: Arc<RwLock<Vec<String>>>,
}

impl PeerRegistry {
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        let registry = Self::default();
        for addr in initial {
            registry.add(&addr);
        }
        registry
    }

    /// Returns `false` for blank or already-known addresses.
    pub fn add(&self, addr: &str) -> bool {
        let addr = addr.trim();
        if addr.is_empty() {
            return false;
        }
        let mut peers = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if peers.iter().any(|p| p == addr) {
            return false;
        }
        peers.push(addr.to_string());
        info!(peer = addr, "peer added");
        true
    }

    pub fn remove(&self, addr: &str) -> bool {
        let addr = addr.trim();
        let mut peers = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = peers.len();
        peers.retain(|p| p != addr);
        let removed = peers.len() != before;
        if removed {
            info!(peer = addr, "peer removed");
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Addresses of miners that announced themselves with `mineractive`.
#[derive(Clone, Debug, Default)]
pub struct MinerRoster {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl MinerRoster {
    pub fn register(&self, addr: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr.to_string())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let peers = PeerRegistry::default();
        assert!(peers.add("10.0.0.1:6969"));
        assert!(!peers.add("10.0.0.1:6969"));
        assert!(!peers.add(" 10.0.0.1:6969 "));
        assert_eq!(peers.snapshot(), vec!["10.0.0.1:6969".to_string()]);
    }

    #[test]
    fn blank_addresses_are_ignored() {
        let peers = PeerRegistry::default();
        assert!(!peers.add(""));
        assert!(!peers.add("   "));
        assert!(peers.is_empty());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let peers = PeerRegistry::new(["a:1".to_string(), "b:2".to_string()]);
        let snap = peers.snapshot();
        assert!(peers.remove("a:1"));
        assert!(!peers.remove("a:1"));
        assert_eq!(snap.len(), 2);
        assert_eq!(peers.snapshot(), vec!["b:2".to_string()]);
    }

    #[test]
    fn clones_share_state() {
        let peers = PeerRegistry::default();
        let other = peers.clone();
        other.add("c:3");
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn roster_dedups() {
        let roster = MinerRoster::default();
        assert!(roster.register("127.0.0.1"));
        assert!(!roster.register("127.0.0.1"));
        assert_eq!(roster.snapshot(), vec!["127.0.0.1".to_string()]);
    }
}
