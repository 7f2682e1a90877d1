use crate::table::Neighbor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Every neighbor seen on the feed, keyed by peer address. Entries are never
/// removed.
#[derive(Debug, Default)]
pub struct Registry {
    neighbors: RwLock<HashMap<String, Arc<Neighbor>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn get(&self, ip: &str) -> Option<Arc<Neighbor>> {
        self.neighbors.read().get(ip).cloned()
    }

    /// Returns the neighbor for `ip`, creating it on first use. Callers
    /// racing on a new `ip` all get the same instance: the existence check
    /// is repeated under the write lock before inserting.
    pub fn get_or_create(&self, ip: &str) -> Arc<Neighbor> {
        if let Some(neighbor) = self.get(ip) {
            return neighbor;
        }
        self.neighbors
            .write()
            .entry(ip.to_owned())
            .or_insert_with(|| Arc::new(Neighbor::new(ip)))
            .clone()
    }

    pub fn set_state(&self, ip: &str, state: impl Into<String>) {
        self.get_or_create(ip).set_state(state);
    }

    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }

    /// All neighbors ordered by address string.
    pub fn neighbors(&self) -> Vec<Arc<Neighbor>> {
        let mut neighbors: Vec<_> = self.neighbors.read().values().cloned().collect();
        neighbors.sort_by(|a, b| a.ip().cmp(b.ip()));
        neighbors
    }
}
