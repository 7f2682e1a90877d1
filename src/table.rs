use crate::trie::PrefixTrie;
use ipnet::Ipv4Net;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

pub type Asn = u32;

// RFC 7607 reserves AS 0, so it never shows up as a real origin. Routes
// announced without an AS path are indexed under it.
pub const UNATTRIBUTED_ASN: Asn = 0;

/// AS path attribute of one update message. The last element is the
/// originating AS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AsPath {
    asns: Vec<Asn>,
}

impl AsPath {
    pub fn new(asns: Vec<Asn>) -> AsPath {
        AsPath { asns }
    }

    pub fn asns(&self) -> &[Asn] {
        &self.asns
    }

    pub fn primary(&self) -> Option<Asn> {
        self.asns.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.asns.is_empty()
    }
}

impl From<Vec<Asn>> for AsPath {
    fn from(asns: Vec<Asn>) -> Self {
        AsPath::new(asns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: Ipv4Net,
    pub as_path: Arc<AsPath>,
    pub primary_asn: Option<Asn>,
    pub options: BTreeMap<String, String>,
}

impl Route {
    pub fn new(prefix: Ipv4Net, as_path: Arc<AsPath>) -> Route {
        Route {
            prefix: prefix.trunc(),
            primary_asn: as_path.primary(),
            as_path,
            options: BTreeMap::new(),
        }
    }

    fn index_asn(&self) -> Asn {
        self.primary_asn.unwrap_or(UNATTRIBUTED_ASN)
    }
}

/// Routes learned from one neighbor, plus the origin indices built from them.
///
/// A prefix is in the trie iff it is in `prefix_asn` iff it is in the
/// `asn_prefixes` set of that ASN. Every method leaves the three structures
/// in agreement before returning.
#[derive(Debug, Default)]
pub struct NeighborRib {
    trie: PrefixTrie<Route>,
    prefix_asn: HashMap<Ipv4Net, Asn>,
    asn_prefixes: HashMap<Asn, BTreeSet<Ipv4Net>>,
}

impl NeighborRib {
    pub fn new() -> NeighborRib {
        NeighborRib::default()
    }

    /// Installs a route for `prefix`, replacing whatever was there. Returns
    /// the replaced route.
    pub fn announce(&mut self, prefix: Ipv4Net, as_path: Arc<AsPath>) -> Option<Route> {
        let route = Route::new(prefix, as_path);
        let prefix = route.prefix;
        let asn = route.index_asn();

        if let Some(prev_asn) = self.prefix_asn.insert(prefix, asn) {
            if prev_asn != asn {
                self.unindex(prev_asn, &prefix);
            }
        }
        self.asn_prefixes.entry(asn).or_default().insert(prefix);
        self.trie.insert(prefix, route)
    }

    /// Removes the route for `prefix`. `None` means nothing was announced for
    /// it.
    pub fn withdraw(&mut self, prefix: &Ipv4Net) -> Option<Route> {
        let prefix = prefix.trunc();
        let route = self.trie.remove(&prefix);
        if let Some(asn) = self.prefix_asn.remove(&prefix) {
            self.unindex(asn, &prefix);
        }
        route
    }

    fn unindex(&mut self, asn: Asn, prefix: &Ipv4Net) {
        if let Some(prefixes) = self.asn_prefixes.get_mut(&asn) {
            prefixes.remove(prefix);
            if prefixes.is_empty() {
                self.asn_prefixes.remove(&asn);
            }
        }
    }

    pub fn prefix_count(&self) -> usize {
        self.prefix_asn.len()
    }

    pub fn asn_count(&self) -> usize {
        self.asn_prefixes.len()
    }

    pub fn route(&self, prefix: &Ipv4Net) -> Option<&Route> {
        self.trie.get(prefix)
    }

    pub fn longest_match(&self, addr: Ipv4Addr) -> Option<&Route> {
        self.trie.longest_match(addr).map(|(_, route)| route)
    }

    pub fn asn_of(&self, prefix: &Ipv4Net) -> Option<Asn> {
        self.prefix_asn.get(&prefix.trunc()).copied()
    }

    /// Prefixes originated by `asn`, in address order.
    pub fn prefixes_of(&self, asn: Asn) -> Vec<Ipv4Net> {
        self.asn_prefixes
            .get(&asn)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.trie.iter().map(|(_, route)| route)
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let indexed: usize = self.asn_prefixes.values().map(BTreeSet::len).sum();
        self.trie.len() == self.prefix_asn.len()
            && indexed == self.prefix_asn.len()
            && self.asn_prefixes.values().all(|p| !p.is_empty())
            && self.trie.iter().all(|(prefix, route)| {
                self.prefix_asn.get(&prefix) == Some(&route.index_asn())
                    && self
                        .asn_prefixes
                        .get(&route.index_asn())
                        .is_some_and(|p| p.contains(&prefix))
            })
    }
}

/// Mutable part of a neighbor, only reachable through its lock.
#[derive(Debug, Default)]
pub struct Session {
    pub state: String,
    pub updates: u64,
    pub rib: NeighborRib,
}

impl Session {
    pub fn increment_updates(&mut self) -> u64 {
        self.updates += 1;
        self.updates
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = state.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSummary {
    pub ip: String,
    pub state: String,
    pub updates: u64,
    pub prefixes: usize,
    pub asns: usize,
}

/// One peering session of the feed. Lives as long as the registry holding it.
#[derive(Debug)]
pub struct Neighbor {
    ip: String,
    session: RwLock<Session>,
}

impl Neighbor {
    pub fn new(ip: impl Into<String>) -> Neighbor {
        Neighbor {
            ip: ip.into(),
            session: RwLock::new(Session::default()),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Shared access; readers never observe a half-applied update.
    pub fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read()
    }

    /// Exclusive access, held for the duration of one message.
    pub fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write()
    }

    pub fn set_state(&self, state: impl Into<String>) {
        self.write().set_state(state);
    }

    pub fn state(&self) -> String {
        self.read().state.clone()
    }

    pub fn updates(&self) -> u64 {
        self.read().updates
    }

    pub fn prefix_count(&self) -> usize {
        self.read().rib.prefix_count()
    }

    pub fn asn_count(&self) -> usize {
        self.read().rib.asn_count()
    }

    pub fn snapshot(&self) -> NeighborSummary {
        let session = self.read();
        NeighborSummary {
            ip: self.ip.clone(),
            state: session.state.clone(),
            updates: session.updates,
            prefixes: session.rib.prefix_count(),
            asns: session.rib.asn_count(),
        }
    }
}
