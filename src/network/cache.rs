//! Router info cache: the engine's routing table.
//!
//! Two indices cover the same records. `by_router` owns one
//! [`RouterInfo`] per `(source network, router address)` pair; `by_network`
//! maps a destination network back to the key of the record that currently
//! owns it. At most one router owns a destination network at any time:
//! inserting a network under a new router moves it away from its previous
//! owner ("most recently heard from wins"), and a router record whose
//! reachable set becomes empty is dropped. Every mutation goes through this
//! one API so the two views cannot drift apart.

use std::collections::{BTreeSet, HashMap};

use log::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::network::address::{Address, NetNumber};

/// Reachability status of a router record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RouterStatus {
    /// Normal operation.
    Available,
    /// The router reported itself busy.
    Busy,
    /// The path was administratively disconnected.
    Disconnected,
    /// The router stopped responding.
    Unreachable,
}

/// Key of a router record: the directly connected network the router was
/// heard on (`None` while that adapter's own number is still unknown) and
/// the router's link-layer address on that network.
pub type RouterKey = (Option<NetNumber>, Address);

/// One known router and the networks reachable through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInfo {
    /// Directly connected network the router was heard on.
    pub snet: Option<NetNumber>,

    /// The router's address on that network.
    pub address: Address,

    /// Networks reachable through this router.
    pub dnets: BTreeSet<NetNumber>,

    /// Current status.
    pub status: RouterStatus,
}

impl RouterInfo {
    fn key(&self) -> RouterKey {
        (self.snet, self.address.clone())
    }
}

/// The routing table.
#[derive(Debug, Default)]
pub struct RouterInfoCache {
    by_router: HashMap<RouterKey, RouterInfo>,
    by_network: HashMap<NetNumber, RouterKey>,
}

impl RouterInfoCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the router record that owns a destination network.
    pub fn lookup(&self, dnet: NetNumber) -> Option<&RouterInfo> {
        let key = self.by_network.get(&dnet)?;
        self.by_router.get(key)
    }

    /// Insert or refresh a router record, claiming each listed destination
    /// network for it. A network already owned by a different router is
    /// moved; an old owner left with no networks is deleted.
    pub fn update(&mut self, snet: Option<NetNumber>, address: &Address, dnets: &[NetNumber]) {
        let key: RouterKey = (snet, address.clone());

        for &dnet in dnets {
            if let Some(old_key) = self.by_network.get(&dnet).cloned() {
                if old_key == key {
                    continue;
                }
                // Most recently heard from wins: evict from the old owner.
                if let Some(old) = self.by_router.get_mut(&old_key) {
                    old.dnets.remove(&dnet);
                    debug!(
                        "route to {} moved from router {} to {}",
                        dnet, old.address, address
                    );
                    if old.dnets.is_empty() {
                        trace!("router record {} emptied, dropping", old.address);
                        self.by_router.remove(&old_key);
                    }
                }
            }

            let info = self.by_router.entry(key.clone()).or_insert_with(|| {
                debug!("new router {} on snet {:?}", address, snet);
                RouterInfo {
                    snet,
                    address: address.clone(),
                    dnets: BTreeSet::new(),
                    status: RouterStatus::Available,
                }
            });
            info.dnets.insert(dnet);
            self.by_network.insert(dnet, key.clone());
        }
    }

    /// Change the status of a known router; no-op when the router is
    /// unknown.
    pub fn update_status(&mut self, snet: Option<NetNumber>, address: &Address, status: RouterStatus) {
        match self.by_router.get_mut(&(snet, address.clone())) {
            Some(info) => {
                debug!("router {} status {:?} -> {:?}", address, info.status, status);
                info.status = status;
            }
            None => trace!("status update for unknown router {}, ignored", address),
        }
    }

    /// Delete cached routes. Three forms:
    ///
    /// - `address` = `None`: delete every router record heard on `snet`.
    /// - `dnets` = `None`: delete one router record entirely.
    /// - both given: remove only the listed destination networks from one
    ///   router, deleting the record if it becomes empty.
    pub fn delete(
        &mut self,
        snet: Option<NetNumber>,
        address: Option<&Address>,
        dnets: Option<&[NetNumber]>,
    ) {
        let Some(address) = address else {
            let keys: Vec<RouterKey> = self
                .by_router
                .keys()
                .filter(|(s, _)| *s == snet)
                .cloned()
                .collect();
            for (s, a) in keys {
                self.delete(s, Some(&a), None);
            }
            return;
        };

        let key: RouterKey = (snet, address.clone());
        match dnets {
            None => {
                if let Some(info) = self.by_router.remove(&key) {
                    debug!("deleting router {} ({} routes)", address, info.dnets.len());
                    for dnet in info.dnets {
                        self.by_network.remove(&dnet);
                    }
                } else {
                    warn!("delete for unknown router {} on snet {:?}", address, snet);
                }
            }
            Some(dnets) => {
                let Some(info) = self.by_router.get_mut(&key) else {
                    warn!("delete for unknown router {} on snet {:?}", address, snet);
                    return;
                };
                for dnet in dnets {
                    if info.dnets.remove(dnet) {
                        self.by_network.remove(dnet);
                        trace!("dropped route to {} via {}", dnet, address);
                    }
                }
                if info.dnets.is_empty() {
                    self.by_router.remove(&key);
                }
            }
        }
    }

    /// Number of router records.
    pub fn len(&self) -> usize {
        self.by_router.len()
    }

    /// True when no routes are cached.
    pub fn is_empty(&self) -> bool {
        self.by_router.is_empty()
    }

    /// Iterate over all router records.
    pub fn routers(&self) -> impl Iterator<Item = &RouterInfo> {
        self.by_router.values()
    }

    /// Assert that the two indices agree; test support.
    #[cfg(test)]
    fn assert_consistent(&self) {
        for (dnet, key) in &self.by_network {
            let info = self
                .by_router
                .get(key)
                .unwrap_or_else(|| panic!("by_network points at missing record for {}", dnet));
            assert!(
                info.dnets.contains(dnet),
                "record {:?} does not list {}",
                key,
                dnet
            );
        }
        for (key, info) in &self.by_router {
            assert_eq!(info.key(), *key);
            assert!(!info.dnets.is_empty(), "empty record {:?} retained", key);
            for dnet in &info.dnets {
                assert_eq!(
                    self.by_network.get(dnet),
                    Some(key),
                    "network {} not indexed back to {:?}",
                    dnet,
                    key
                );
            }
        }
    }
}
