// Cluster plane bookkeeping (spec §3 Cluster Peer, §4.6). The wire
// framing for peer connections lives in `net::cluster_conn`; this module
// only tracks which peers exist and what filters each has registered
// interest in, so the broker core can decide who to forward a publish to
// without depending on the connection's concrete type.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Weak;

use crate::net::cluster_conn::PeerSink;
use crate::types::NodeId;

struct PeerEntry {
    /// Filters gossiped to us by this peer: its local subscribers' interest.
    interest: HashSet<String>,
    sink: Weak<RefCell<dyn PeerSink>>,
}

#[derive(Default)]
pub struct ClusterRegistry {
    peers: HashMap<NodeId, PeerEntry>,
}

impl ClusterRegistry {
    #[must_use]
    pub fn new() -> Self {
        ClusterRegistry::default()
    }

    /// Registers a newly attached peer. The caller is responsible for
    /// replaying the full local subscription set to it afterward (spec
    /// §4.6: "On peer attach, the local broker replays its full
    /// subscription set").
    pub fn add_peer(&mut self, node_id: NodeId, sink: Weak<RefCell<dyn PeerSink>>) {
        self.peers.insert(
            node_id,
            PeerEntry {
                interest: HashSet::new(),
                sink,
            },
        );
    }

    pub fn remove_peer(&mut self, node_id: NodeId) {
        self.peers.remove(&node_id);
    }

    pub fn record_interest(&mut self, node_id: NodeId, filter: String) {
        if let Some(peer) = self.peers.get_mut(&node_id) {
            peer.interest.insert(filter);
        }
    }

    pub fn forget_interest(&mut self, node_id: NodeId, filter: &str) {
        if let Some(peer) = self.peers.get_mut(&node_id) {
            peer.interest.remove(filter);
        }
    }

    /// Peers whose gossiped interest contains a filter matching `topic`,
    /// using the same `+`/`#` rules subscriptions use.
    #[must_use]
    pub fn peers_interested_in(&self, topic: &str) -> Vec<NodeId> {
        self.peers
            .iter()
            .filter(|(_, peer)| {
                peer.interest
                    .iter()
                    .any(|filter| mossmq_codec::topic::matches(filter, topic))
            })
            .map(|(node_id, _)| *node_id)
            .collect()
    }

    #[must_use]
    pub fn sink(&self, node_id: NodeId) -> Option<Weak<RefCell<dyn PeerSink>>> {
        self.peers.get(&node_id).map(|peer| peer.sink.clone())
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.peers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_with_no_matching_interest_is_excluded() {
        let mut registry = ClusterRegistry::new();
        registry.peers.insert(
            1,
            PeerEntry {
                interest: HashSet::from(["other/#".to_string()]),
                sink: Weak::new(),
            },
        );
        assert!(registry.peers_interested_in("room/1").is_empty());
    }

    #[test]
    fn peer_interest_is_matched_with_wildcards() {
        let mut registry = ClusterRegistry::new();
        registry.record_interest(1, "room/+".to_string());
        registry.peers.insert(
            1,
            PeerEntry {
                interest: HashSet::from(["room/+".to_string()]),
                sink: Weak::new(),
            },
        );
        assert_eq!(registry.peers_interested_in("room/1"), vec![1]);
    }
}
