//! The consolidated per-process peer state.
//!
//! The tutorial this protocol is modeled on keeps `knownNodes`,
//! `blocksInTransit`, and the mempool as package-level globals. Here they
//! are fields of a single [`Node`] value, shared behind an `Arc` across
//! every connection-handling task and mutated under explicit locks, per
//! the redesign this crate follows.

use std::collections::BTreeSet;
use std::sync::Arc;

use ember_core::constants::SEED_NODE;
use ember_core::types::{Hash256, PubkeyHash};
use ember_store::Chain;
use parking_lot::Mutex;

use crate::mempool::Mempool;

/// Everything one running node needs to answer peer messages and drive
/// its own miner.
pub struct Node {
    /// This node's own listen address, e.g. `"localhost:3001"`.
    pub address: String,
    /// The persistent chain and UTXO store this node serves.
    pub chain: Arc<Chain>,
    /// Pending, unconfirmed transactions.
    pub mempool: Mempool,
    /// Peers this node knows about, keyed by listen address.
    known_nodes: Mutex<BTreeSet<String>>,
    /// Block hashes requested from a peer but not yet received.
    blocks_in_transit: Mutex<Vec<Hash256>>,
    /// The reward address a non-primary node mines to, if configured.
    pub miner_address: Option<PubkeyHash>,
}

impl Node {
    pub fn new(address: String, chain: Arc<Chain>, miner_address: Option<PubkeyHash>) -> Self {
        let mut known_nodes = BTreeSet::new();
        if address != SEED_NODE {
            known_nodes.insert(SEED_NODE.to_string());
        }
        Node {
            address,
            chain,
            mempool: Mempool::new(),
            known_nodes: Mutex::new(known_nodes),
            blocks_in_transit: Mutex::new(Vec::new()),
            miner_address,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.address == SEED_NODE
    }

    /// This node is willing to mine iff it carries a configured reward
    /// address and is not the primary/seed node.
    pub fn is_miner(&self) -> bool {
        !self.is_primary() && self.miner_address.is_some()
    }

    pub fn known_nodes(&self) -> Vec<String> {
        self.known_nodes.lock().iter().cloned().collect()
    }

    pub fn add_known_node(&self, addr: &str) {
        if addr != self.address {
            self.known_nodes.lock().insert(addr.to_string());
        }
    }

    pub fn remove_known_node(&self, addr: &str) {
        self.known_nodes.lock().remove(addr);
    }

    pub fn set_blocks_in_transit(&self, hashes: Vec<Hash256>) {
        *self.blocks_in_transit.lock() = hashes;
    }

    pub fn blocks_in_transit(&self) -> Vec<Hash256> {
        self.blocks_in_transit.lock().clone()
    }

    pub fn take_next_block_in_transit(&self) -> Option<Hash256> {
        let mut pending = self.blocks_in_transit.lock();
        if pending.is_empty() {
            None
        } else {
            Some(pending.remove(0))
        }
    }

    pub fn remove_block_in_transit(&self, hash: &Hash256) {
        self.blocks_in_transit.lock().retain(|h| h != hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_store::Chain;
    use tempfile::{tempdir, TempDir};

    fn test_node(address: &str) -> (Node, TempDir) {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), PubkeyHash([1; 20])).unwrap();
        (Node::new(address.to_string(), Arc::new(chain), None), dir)
    }

    #[test]
    fn non_primary_node_knows_the_seed_on_startup() {
        let (node, _dir) = test_node("localhost:3001");
        assert!(node.known_nodes().contains(&SEED_NODE.to_string()));
    }

    #[test]
    fn primary_node_starts_with_no_known_nodes() {
        let (node, _dir) = test_node(SEED_NODE);
        assert!(node.known_nodes().is_empty());
        assert!(node.is_primary());
    }

    #[test]
    fn add_known_node_ignores_self() {
        let (node, _dir) = test_node("localhost:3001");
        node.add_known_node("localhost:3001");
        assert_eq!(node.known_nodes().iter().filter(|a| *a == "localhost:3001").count(), 0);
    }

    #[test]
    fn is_miner_requires_non_primary_and_configured_address() {
        let dir = tempdir().unwrap();
        let chain = Chain::init(dir.path().join("chain"), PubkeyHash([1; 20])).unwrap();
        let miner = Node::new("localhost:3001".to_string(), Arc::new(chain), Some(PubkeyHash([2; 20])));
        assert!(miner.is_miner());

        let (non_miner, _dir2) = test_node("localhost:3001");
        assert!(!non_miner.is_miner());
    }

    #[test]
    fn blocks_in_transit_round_trips() {
        let (node, _dir) = test_node("localhost:3001");
        node.set_blocks_in_transit(vec![Hash256([1; 32]), Hash256([2; 32])]);
        assert_eq!(node.blocks_in_transit().len(), 2);
        node.remove_block_in_transit(&Hash256([1; 32]));
        assert_eq!(node.blocks_in_transit(), vec![Hash256([2; 32])]);
    }
}
