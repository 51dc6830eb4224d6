//! Node configuration, derived entirely from the `NODE_ID` environment
//! variable.
//!
//! Every path a node touches — its chain store, its wallet file, and the
//! address it listens on — is a deterministic function of `NODE_ID`. This
//! lets a handful of local nodes (run from the same checkout, as in the
//! wallet/CLI tutorials this protocol is modeled on) coexist without
//! colliding on disk or on port.

use std::env;
use std::path::PathBuf;

use ember_core::constants::PRIMARY_NODE_ID;

/// `NODE_ID` environment variable name nodes and the CLI read at startup.
pub const NODE_ID_VAR: &str = "NODE_ID";

/// Configuration for a single node instance, derived from `NODE_ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// The `NODE_ID` this config was derived from, e.g. `"3000"`.
    pub node_id: String,
    /// Root directory all of this node's persistent data lives under.
    pub data_dir: PathBuf,
}

impl NodeConfig {
    /// Read `NODE_ID` from the environment and derive a config from it.
    pub fn from_env() -> Result<Self, NodeConfigError> {
        let node_id = env::var(NODE_ID_VAR).map_err(|_| NodeConfigError::MissingNodeId)?;
        if node_id.trim().is_empty() {
            return Err(NodeConfigError::MissingNodeId);
        }
        Ok(Self::new(node_id))
    }

    /// Build a config directly from a known node id, bypassing the
    /// environment (used by tests and by tooling that manages several
    /// local nodes at once).
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            data_dir: PathBuf::from("./tmp"),
        }
    }

    /// Path to this node's sled chain store: `./tmp/blocks_<NODE_ID>`.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("blocks_{}", self.node_id))
    }

    /// Path to this node's wallet file: `./tmp/wallets_<NODE_ID>.data`.
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(format!("wallets_{}.data", self.node_id))
    }

    /// The address this node listens on for peer connections.
    pub fn listen_addr(&self) -> String {
        format!("localhost:{}", self.node_id)
    }

    /// Whether this node is the well-known primary/seed node.
    pub fn is_primary(&self) -> bool {
        self.node_id == PRIMARY_NODE_ID
    }
}

/// Failure to derive a [`NodeConfig`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum NodeConfigError {
    #[error("NODE_ID environment variable is not set (or empty)")]
    MissingNodeId,
}
