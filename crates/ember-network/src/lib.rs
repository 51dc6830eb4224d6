//! # ember-network
//! The gossip-style peer wire protocol: handshake, inventory exchange,
//! block/tx relay, and the cooperative miner that rides on top of it.

pub mod client;
pub mod handlers;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod protocol;
pub mod server;

pub use mempool::Mempool;
pub use node::Node;
pub use protocol::{Message, PROTOCOL_VERSION};
pub use server::serve;
