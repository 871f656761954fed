//! Kademlia DHT Library
//!
//! A Kademlia node: XOR-metric routing table, a small JSON RPC protocol over
//! UDP, and iterative lookups to store and find values across peers.

pub mod cli;
pub mod core;
pub mod network;
pub mod storage;
pub mod utils;

// Re-export main types
pub use core::{Config, Node, NodeStatus};
pub use network::dht::{Contact, Message, NodeId, RoutingTable};
pub use utils::{
    NodeUtils,
    error::{KademliaError, Result},
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
