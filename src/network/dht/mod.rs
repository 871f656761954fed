//! Kademlia data model
//!
//! Identifiers and the XOR metric, contacts, k-buckets and the routing
//! table, plus the RPC envelope exchanged between nodes.

mod bucket;
mod contact;
mod node_id;
mod routing_table;
mod rpc;

pub use bucket::{BUCKET_SIZE, Bucket, BucketInsert};
pub use contact::Contact;
pub use node_id::{ID_BITS, ID_LENGTH, NodeId};
pub use routing_table::{AddContact, RoutingTable};
pub use rpc::{Message, Payload, RpcType};
