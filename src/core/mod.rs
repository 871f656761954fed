pub mod config;
pub mod node;
pub mod state;

pub use config::Config;
pub use node::{Node, NodeInfo, NodeStatus};
pub use state::DhtState;
