pub mod crypto;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod node_utils;

pub use crypto::CryptoUtils;
pub use error::{KademliaError, Result};
pub use logger::setup_logging;
pub use metrics::{MetricsCollector, RpcMetrics};
pub use node_utils::NodeUtils;
