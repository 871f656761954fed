pub mod connection;
pub mod dht;
pub mod messaging;
pub mod transport;

pub use connection::{PendingRequests, Reply};
pub use messaging::{NodeHandle, RpcHandler};
pub use transport::{DEFAULT_RPC_TIMEOUT, Transport};
