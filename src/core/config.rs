use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::network::DEFAULT_RPC_TIMEOUT;
use crate::network::dht::NodeId;
use crate::utils::{KademliaError, Result};

/// Identifier of the well-known rendezvous node.
pub const DEFAULT_BOOTSTRAP_ID: &str = "00000000000000000000000000000000FFFFFFFF";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub node_id: Option<String>, // None means a random id
    pub bootstrap_peer: Option<String>,
    pub bootstrap_id: String,
    pub alpha: usize,
    pub rpc_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            node_id: None,
            bootstrap_peer: None,
            bootstrap_id: DEFAULT_BOOTSTRAP_ID.to_string(),
            alpha: 3,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.alpha == 0 {
            return Err(KademliaError::Config("alpha must be at least 1".to_string()));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(KademliaError::Config(
                "rpc_timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(node_id) = &self.node_id {
            NodeId::from_hex(node_id)?;
        }
        NodeId::from_hex(&self.bootstrap_id)?;
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| KademliaError::Config(format!("Invalid listen address: {}", e)))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn node_id(&self) -> Result<NodeId> {
        match &self.node_id {
            Some(hex) => NodeId::from_hex(hex),
            None => Ok(NodeId::random()),
        }
    }

    pub fn bootstrap_id(&self) -> Result<NodeId> {
        NodeId::from_hex(&self.bootstrap_id)
    }
}
