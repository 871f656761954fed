use crate::utils::{KademliaError, Result};
use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Receive buffer requested for the DHT socket; bursts of lookup replies
/// arrive together when alpha > 1.
const RECV_BUFFER_SIZE: usize = 256 * 1024;

pub struct NodeUtils;

impl NodeUtils {
    /// Bind the node's UDP socket with SO_REUSEADDR and an enlarged receive buffer.
    pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| KademliaError::Transport(format!("Failed to create socket: {}", e)))?;

        socket.set_reuse_address(true).map_err(|e| {
            KademliaError::Transport(format!("Failed to set reuse_address: {}", e))
        })?;

        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            warn!("Could not enlarge UDP receive buffer: {}", e);
        }

        socket
            .bind(&addr.into())
            .map_err(|e| KademliaError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        socket.set_nonblocking(true).map_err(|e| {
            KademliaError::Transport(format!("Failed to set nonblocking: {}", e))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket).map_err(|e| {
            KademliaError::Transport(format!("Failed to convert to tokio socket: {}", e))
        })
    }

    /// Resolve `host:port` to the first IPv4 address (the DHT socket is IPv4
    /// unless bound otherwise), falling back to whatever resolves first.
    pub async fn resolve_address(address: &str) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(address)
            .await
            .map_err(|e| KademliaError::Transport(format!("Failed to resolve {}: {}", address, e)))?
            .collect();

        let chosen = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                KademliaError::Transport(format!("{} did not resolve to any address", address))
            })?;

        debug!("Resolved {} to {}", address, chosen);
        Ok(chosen)
    }
}
