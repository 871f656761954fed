use log::{debug, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{RwLock, oneshot};
use tokio::time::Instant;

use crate::utils::{KademliaError, Result};

/// Upper bound on requests awaiting a reply at any one time.
pub const MAX_PENDING_REQUESTS: usize = 1024;

/// A raw datagram routed to the request that is waiting for it.
#[derive(Debug, Clone)]
pub struct Reply {
    pub from: SocketAddr,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct PendingRequest {
    addr: SocketAddr,
    sender: oneshot::Sender<Reply>,
    sent_at: Instant,
}

/// Outstanding requests keyed by correlation id.
///
/// The receive loop completes entries as replies arrive; a waiter that
/// gives up removes its own entry.
#[derive(Debug, Clone)]
pub struct PendingRequests {
    requests: Arc<RwLock<HashMap<String, PendingRequest>>>,
    max_pending: usize,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(MAX_PENDING_REQUESTS)
    }
}

impl PendingRequests {
    pub fn new(max_pending: usize) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_pending,
        }
    }

    /// Start waiting for the reply to request `id` sent to `addr`.
    pub async fn register(&self, id: &str, addr: SocketAddr) -> Result<oneshot::Receiver<Reply>> {
        let mut requests = self.requests.write().await;

        if requests.len() >= self.max_pending {
            return Err(KademliaError::Busy(format!(
                "too many pending requests ({})",
                self.max_pending
            )));
        }
        if requests.contains_key(id) {
            return Err(KademliaError::Busy(format!(
                "request {} is already pending",
                id
            )));
        }

        let (sender, receiver) = oneshot::channel();
        requests.insert(
            id.to_string(),
            PendingRequest {
                addr,
                sender,
                sent_at: Instant::now(),
            },
        );
        Ok(receiver)
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.requests.write().await.remove(id).is_some()
    }

    /// Hand a reply to the request waiting on `id`. Returns false when no
    /// such request is pending.
    pub async fn complete(&self, id: &str, reply: Reply) -> bool {
        let pending = self.requests.write().await.remove(id);

        match pending {
            Some(pending) => {
                debug!(
                    "Reply {} from {} after {:?}",
                    id,
                    reply.from,
                    pending.sent_at.elapsed()
                );
                if pending.sender.send(reply).is_err() {
                    debug!("Waiter for {} already gone", id);
                }
                true
            }
            None => false,
        }
    }

    /// Fail every request sent to `addr` with an empty reply. Returns how
    /// many requests were affected.
    pub async fn fail_from(&self, addr: SocketAddr) -> usize {
        let mut requests = self.requests.write().await;

        let ids: Vec<String> = requests
            .iter()
            .filter(|(_, pending)| pending.addr == addr)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(pending) = requests.remove(id) {
                let _ = pending.sender.send(Reply {
                    from: addr,
                    data: Vec::new(),
                });
            }
        }

        if !ids.is_empty() {
            warn!("Empty datagram from {}, failed {} request(s)", addr, ids.len());
        }
        ids.len()
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }
}
