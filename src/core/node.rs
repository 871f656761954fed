use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::core::{Config, DhtState};
use crate::network::dht::{BUCKET_SIZE, Contact, ID_BITS, Message, NodeId, Payload, RpcType};
use crate::network::{NodeHandle, Transport};
use crate::storage::HashUtils;
use crate::utils::{KademliaError, NodeUtils, Result, RpcMetrics};

/// Lifecycle of a node. There is no way back from `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    #[default]
    Uninitialized,
    Initializing,
    Joining,
    Active,
    Shutdown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Uninitialized => "uninitialized",
            NodeStatus::Initializing => "initializing",
            NodeStatus::Joining => "joining",
            NodeStatus::Active => "active",
            NodeStatus::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Snapshot of a node for display.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub address: SocketAddr,
    pub status: NodeStatus,
    pub contacts: Vec<Contact>,
    pub stored_keys: Vec<String>,
    pub metrics: RpcMetrics,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node ID: {}", self.id)?;
        writeln!(f, "Address: {}", self.address)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Contacts ({}):", self.contacts.len())?;
        for contact in &self.contacts {
            writeln!(f, "  {}", contact)?;
        }
        writeln!(f, "Stored keys ({}):", self.stored_keys.len())?;
        for key in &self.stored_keys {
            writeln!(f, "  {}", key)?;
        }
        write!(f, "{}", self.metrics)
    }
}

enum SearchOutcome {
    Contacts(Vec<Contact>),
    Value(String),
}

pub struct Node {
    pub config: Config,
    me: Contact,
    alpha: usize,
    state: Arc<DhtState>,
    transport: Arc<Transport>,
    status: RwLock<NodeStatus>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Bind the socket, seed the routing table with ourselves and start
    /// serving RPCs. The node is not part of a network until [`Node::start`].
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let id = config.node_id()?;
        let socket = NodeUtils::bind_udp(config.listen_addr()?)?;
        let me = Contact::new(id, socket.local_addr()?);

        let state = Arc::new(DhtState::new(me.clone()));
        let transport = Arc::new(Transport::new(
            socket,
            state.clone(),
            config.rpc_timeout(),
        )?);
        let server = tokio::spawn(transport.clone().serve());

        info!("Node {} initialized on {}", me.id, me.address);

        Ok(Self {
            alpha: config.alpha,
            config,
            me,
            state,
            transport,
            status: RwLock::new(NodeStatus::Initializing),
            server: Mutex::new(Some(server)),
        })
    }

    /// Join the configured bootstrap peer, or become active on our own when
    /// there is none.
    pub async fn start(&self) -> Result<()> {
        let bootstrap = match &self.config.bootstrap_peer {
            Some(peer) => peer,
            None => {
                info!("No bootstrap peer configured, starting a new network");
                self.set_status(NodeStatus::Active).await;
                return Ok(());
            }
        };

        let address = NodeUtils::resolve_address(bootstrap).await?;
        let id = self.config.bootstrap_id()?;
        if id == self.me.id {
            info!("This node is the bootstrap node");
            self.set_status(NodeStatus::Active).await;
            return Ok(());
        }

        self.join(Contact::new(id, address)).await
    }

    /// Enter the network through `bootstrap`: look ourselves up, then run a
    /// lookup for a random id in every bucket range. An unreachable bootstrap
    /// leaves the node active with whatever it managed to learn.
    pub async fn join(&self, bootstrap: Contact) -> Result<()> {
        self.ensure_running().await?;
        self.set_status(NodeStatus::Joining).await;
        info!("Joining network via {}", bootstrap);

        self.transport.admit_contact(bootstrap).await;
        self.node_lookup(&self.me.id).await?;

        if self.state.contact_count().await == 0 {
            warn!("Bootstrap peer unreachable, continuing with an empty routing table");
        } else {
            for prefix_len in 0..ID_BITS {
                let target = self.me.id.random_in_bucket(prefix_len);
                self.node_lookup(&target).await?;
            }
        }

        self.set_status(NodeStatus::Active).await;
        info!(
            "Joined network, {} contacts known",
            self.state.contact_count().await
        );
        Ok(())
    }

    /// Iterative lookup of the `k` closest live nodes to `target`.
    pub async fn node_lookup(&self, target: &NodeId) -> Result<Vec<Contact>> {
        match self.search(target, None).await? {
            SearchOutcome::Contacts(contacts) => Ok(contacts),
            // only reachable when searching for a value
            SearchOutcome::Value(_) => Ok(Vec::new()),
        }
    }

    /// Find the value stored under `key`, checking local content first.
    pub async fn find_value(&self, key: &str) -> Result<Option<String>> {
        self.ensure_running().await?;

        let target = HashUtils::key_id(key)?;
        let key = target.to_hex();

        if let Some(value) = self.state.get_value(&key).await {
            debug!("Found {} locally", key);
            return Ok(Some(value));
        }

        match self.search(&target, Some(&key)).await? {
            SearchOutcome::Value(value) => Ok(Some(value)),
            SearchOutcome::Contacts(_) => {
                info!("Value {} not found", key);
                Ok(None)
            }
        }
    }

    /// Store `data` here and on the `k` nodes closest to its content key.
    /// Returns the key. A value too large for one datagram is refused
    /// before anything is stored.
    pub async fn store_value(&self, data: &str) -> Result<String> {
        self.ensure_running().await?;

        let key = HashUtils::content_key(data.as_bytes());
        let target = HashUtils::key_id(&key)?;
        let store = Message::new(
            RpcType::Store,
            self.me.id,
            Some(target),
            Payload::key_value(&key, data),
        );
        Transport::encode(&store)?;

        self.state.put_value(key.clone(), data.to_string()).await;

        let peers = self.node_lookup(&target).await?;
        let attempted = peers.len();

        let results = join_all(
            peers
                .iter()
                .map(|peer| self.transport.send_store(Some(peer), Some(&self.me), &key, data)),
        )
        .await;

        let mut stored = 0;
        for (peer, result) in peers.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    stored += 1;
                    self.transport.admit_contact(peer).await;
                }
                Err(e) => self.handle_failure(&peer, &e).await,
            }
        }

        if attempted > 0 && stored == 0 {
            warn!("No peer accepted {}, stored locally only", key);
        } else {
            info!("Stored {} on {} peer(s)", key, stored);
        }
        Ok(key)
    }

    /// Ping a known contact. A live contact is refreshed, a dead one evicted.
    pub async fn ping(&self, contact: &Contact) -> bool {
        if self.ensure_running().await.is_err() {
            return false;
        }

        match self
            .transport
            .send_ping(Some(contact), Some(&self.me))
            .await
        {
            Ok(_) => {
                self.transport.admit_contact(contact.clone()).await;
                true
            }
            Err(e) => {
                self.handle_failure(contact, &e).await;
                false
            }
        }
    }

    /// Ping a peer whose id we do not know yet and learn it from the reply.
    pub async fn ping_address(&self, address: &str) -> Result<NodeId> {
        self.ensure_running().await?;

        let addr = NodeUtils::resolve_address(address).await?;
        let request = Message::new(RpcType::Ping, self.me.id, None, Payload::default());
        let reply = self.transport.request_address(addr, request).await?;

        self.transport
            .admit_contact(Contact::new(reply.sender_id, addr))
            .await;
        Ok(reply.sender_id)
    }

    /// Stop serving RPCs. Later operations fail with `NodeShutdown`.
    pub async fn shutdown(&self) {
        self.set_status(NodeStatus::Shutdown).await;
        if let Some(server) = self.server.lock().await.take() {
            server.abort();
        }
        info!("Node {} shut down", self.me.id);
    }

    pub fn me(&self) -> &Contact {
        &self.me
    }

    pub fn id(&self) -> NodeId {
        self.me.id
    }

    pub fn address(&self) -> SocketAddr {
        self.me.address
    }

    pub fn state(&self) -> &Arc<DhtState> {
        &self.state
    }

    pub async fn status(&self) -> NodeStatus {
        *self.status.read().await
    }

    pub async fn metrics(&self) -> RpcMetrics {
        self.transport.metrics().get_metrics().await
    }

    pub async fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.me.id,
            address: self.me.address,
            status: self.status().await,
            contacts: self.state.all_contacts().await,
            stored_keys: self.state.store().keys().await,
            metrics: self.metrics().await,
        }
    }

    async fn set_status(&self, status: NodeStatus) {
        let mut current = self.status.write().await;
        if *current != NodeStatus::Shutdown {
            debug!("Node status {} -> {}", *current, status);
            *current = status;
        }
    }

    async fn ensure_running(&self) -> Result<()> {
        if self.status().await == NodeStatus::Shutdown {
            return Err(KademliaError::NodeShutdown);
        }
        Ok(())
    }

    /// Shared iterative search. With a `key` the probes are FIND_VALUE and
    /// the first non-empty value ends the search.
    async fn search(&self, target: &NodeId, key: Option<&str>) -> Result<SearchOutcome> {
        self.ensure_running().await?;

        let mut shortlist = self.state.find_closest(target, self.alpha).await;
        let mut probed: HashSet<NodeId> = HashSet::new();
        let mut failed: HashSet<NodeId> = HashSet::new();
        let mut closest = NodeId::MAX;

        loop {
            let batch: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !probed.contains(&c.id))
                .take(self.alpha)
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }

            let replies = join_all(batch.iter().map(|c| self.probe(c, target, key))).await;

            for (contact, result) in batch.into_iter().zip(replies) {
                let reply = match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        shortlist.retain(|c| c.id != contact.id);
                        failed.insert(contact.id);
                        self.handle_failure(&contact, &e).await;
                        continue;
                    }
                };

                let responder = if reply.sender_id == contact.id {
                    contact
                } else {
                    // the id we held for this address was wrong
                    warn!(
                        "{} answered as {}, correcting routing table",
                        contact, reply.sender_id
                    );
                    self.state.remove_contact(&contact.id).await;
                    shortlist.retain(|c| c.id != contact.id);
                    probed.insert(contact.id);

                    let real = Contact::new(reply.sender_id, contact.address).with_distance(target);
                    if real.id != self.me.id && !shortlist.iter().any(|c| c.id == real.id) {
                        shortlist.push(real.clone());
                    }
                    real
                };
                probed.insert(responder.id);
                self.transport.admit_contact(responder).await;

                if let Some(value) = reply.value().filter(|v| !v.is_empty()) {
                    return Ok(SearchOutcome::Value(value.to_string()));
                }

                for found in reply.contacts() {
                    if found.id == self.me.id
                        || failed.contains(&found.id)
                        || shortlist.iter().any(|c| c.id == found.id)
                    {
                        continue;
                    }
                    shortlist.push(found.clone().with_distance(target));
                }
            }

            shortlist.sort_by(|a, b| a.cmp_distance(b));
            shortlist.truncate(BUCKET_SIZE);

            let best = shortlist.first().and_then(|c| c.distance);
            let improved = match best {
                Some(best) if best.less_than(&closest) => {
                    closest = best;
                    true
                }
                _ => false,
            };

            if !improved || probed.len() >= BUCKET_SIZE {
                break;
            }
        }

        debug!(
            "Lookup for {} finished after probing {} node(s)",
            target,
            probed.len()
        );
        Ok(SearchOutcome::Contacts(shortlist))
    }

    async fn probe(&self, contact: &Contact, target: &NodeId, key: Option<&str>) -> Result<Message> {
        match key {
            Some(key) => {
                self.transport
                    .send_find_value(Some(contact), Some(&self.me), key)
                    .await
            }
            None => {
                self.transport
                    .send_find_node(Some(contact), Some(&self.me), target)
                    .await
            }
        }
    }

    async fn handle_failure(&self, contact: &Contact, error: &KademliaError) {
        if error.is_peer_failure() {
            debug!("Evicting {}: {}", contact, error);
            self.state.remove_contact(&contact.id).await;
        } else {
            warn!("Request to {} failed: {}", contact, error);
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(server) = self.server.get_mut().take() {
            server.abort();
        }
    }
}
