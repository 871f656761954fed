use log::{debug, info, warn};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::network::connection::{PendingRequests, Reply};
use crate::network::dht::{AddContact, Contact, Message, NodeId, Payload, RpcType};
use crate::network::messaging::{NodeHandle, RpcHandler};
use crate::utils::{KademliaError, MetricsCollector, Result};

/// Deadline for a single request/reply exchange.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_DATAGRAM_SIZE: usize = 65535;

/// Largest encoded message that fits in one UDP datagram over IPv4.
pub const MAX_MESSAGE_SIZE: usize = 65507;

/// Upper bound on eviction pings running at once.
pub const MAX_EVICTION_PINGS: usize = 16;

/// Client and server side of the RPC protocol over one UDP socket.
///
/// Outbound requests register their correlation id before sending, and the
/// receive loop in [`Transport::serve`] hands every `OK` datagram to the
/// request waiting on that id. Everything else is treated as an inbound
/// request and answered from a separate task.
pub struct Transport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    pending: PendingRequests,
    node: Arc<dyn NodeHandle>,
    handler: RpcHandler,
    rpc_timeout: Duration,
    metrics: MetricsCollector,
    /// Ids of bucket members currently being pinged before eviction.
    evictions: Mutex<HashSet<NodeId>>,
}

impl Transport {
    pub fn new(socket: UdpSocket, node: Arc<dyn NodeHandle>, rpc_timeout: Duration) -> Result<Self> {
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            pending: PendingRequests::default(),
            handler: RpcHandler::new(node.clone()),
            node,
            rpc_timeout,
            metrics: MetricsCollector::new(),
            evictions: Mutex::new(HashSet::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Build a request for `contact` and wait for its validated reply.
    pub async fn send_request(
        &self,
        contact: &Contact,
        rpc_type: RpcType,
        sender_id: NodeId,
        target_id: Option<NodeId>,
        payload: Payload,
    ) -> Result<Message> {
        let request = Message::new(rpc_type, sender_id, target_id, payload);
        self.request_address(contact.address, request).await
    }

    /// Encode a message, refusing anything that cannot go out as a single
    /// datagram.
    pub fn encode(message: &Message) -> Result<Vec<u8>> {
        let data = message.serialize()?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(KademliaError::MessageTooLarge(data.len()));
        }
        Ok(data)
    }

    /// Send an already built request to `addr` and wait for its reply.
    pub async fn request_address(&self, addr: SocketAddr, request: Message) -> Result<Message> {
        let data = Self::encode(&request)?;
        let receiver = self.pending.register(&request.id, addr).await?;

        debug!("Sending {} {} to {}", request.rpc_type, request.id, addr);
        self.metrics.record_request_sent().await;

        if let Err(e) = self.socket.send_to(&data, addr).await {
            self.pending.remove(&request.id).await;
            self.metrics.record_rpc_failure().await;
            return Err(KademliaError::Transport(format!(
                "Failed to send to {}: {}",
                addr, e
            )));
        }

        let result = match timeout(self.rpc_timeout, receiver).await {
            Ok(Ok(reply)) => Self::check_reply(&request, addr, &reply),
            Ok(Err(_)) => Err(KademliaError::Transport(format!(
                "Reply channel for {} closed",
                request.id
            ))),
            Err(_) => {
                self.pending.remove(&request.id).await;
                Err(KademliaError::Transport(format!(
                    "{} to {} timed out after {:?}",
                    request.rpc_type, addr, self.rpc_timeout
                )))
            }
        };

        match &result {
            Ok(_) => self.metrics.record_reply_received().await,
            Err(e) => {
                debug!("{} {} to {} failed: {}", request.rpc_type, request.id, addr, e);
                self.metrics.record_rpc_failure().await;
            }
        }
        result
    }

    /// Validate a routed reply against the request it answers.
    pub fn check_reply(request: &Message, sent_to: SocketAddr, reply: &Reply) -> Result<Message> {
        if reply.data.is_empty() {
            return Err(KademliaError::EmptyReply);
        }
        if reply.from != sent_to {
            return Err(KademliaError::AddressMismatch {
                sent: sent_to,
                received: reply.from,
            });
        }

        let message = Message::deserialize(&reply.data)?;
        if message.id != request.id {
            return Err(KademliaError::IdMismatch {
                expected: request.id.clone(),
                actual: message.id,
            });
        }
        Ok(message)
    }

    pub async fn send_ping(
        &self,
        contact: Option<&Contact>,
        sender: Option<&Contact>,
    ) -> Result<Message> {
        let (contact, sender) = Self::require(contact, sender)?;
        self.send_request(
            contact,
            RpcType::Ping,
            sender.id,
            Some(contact.id),
            Payload::default(),
        )
        .await
    }

    pub async fn send_find_node(
        &self,
        contact: Option<&Contact>,
        sender: Option<&Contact>,
        target: &NodeId,
    ) -> Result<Message> {
        let (contact, sender) = Self::require(contact, sender)?;
        self.send_request(
            contact,
            RpcType::FindNode,
            sender.id,
            Some(*target),
            Payload::default(),
        )
        .await
    }

    pub async fn send_find_value(
        &self,
        contact: Option<&Contact>,
        sender: Option<&Contact>,
        key: &str,
    ) -> Result<Message> {
        let (contact, sender) = Self::require(contact, sender)?;
        let target = NodeId::from_hex(key)?;
        self.send_request(
            contact,
            RpcType::FindValue,
            sender.id,
            Some(target),
            Payload::key(key),
        )
        .await
    }

    pub async fn send_store(
        &self,
        contact: Option<&Contact>,
        sender: Option<&Contact>,
        key: &str,
        value: &str,
    ) -> Result<Message> {
        let (contact, sender) = Self::require(contact, sender)?;
        let target = NodeId::from_hex(key)?;
        self.send_request(
            contact,
            RpcType::Store,
            sender.id,
            Some(target),
            Payload::key_value(key, value),
        )
        .await
    }

    fn require<'a>(
        contact: Option<&'a Contact>,
        sender: Option<&'a Contact>,
    ) -> Result<(&'a Contact, &'a Contact)> {
        let contact = contact.ok_or(KademliaError::MissingContact("contact"))?;
        let sender = sender.ok_or(KademliaError::MissingContact("sender"))?;
        Ok((contact, sender))
    }

    /// Add a contact we just heard from. When its bucket is full the
    /// least-recently-seen member is pinged in the background and only
    /// replaced if it does not answer.
    ///
    /// At most one ping per member and [`MAX_EVICTION_PINGS`] in total are
    /// in flight; a newcomer arriving while its bucket is already being
    /// checked is dropped.
    pub async fn admit_contact(self: &Arc<Self>, contact: Contact) {
        let least_recent = match self.node.add_contact(contact.clone()).await {
            AddContact::BucketFull { least_recent } => least_recent,
            _ => return,
        };

        {
            let mut evictions = self.evictions.lock().await;
            if evictions.contains(&least_recent.id) {
                debug!("{} is already being checked, dropping {}", least_recent, contact);
                return;
            }
            if evictions.len() >= MAX_EVICTION_PINGS {
                debug!("{} eviction checks running, dropping {}", evictions.len(), contact);
                return;
            }
            evictions.insert(least_recent.id);
        }

        let transport = Arc::clone(self);
        tokio::spawn(async move {
            transport.settle_full_bucket(&least_recent, contact).await;
            transport.evictions.lock().await.remove(&least_recent.id);
        });
    }

    async fn settle_full_bucket(&self, stale: &Contact, fresh: Contact) {
        let me = self.node.me();
        let alive = match self.send_ping(Some(stale), Some(&me)).await {
            Ok(_) => true,
            Err(e) if e.is_peer_failure() => false,
            Err(e) => {
                debug!("Could not check {}, keeping it: {}", stale, e);
                return;
            }
        };

        let fresh_desc = fresh.to_string();
        if self.node.replace_or_ignore(stale, fresh, alive).await {
            debug!("Evicted {} in favour of {}", stale, fresh_desc);
        }
    }

    pub async fn evictions_in_flight(&self) -> usize {
        self.evictions.lock().await.len()
    }

    /// Receive loop. Runs until the task is aborted; a bad datagram or a
    /// socket error never ends it.
    pub async fn serve(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        info!("Listening on {}", self.local_addr);

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Receive error on {}: {}", self.local_addr, e);
                    continue;
                }
            };

            if len == 0 {
                if self.pending.fail_from(from).await == 0 {
                    self.metrics.record_datagram_dropped().await;
                }
                continue;
            }

            let data = buf[..len].to_vec();
            let message = match Message::deserialize(&data) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping datagram from {}: {}", from, e);
                    self.metrics.record_datagram_dropped().await;
                    continue;
                }
            };

            if message.rpc_type == RpcType::Ok {
                let id = message.id;
                if !self.pending.complete(&id, Reply { from, data }).await {
                    debug!("Dropping uncorrelated reply {} from {}", id, from);
                    self.metrics.record_datagram_dropped().await;
                }
                continue;
            }

            let transport = Arc::clone(&self);
            tokio::spawn(async move {
                transport.answer(message, from).await;
            });
        }
    }

    async fn answer(self: Arc<Self>, request: Message, from: SocketAddr) {
        let sender = Contact::new(request.sender_id, from);
        let rpc_type = request.rpc_type;

        let reply = match self.handler.handle_request(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Rejected {} from {}: {}", rpc_type, from, e);
                self.metrics.record_request_rejected().await;
                return;
            }
        };

        self.admit_contact(sender).await;

        let data = match Self::encode(&reply) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not encode reply to {}: {}", from, e);
                return;
            }
        };
        match self.socket.send_to(&data, from).await {
            Ok(_) => self.metrics.record_request_served().await,
            Err(e) => warn!("Failed to reply to {}: {}", from, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DhtState;
    use crate::network::dht::BUCKET_SIZE;
    use crate::utils::NodeUtils;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn spawn_transport(rpc_timeout: Duration) -> (Arc<Transport>, Arc<DhtState>) {
        spawn_transport_with_id(NodeId::random(), rpc_timeout).await
    }

    async fn spawn_transport_with_id(
        id: NodeId,
        rpc_timeout: Duration,
    ) -> (Arc<Transport>, Arc<DhtState>) {
        let socket = NodeUtils::bind_udp(local()).unwrap();
        let addr = socket.local_addr().unwrap();
        let state = Arc::new(DhtState::new(Contact::new(id, addr)));
        let transport = Arc::new(Transport::new(socket, state.clone(), rpc_timeout).unwrap());
        tokio::spawn(transport.clone().serve());
        (transport, state)
    }

    fn dead_address() -> SocketAddr {
        let socket = std::net::UdpSocket::bind(local()).unwrap();
        socket.local_addr().unwrap()
    }

    /// Fill bucket `index` of `state` with dead contacts, returning them
    /// least recently seen first.
    async fn fill_with_dead(state: &DhtState, index: usize) -> Vec<Contact> {
        let mut members = Vec::new();
        for _ in 0..BUCKET_SIZE {
            let member = Contact::new(state.me().id.random_in_bucket(index), dead_address());
            assert_eq!(state.add_contact(member.clone()).await, AddContact::Added);
            members.push(member);
        }
        members
    }

    async fn wait_for<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    fn ping_for(addr: SocketAddr) -> (Message, SocketAddr) {
        (
            Message::new(RpcType::Ping, NodeId::random(), None, Payload::default()),
            addr,
        )
    }

    #[test]
    fn test_check_reply_empty() {
        let (request, addr) = ping_for("127.0.0.1:9000".parse().unwrap());
        let reply = Reply {
            from: addr,
            data: Vec::new(),
        };
        assert!(matches!(
            Transport::check_reply(&request, addr, &reply),
            Err(KademliaError::EmptyReply)
        ));
    }

    #[test]
    fn test_check_reply_address_mismatch() {
        let (request, addr) = ping_for("127.0.0.1:9000".parse().unwrap());
        let other: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let reply = Reply {
            from: other,
            data: request.serialize().unwrap(),
        };
        match Transport::check_reply(&request, addr, &reply) {
            Err(KademliaError::AddressMismatch { sent, received }) => {
                assert_eq!(sent, addr);
                assert_eq!(received, other);
            }
            result => panic!("expected AddressMismatch, got {:?}", result),
        }
    }

    #[test]
    fn test_check_reply_id_mismatch() {
        let (request, addr) = ping_for("127.0.0.1:9000".parse().unwrap());
        let unrelated = Message::new(RpcType::Ok, NodeId::random(), None, Payload::default());
        let reply = Reply {
            from: addr,
            data: unrelated.serialize().unwrap(),
        };
        assert!(matches!(
            Transport::check_reply(&request, addr, &reply),
            Err(KademliaError::IdMismatch { .. })
        ));
    }

    #[test]
    fn test_check_reply_accepts_matching_reply() {
        let (request, addr) = ping_for("127.0.0.1:9000".parse().unwrap());
        let mut answer = request.clone();
        answer.rpc_type = RpcType::Ok;
        let reply = Reply {
            from: addr,
            data: answer.serialize().unwrap(),
        };
        let message = Transport::check_reply(&request, addr, &reply).unwrap();
        assert_eq!(message.id, request.id);

        let garbage = Reply {
            from: addr,
            data: b"{".to_vec(),
        };
        assert!(matches!(
            Transport::check_reply(&request, addr, &garbage),
            Err(KademliaError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_contact() {
        let (transport, state) = spawn_transport(Duration::from_millis(300)).await;
        let me = state.me();

        assert!(matches!(
            transport.send_ping(None, Some(&me)).await,
            Err(KademliaError::MissingContact("contact"))
        ));
        assert!(matches!(
            transport.send_find_node(Some(&me), None, &me.id).await,
            Err(KademliaError::MissingContact("sender"))
        ));
        assert_eq!(transport.metrics().get_metrics().await.requests_sent, 0);
    }

    #[tokio::test]
    async fn test_ping_between_transports() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let (_b, b_state) = spawn_transport(Duration::from_secs(2)).await;
        let a_me = a_state.me();
        let b_me = b_state.me();

        let reply = a.send_ping(Some(&b_me), Some(&a_me)).await.unwrap();
        assert_eq!(reply.rpc_type, RpcType::Ok);
        assert_eq!(reply.sender_id, b_me.id);

        // the server admits the requester before replying
        let known = b_state.find_closest(&a_me.id, 5).await;
        assert_eq!(known, vec![a_me.clone()]);
        assert_eq!(known[0].address, a.local_addr());

        let metrics = a.metrics().get_metrics().await;
        assert_eq!(metrics.requests_sent, 1);
        assert_eq!(metrics.replies_received, 1);
    }

    #[tokio::test]
    async fn test_store_then_find_value_remote() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let (_b, b_state) = spawn_transport(Duration::from_secs(2)).await;
        let a_me = a_state.me();
        let b_me = b_state.me();
        let key = NodeId::random().to_hex();

        a.send_store(Some(&b_me), Some(&a_me), &key, "hello")
            .await
            .unwrap();
        assert_eq!(b_state.get_value(&key).await, Some("hello".to_string()));

        let reply = a
            .send_find_value(Some(&b_me), Some(&a_me), &key)
            .await
            .unwrap();
        assert_eq!(reply.value(), Some("hello"));

        let missing = NodeId::random().to_hex();
        let reply = a
            .send_find_value(Some(&b_me), Some(&a_me), &missing)
            .await
            .unwrap();
        assert_eq!(reply.value(), None);
        assert_eq!(reply.contacts(), &[a_me][..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_peer_times_out() {
        let (a, a_state) = spawn_transport(DEFAULT_RPC_TIMEOUT).await;
        let dead = Contact::new(NodeId::random(), dead_address());

        let started = tokio::time::Instant::now();
        let err = a
            .send_ping(Some(&dead), Some(&a_state.me()))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= DEFAULT_RPC_TIMEOUT);
        assert!(matches!(err, KademliaError::Transport(_)));
        assert!(err.is_peer_failure());
        assert_eq!(a.metrics().get_metrics().await.rpc_failures, 1);
    }

    #[tokio::test]
    async fn test_empty_datagram_fails_request() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let peer = UdpSocket::bind(local()).await.unwrap();
        let peer_contact = Contact::new(NodeId::random(), peer.local_addr().unwrap());

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let (_, from) = peer.recv_from(&mut buf).await.unwrap();
            peer.send_to(&[], from).await.unwrap();
        });

        let result = a.send_ping(Some(&peer_contact), Some(&a_state.me())).await;
        assert!(matches!(result, Err(KademliaError::EmptyReply)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_from_other_address() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let peer = UdpSocket::bind(local()).await.unwrap();
        let impostor = UdpSocket::bind(local()).await.unwrap();
        let peer_contact = Contact::new(NodeId::random(), peer.local_addr().unwrap());

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let (len, from) = peer.recv_from(&mut buf).await.unwrap();
            let mut reply = Message::deserialize(&buf[..len]).unwrap();
            reply.rpc_type = RpcType::Ok;
            impostor
                .send_to(&reply.serialize().unwrap(), from)
                .await
                .unwrap();
        });

        let result = a.send_ping(Some(&peer_contact), Some(&a_state.me())).await;
        assert!(matches!(
            result,
            Err(KademliaError::AddressMismatch { .. })
        ));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_survives_garbage() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let (b, b_state) = spawn_transport(Duration::from_secs(2)).await;

        let raw = UdpSocket::bind(local()).await.unwrap();
        raw.send_to(b"not a message", b.local_addr()).await.unwrap();

        let reply = a
            .send_ping(Some(&b_state.me()), Some(&a_state.me()))
            .await
            .unwrap();
        assert_eq!(reply.sender_id, b_state.me().id);
        assert_eq!(b.metrics().get_metrics().await.datagrams_dropped, 1);
    }

    #[tokio::test]
    async fn test_oversized_request_is_not_sent() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let (_b, b_state) = spawn_transport(Duration::from_secs(2)).await;
        let key = NodeId::random().to_hex();
        let big = "x".repeat(MAX_MESSAGE_SIZE);

        let err = a
            .send_store(Some(&b_state.me()), Some(&a_state.me()), &key, &big)
            .await
            .unwrap_err();
        assert!(matches!(err, KademliaError::MessageTooLarge(len) if len > MAX_MESSAGE_SIZE));
        assert!(!err.is_peer_failure());
        assert_eq!(a.metrics().get_metrics().await.requests_sent, 0);
        assert_eq!(b_state.get_value(&key).await, None);
    }

    #[tokio::test]
    async fn test_dead_least_recent_is_replaced() {
        let (a, a_state) = spawn_transport(Duration::from_millis(300)).await;
        let members = fill_with_dead(&a_state, 0).await;
        let newcomer = Contact::new(a_state.me().id.random_in_bucket(0), dead_address());

        a.admit_contact(newcomer.clone()).await;
        assert!(!a_state.contains(&newcomer.id).await);

        assert!(wait_for(|| a_state.contains(&newcomer.id)).await);
        assert!(!a_state.contains(&members[0].id).await);

        let bucket = a_state.bucket_contacts(0).await;
        assert_eq!(bucket.len(), BUCKET_SIZE);
        assert_eq!(bucket[0], newcomer);
        assert!(members[1..].iter().all(|m| bucket.contains(m)));
    }

    #[tokio::test]
    async fn test_live_least_recent_is_kept() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        let mut members = Vec::new();
        let mut peers = Vec::new();
        for _ in 0..BUCKET_SIZE {
            let id = a_state.me().id.random_in_bucket(0);
            let (peer, peer_state) = spawn_transport_with_id(id, Duration::from_secs(2)).await;
            a_state.add_contact(peer_state.me()).await;
            members.push(peer_state.me());
            peers.push(peer);
        }
        let newcomer = Contact::new(a_state.me().id.random_in_bucket(0), dead_address());

        a.admit_contact(newcomer.clone()).await;

        let oldest = members[0].clone();
        assert!(
            wait_for(|| {
                let state = a_state.clone();
                let oldest = oldest.clone();
                async move { state.bucket_contacts(0).await.first() == Some(&oldest) }
            })
            .await
        );
        assert!(!a_state.contains(&newcomer.id).await);
        assert_eq!(a_state.bucket_contacts(0).await.len(), BUCKET_SIZE);
        assert_eq!(a.metrics().get_metrics().await.replies_received, 1);
    }

    #[tokio::test]
    async fn test_one_eviction_check_per_member() {
        let (a, a_state) = spawn_transport(Duration::from_millis(500)).await;
        let members = fill_with_dead(&a_state, 0).await;

        let newcomers: Vec<Contact> = (0..20)
            .map(|_| Contact::new(a_state.me().id.random_in_bucket(0), dead_address()))
            .collect();
        for newcomer in &newcomers {
            a.admit_contact(newcomer.clone()).await;
        }
        assert_eq!(a.evictions_in_flight().await, 1);

        assert!(wait_for(|| a_state.contains(&newcomers[0].id)).await);
        assert!(!a_state.contains(&members[0].id).await);
        let bucket = a_state.bucket_contacts(0).await;
        assert!(newcomers[1..].iter().all(|n| !bucket.contains(n)));
        assert_eq!(a.metrics().get_metrics().await.requests_sent, 1);
    }

    #[tokio::test]
    async fn test_eviction_checks_are_capped() {
        let (a, a_state) = spawn_transport(Duration::from_secs(2)).await;
        for index in 0..=MAX_EVICTION_PINGS {
            fill_with_dead(&a_state, index).await;
        }

        for index in 0..=MAX_EVICTION_PINGS {
            let newcomer = Contact::new(a_state.me().id.random_in_bucket(index), dead_address());
            a.admit_contact(newcomer).await;
        }
        assert_eq!(a.evictions_in_flight().await, MAX_EVICTION_PINGS);
    }
}
