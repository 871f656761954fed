use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use crate::network::dht::{AddContact, BUCKET_SIZE, Contact, Message, NodeId, Payload, RpcType};
use crate::utils::{KademliaError, Result};

/// The narrow view of a node that the transport is allowed to use.
///
/// The transport never owns the node; it only reads and updates routing
/// state and local content through this handle.
#[async_trait]
pub trait NodeHandle: Send + Sync {
    /// Our own contact.
    fn me(&self) -> Contact;

    async fn add_contact(&self, contact: Contact) -> AddContact;

    /// Settle a full bucket after pinging `stale`.
    async fn replace_or_ignore(&self, stale: &Contact, fresh: Contact, stale_alive: bool) -> bool;

    async fn remove_contact(&self, id: &NodeId) -> Option<Contact>;

    async fn find_closest(&self, target: &NodeId, count: usize) -> Vec<Contact>;

    async fn get_value(&self, key: &str) -> Option<String>;

    async fn put_value(&self, key: String, value: String);
}

/// Turns inbound requests into replies.
#[derive(Clone)]
pub struct RpcHandler {
    node: Arc<dyn NodeHandle>,
}

impl RpcHandler {
    pub fn new(node: Arc<dyn NodeHandle>) -> Self {
        Self { node }
    }

    /// Dispatch a request and rewrite it into its reply: the type becomes
    /// `OK` and the sender becomes us. The correlation id is untouched.
    pub async fn handle_request(&self, mut message: Message) -> Result<Message> {
        debug!(
            "Handling {} {} from {}",
            message.rpc_type, message.id, message.sender_id
        );

        match message.rpc_type {
            RpcType::Ping => {}
            RpcType::Store => self.handle_store(&message).await?,
            RpcType::FindNode => {
                message.payload = Some(self.handle_find_node(&message).await?);
            }
            RpcType::FindValue => {
                message.payload = Some(self.handle_find_value(&message).await?);
            }
            RpcType::Ok => {
                return Err(KademliaError::InvalidRpcType(message.rpc_type.to_string()));
            }
        }

        message.rpc_type = RpcType::Ok;
        message.sender_id = self.node.me().id;
        Ok(message)
    }

    async fn handle_store(&self, message: &Message) -> Result<()> {
        let (key, value) = match (message.key(), message.value()) {
            (Some(key), Some(value)) => (key.to_string(), value.to_string()),
            _ => return Err(KademliaError::BadKeyValue),
        };

        debug!("Storing {} for {}", key, message.sender_id);
        self.node.put_value(key, value).await;
        Ok(())
    }

    async fn handle_find_node(&self, message: &Message) -> Result<Payload> {
        let target = match (&message.payload, message.target_id) {
            (Some(_), Some(target)) => target,
            _ => return Err(KademliaError::NoTargetId),
        };

        let contacts = self.node.find_closest(&target, BUCKET_SIZE).await;
        Ok(Payload::contacts(contacts))
    }

    async fn handle_find_value(&self, message: &Message) -> Result<Payload> {
        if message.target_id.is_none() {
            return Err(KademliaError::NoTargetId);
        }
        let key = message.key().ok_or(KademliaError::BadKeyValue)?;

        match self.node.get_value(key).await {
            Some(value) => Ok(Payload::key_value(key, value)),
            None => self.handle_find_node(message).await,
        }
    }
}
