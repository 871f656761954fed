use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::network::NodeHandle;
use crate::network::dht::{AddContact, Contact, NodeId, RoutingTable};
use crate::storage::LocalStore;

/// Routing table and local content shared by a node's own lookups and the
/// inbound RPC handler. Every routing mutation goes through the one table lock.
pub struct DhtState {
    me: Contact,
    routing_table: RwLock<RoutingTable>,
    store: LocalStore,
}

impl DhtState {
    pub fn new(me: Contact) -> Self {
        Self {
            routing_table: RwLock::new(RoutingTable::new(me.clone())),
            me,
            store: LocalStore::new(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub async fn contact_count(&self) -> usize {
        self.routing_table.read().await.contact_count()
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        self.routing_table.read().await.contains(id)
    }

    pub async fn all_contacts(&self) -> Vec<Contact> {
        self.routing_table.read().await.all_contacts()
    }

    /// Contacts of one bucket, most recently seen first.
    pub async fn bucket_contacts(&self, index: usize) -> Vec<Contact> {
        self.routing_table
            .read()
            .await
            .bucket(index)
            .map(|bucket| bucket.contacts().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NodeHandle for DhtState {
    fn me(&self) -> Contact {
        self.me.clone()
    }

    async fn add_contact(&self, contact: Contact) -> AddContact {
        self.routing_table.write().await.add_contact(contact)
    }

    async fn replace_or_ignore(&self, stale: &Contact, fresh: Contact, stale_alive: bool) -> bool {
        self.routing_table
            .write()
            .await
            .replace_or_ignore(stale, fresh, stale_alive)
    }

    async fn remove_contact(&self, id: &NodeId) -> Option<Contact> {
        let removed = self.routing_table.write().await.remove_contact(id);
        if let Some(contact) = &removed {
            debug!("Removed contact {}", contact);
        }
        removed
    }

    async fn find_closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        self.routing_table
            .read()
            .await
            .find_closest_contacts(target, count)
    }

    async fn get_value(&self, key: &str) -> Option<String> {
        self.store.get(key).await
    }

    async fn put_value(&self, key: String, value: String) {
        self.store.insert(key, value).await;
    }
}
