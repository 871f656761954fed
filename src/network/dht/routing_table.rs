use log::debug;

use super::bucket::{BUCKET_SIZE, Bucket, BucketInsert};
use super::contact::Contact;
use super::node_id::{ID_BITS, NodeId};

/// Outcome of [`RoutingTable::add_contact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddContact {
    Added,
    Refreshed,
    /// The contact is the table owner.
    Ignored,
    /// The bucket is full. The caller should ping `least_recent` and settle
    /// the slot with [`RoutingTable::replace_or_ignore`].
    BucketFull { least_recent: Contact },
}

/// Routing table for the DHT: one bucket per possible shared-prefix length.
pub struct RoutingTable {
    me: Contact,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create a new routing table owned by `me`
    pub fn new(me: Contact) -> Self {
        let buckets = (0..ID_BITS).map(|_| Bucket::new()).collect();
        Self { me, buckets }
    }

    pub fn me(&self) -> &Contact {
        &self.me
    }

    /// Bucket a given id belongs to: the length of its shared prefix with us.
    /// Only defined for ids other than our own.
    pub fn bucket_index(&self, id: &NodeId) -> usize {
        self.me.id.shared_prefix_len(id).min(ID_BITS - 1)
    }

    /// Add or refresh a contact
    pub fn add_contact(&mut self, contact: Contact) -> AddContact {
        if contact.id == self.me.id {
            return AddContact::Ignored;
        }

        let index = self.bucket_index(&contact.id);
        let bucket = &mut self.buckets[index];
        match bucket.add_contact(contact) {
            BucketInsert::Added => AddContact::Added,
            BucketInsert::Refreshed => AddContact::Refreshed,
            BucketInsert::Full => match bucket.least_recent() {
                Some(least_recent) => {
                    debug!("Bucket {} full, eviction candidate {}", index, least_recent);
                    AddContact::BucketFull {
                        least_recent: least_recent.clone(),
                    }
                }
                None => AddContact::Ignored,
            },
        }
    }

    /// Settle a full bucket once `stale` has been pinged. A live `stale` is
    /// refreshed and `fresh` dropped; a dead one makes room for `fresh`.
    /// Returns true if `fresh` was inserted.
    pub fn replace_or_ignore(&mut self, stale: &Contact, fresh: Contact, stale_alive: bool) -> bool {
        if fresh.id == self.me.id {
            return false;
        }

        let index = self.bucket_index(&fresh.id);
        let bucket = &mut self.buckets[index];

        if stale_alive {
            if bucket.contains(&stale.id) {
                bucket.add_contact(stale.clone());
            }
            return false;
        }

        bucket.remove_contact(&stale.id);
        matches!(
            bucket.add_contact(fresh),
            BucketInsert::Added | BucketInsert::Refreshed
        )
    }

    /// Remove a contact
    pub fn remove_contact(&mut self, id: &NodeId) -> Option<Contact> {
        if id == &self.me.id {
            return None;
        }
        let index = self.bucket_index(id);
        self.buckets[index].remove_contact(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        id != &self.me.id && self.buckets[self.bucket_index(id)].contains(id)
    }

    /// The `count` contacts closest to `target`, nearest first, each with
    /// its distance to `target` filled in.
    pub fn find_closest_contacts(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let mut candidates: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.contacts_with_distance(target))
            .collect();

        // stable sort keeps scan order for (improbable) exact ties
        candidates.sort_by(|a, b| a.cmp_distance(b));
        candidates.truncate(count);
        candidates
    }

    /// Per-bucket capacity, which also bounds lookup result size.
    pub fn bucket_size(&self) -> usize {
        BUCKET_SIZE
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    /// Get the total number of contacts
    pub fn contact_count(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn all_contacts(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.contacts().cloned())
            .collect()
    }
}
