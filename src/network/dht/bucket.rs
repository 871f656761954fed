use std::collections::VecDeque;

use super::contact::Contact;
use super::node_id::NodeId;

/// Bucket capacity, the `k` of the Kademlia paper.
pub const BUCKET_SIZE: usize = 5;

/// Result of offering a contact to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketInsert {
    Added,
    Refreshed,
    Full,
}

/// Up to [`BUCKET_SIZE`] unique contacts, most recently seen at the front.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    contacts: VecDeque<Contact>,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            contacts: VecDeque::with_capacity(BUCKET_SIZE),
        }
    }

    /// Move a known contact to the front, or insert a new one at the front
    /// if there is room. A full bucket is left untouched.
    pub fn add_contact(&mut self, contact: Contact) -> BucketInsert {
        if let Some(pos) = self.position(&contact.id) {
            if let Some(mut existing) = self.contacts.remove(pos) {
                // keep the freshest address we have seen for this peer
                existing.address = contact.address;
                self.contacts.push_front(existing);
            }
            return BucketInsert::Refreshed;
        }

        if self.contacts.len() < BUCKET_SIZE {
            self.contacts.push_front(contact);
            return BucketInsert::Added;
        }

        BucketInsert::Full
    }

    pub fn remove_contact(&mut self, id: &NodeId) -> Option<Contact> {
        let pos = self.position(id)?;
        self.contacts.remove(pos)
    }

    /// The least recently seen contact, first in line for eviction.
    pub fn least_recent(&self) -> Option<&Contact> {
        self.contacts.back()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.position(id).is_some()
    }

    /// All contacts with their distance to `target` filled in.
    pub fn contacts_with_distance(&self, target: &NodeId) -> Vec<Contact> {
        self.contacts
            .iter()
            .map(|c| c.clone().with_distance(target))
            .collect()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= BUCKET_SIZE
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.contacts.iter().position(|c| &c.id == id)
    }
}
