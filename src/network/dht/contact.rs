use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;

use super::node_id::NodeId;

/// A peer in the DHT network.
///
/// Identity is the `id` alone: the address may change and `distance` is a
/// scratch value relative to whatever target was last passed to
/// [`Contact::calc_distance`].
#[derive(Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub address: SocketAddr,
    #[serde(skip)]
    pub distance: Option<NodeId>,
}

impl Contact {
    /// Create a new contact
    pub fn new(id: NodeId, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            distance: None,
        }
    }

    /// Compute and remember the distance from this contact to `target`
    pub fn calc_distance(&mut self, target: &NodeId) {
        self.distance = Some(self.id.distance(target));
    }

    /// Same contact with its distance to `target` filled in
    pub fn with_distance(mut self, target: &NodeId) -> Self {
        self.calc_distance(target);
        self
    }

    /// Compare by previously computed distance. Only meaningful when both
    /// distances were computed against the same target.
    pub fn cmp_distance(&self, other: &Contact) -> Ordering {
        self.distance.cmp(&other.distance)
    }

    pub fn less_than(&self, other: &Contact) -> bool {
        self.cmp_distance(other) == Ordering::Less
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl fmt::Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contact({:?} @ {})", self.id, self.address)
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}
