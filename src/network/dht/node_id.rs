use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::utils::{KademliaError, Result};

/// Number of bytes in an identifier.
pub const ID_LENGTH: usize = 20;

/// Number of bits in an identifier, and so the number of routing buckets.
pub const ID_BITS: usize = ID_LENGTH * 8;

/// 160-bit identifier shared by nodes and content keys.
///
/// Ordering is byte-major from the most significant byte, which is also the
/// order of XOR distances when both sides are distances to the same target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; ID_LENGTH]);

impl NodeId {
    /// The all-zero identifier.
    pub const ZERO: NodeId = NodeId([0u8; ID_LENGTH]);

    /// The largest possible identifier, also the largest possible distance.
    pub const MAX: NodeId = NodeId([0xFF; ID_LENGTH]);

    /// Create a NodeId from raw bytes
    pub fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate a uniformly random NodeId
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Parse a 40 character hex string. Upper and lower case are accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != ID_LENGTH * 2 {
            return Err(KademliaError::InvalidEncoding(format!(
                "identifier must be {} hex characters, got {}",
                ID_LENGTH * 2,
                s.len()
            )));
        }

        let mut bytes = [0u8; ID_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// XOR distance. Symmetric, and zero only against itself.
    pub fn distance(&self, other: &NodeId) -> NodeId {
        let mut result = [0u8; ID_LENGTH];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        NodeId(result)
    }

    /// Byte-by-byte comparison from the most significant byte.
    pub fn less_than(&self, other: &NodeId) -> bool {
        self < other
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Length of the common prefix with `other`, counted in bits from the
    /// most significant bit. Equals `ID_BITS` when the ids are identical.
    pub fn shared_prefix_len(&self, other: &NodeId) -> usize {
        let distance = self.distance(other);

        for (i, &byte) in distance.0.iter().enumerate() {
            if byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }

        ID_BITS
    }

    /// Random id whose shared prefix with `self` is exactly `prefix_len` bits:
    /// the bit at `prefix_len` is flipped and every less significant bit is
    /// randomized. Such an id falls into bucket `prefix_len` of a table owned
    /// by `self`.
    pub fn random_in_bucket(&self, prefix_len: usize) -> NodeId {
        if prefix_len >= ID_BITS {
            return NodeId::random();
        }

        let mut id = self.0;
        let byte_idx = prefix_len / 8;
        let bit_idx = 7 - (prefix_len % 8);

        id[byte_idx] ^= 1 << bit_idx;

        if bit_idx > 0 {
            let random_byte: u8 = rand::random();
            let keep_mask = !((1u8 << bit_idx) - 1);
            let random_mask = (1u8 << bit_idx) - 1;
            id[byte_idx] = (id[byte_idx] & keep_mask) | (random_byte & random_mask);
        }

        for byte in id.iter_mut().skip(byte_idx + 1) {
            *byte = rand::random();
        }

        NodeId(id)
    }
}

impl FromStr for NodeId {
    type Err = KademliaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Identifiers travel as hex strings on the wire.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = NodeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 40 character hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<NodeId, E> {
                NodeId::from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}
