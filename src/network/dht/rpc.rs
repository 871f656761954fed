use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::contact::Contact;
use super::node_id::{ID_LENGTH, NodeId};
use crate::utils::{CryptoUtils, KademliaError, Result};

/// RPC kinds understood by the protocol. Requests carry one of the first
/// four; every reply carries `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcType {
    Ping,
    Store,
    FindNode,
    FindValue,
    Ok,
}

impl RpcType {
    pub const ALL: [RpcType; 5] = [
        RpcType::Ping,
        RpcType::Store,
        RpcType::FindNode,
        RpcType::FindValue,
        RpcType::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RpcType::Ping => "PING",
            RpcType::Store => "STORE",
            RpcType::FindNode => "FIND_NODE",
            RpcType::FindValue => "FIND_VALUE",
            RpcType::Ok => "OK",
        }
    }
}

impl FromStr for RpcType {
    type Err = KademliaError;

    fn from_str(s: &str) -> Result<Self> {
        RpcType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KademliaError::InvalidRpcType(s.to_string()))
    }
}

impl fmt::Display for RpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by an RPC: a key and/or value, and/or a list of contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub contacts: Vec<Contact>,
}

impl Payload {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn key_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            contacts: Vec::new(),
        }
    }

    pub fn contacts(contacts: Vec<Contact>) -> Self {
        Self {
            contacts,
            ..Self::default()
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Contact>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Contact>>::deserialize(deserializer)?.unwrap_or_default())
}

/// An RPC envelope.
///
/// A request becomes its own reply on the serving side: the type flips to
/// `Ok`, `sender_id` is restamped and the payload replaced, while `id` (the
/// correlation token) is left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub rpc_type: RpcType,
    pub id: String,
    #[serde(rename = "senderID")]
    pub sender_id: NodeId,
    #[serde(rename = "targetID", default)]
    pub target_id: Option<NodeId>,
    #[serde(default)]
    pub payload: Option<Payload>,
}

impl Message {
    /// Create a message with a fresh correlation id.
    pub fn new(
        rpc_type: RpcType,
        sender_id: NodeId,
        target_id: Option<NodeId>,
        payload: Payload,
    ) -> Self {
        Self {
            rpc_type,
            id: Self::new_correlation_id(),
            sender_id,
            target_id,
            payload: Some(payload),
        }
    }

    /// Same as [`Message::new`] with the type given by its wire token.
    pub fn from_type_name(
        rpc_type: &str,
        sender_id: NodeId,
        target_id: Option<NodeId>,
        payload: Payload,
    ) -> Result<Self> {
        Ok(Self::new(rpc_type.parse()?, sender_id, target_id, payload))
    }

    /// 20 random bytes, hex encoded.
    pub fn new_correlation_id() -> String {
        CryptoUtils::random_hex(ID_LENGTH)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn key(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.key.as_deref())
    }

    pub fn value(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.value.as_deref())
    }

    pub fn contacts(&self) -> &[Contact] {
        self.payload
            .as_ref()
            .map(|p| p.contacts.as_slice())
            .unwrap_or(&[])
    }
}
