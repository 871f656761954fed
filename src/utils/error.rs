use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KademliaError>;

#[derive(Error, Debug)]
pub enum KademliaError {
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("RPC type is invalid: {0}")]
    InvalidRpcType(String),

    #[error("No contact was given: {0}")]
    MissingContact(&'static str),

    #[error("No TargetID given")]
    NoTargetId,

    #[error("Bad or no key or value given")]
    BadKeyValue,

    #[error("RPC ID was different: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("Receive address {received} not same as send address {sent}")]
    AddressMismatch {
        sent: SocketAddr,
        received: SocketAddr,
    },

    #[error("Did not receive a reply")]
    EmptyReply,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Too busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Node has been shut down")]
    NodeShutdown,
}

impl KademliaError {
    /// True for failures that mean the peer did not answer usefully, as
    /// opposed to bad arguments or exhausted resources on our side.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            KademliaError::Transport(_)
                | KademliaError::EmptyReply
                | KademliaError::IdMismatch { .. }
                | KademliaError::AddressMismatch { .. }
                | KademliaError::Decode(_)
        )
    }
}

impl From<std::io::Error> for KademliaError {
    fn from(err: std::io::Error) -> Self {
        KademliaError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for KademliaError {
    fn from(err: serde_json::Error) -> Self {
        KademliaError::Decode(err.to_string())
    }
}

impl From<hex::FromHexError> for KademliaError {
    fn from(err: hex::FromHexError) -> Self {
        KademliaError::InvalidEncoding(err.to_string())
    }
}
