use sha2::{Digest, Sha256};

use crate::network::dht::{ID_LENGTH, NodeId};
use crate::utils::Result;

pub struct HashUtils;

impl HashUtils {
    /// Content key for a stored value: the SHA-256 digest truncated to an
    /// identifier's width, as 40 lowercase hex characters.
    pub fn content_key(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(&hasher.finalize()[..ID_LENGTH])
    }

    /// The position of a content key in identifier space.
    pub fn key_id(key: &str) -> Result<NodeId> {
        NodeId::from_hex(key)
    }

    /// True if `key` is well formed: exactly 40 hex characters.
    pub fn is_valid_key(key: &str) -> bool {
        key.len() == ID_LENGTH * 2 && key.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_is_stable() {
        let key = HashUtils::content_key(b"hello world");
        assert_eq!(key.len(), 40);
        assert_eq!(key, HashUtils::content_key(b"hello world"));
        assert_ne!(key, HashUtils::content_key(b"hello world!"));
        assert!(HashUtils::is_valid_key(&key));
    }

    #[test]
    fn test_content_key_is_digest_prefix() {
        // SHA-256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        let key = HashUtils::content_key(b"abc");
        assert_eq!(key, "ba7816bf8f01cfea414140de5dae2223b00361a3");
    }

    #[test]
    fn test_key_validation() {
        assert!(!HashUtils::is_valid_key("abc"));
        assert!(!HashUtils::is_valid_key("zz7816bf8f01cfea414140de5dae2223b00361a3"));
        assert!(HashUtils::is_valid_key("BA7816BF8F01CFEA414140DE5DAE2223B00361A3"));
        assert!(HashUtils::key_id("abc").is_err());
        assert_eq!(
            HashUtils::key_id("ba7816bf8f01cfea414140de5dae2223b00361a3")
                .unwrap()
                .to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a3"
        );
    }
}
