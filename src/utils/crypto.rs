use rand::RngCore;

pub struct CryptoUtils;

impl CryptoUtils {
    /// `len` random bytes.
    pub fn random_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Lowercase hex encoding of `len` random bytes (so `2 * len` characters).
    pub fn random_hex(len: usize) -> String {
        hex::encode(Self::random_bytes(len))
    }
}
