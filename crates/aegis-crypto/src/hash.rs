use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Digest signed by BIP-340 for an arbitrary-length message.
pub fn message_digest(message: &[u8]) -> [u8; 32] {
    sha256(message)
}
