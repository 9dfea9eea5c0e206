//! Randomness helpers backed by the operating system RNG.

use crate::identity::IdentityError;

/// Fill a fresh 32-byte array from the OS RNG.
pub fn random_bytes32() -> Result<[u8; 32], IdentityError> {
    let mut b = [0u8; 32];
    getrandom::getrandom(&mut b).map_err(|_| IdentityError::Randomness)?;
    Ok(b)
}

/// Random lowercase hex string of `byte_count * 2` characters.
///
/// Used for connection secrets and BIP-340 auxiliary randomness.
pub fn random_hex(byte_count: usize) -> Result<String, IdentityError> {
    let mut b = vec![0u8; byte_count];
    getrandom::getrandom(&mut b).map_err(|_| IdentityError::Randomness)?;
    Ok(hex::encode(b))
}
