#![forbid(unsafe_code)]

pub mod hash;
pub mod identity;
pub mod random;

#[cfg(test)]
mod proptests;

pub use identity::{is_public_key_hex, sign, verify, verify_hex, IdentityError, KeyPair};
