//! Identity module for the requesting party's secp256k1 key pair.
//!
//! Public keys use the BIP-340 x-only convention (32 bytes) and signatures are
//! 64-byte Schnorr signatures. Keys and signatures travel as lowercase hex.

use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use signature::hazmat::PrehashVerifier;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::message_digest;
use crate::random::random_bytes32;

pub const SECRET_KEY_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Error type for identity operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("secret key is not a valid secp256k1 scalar")]
    InvalidSecretKey,
    #[error("operating system randomness unavailable")]
    Randomness,
    #[error("schnorr signing failed")]
    Signing,
}

/// A secp256k1 key pair identifying the requesting party.
///
/// `public_key_hex` is always derived from the secret and never set
/// independently. Secret material is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)] // SigningKey zeroizes its scalar on drop
    signing_key: SigningKey,
    secret_key_hex: String,
    #[zeroize(skip)]
    public_key_hex: String,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    ///
    /// The only failure paths are an unavailable RNG or, with negligible
    /// probability, a sampled value outside the curve order.
    pub fn generate() -> Result<Self, IdentityError> {
        let mut secret = random_bytes32()?;
        let result = Self::from_secret_bytes(&secret);
        secret.zeroize();
        result
    }

    /// Build a key pair from a raw 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_LEN]) -> Result<Self, IdentityError> {
        let signing_key =
            SigningKey::from_bytes(secret).map_err(|_| IdentityError::InvalidSecretKey)?;
        let public_key_hex = hex::encode(signing_key.verifying_key().to_bytes());
        Ok(Self {
            signing_key,
            secret_key_hex: hex::encode(secret),
            public_key_hex,
        })
    }

    /// Build a key pair from a 64-character hex secret (either case).
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, IdentityError> {
        let mut bytes = decode_fixed::<SECRET_KEY_LEN>(secret_hex)?;
        let result = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Lowercase hex of the 32-byte secret.
    pub fn secret_key_hex(&self) -> &str {
        &self.secret_key_hex
    }

    /// Lowercase hex of the 32-byte x-only public key.
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(&self.signing_key.verifying_key().to_bytes());
        out
    }

    /// Sign `message` with fresh 32-byte auxiliary randomness.
    ///
    /// BIP-340 runs over `SHA-256(message)`, not over `message` itself, so
    /// [`verify`] must see the same message bytes. To sign a value that is
    /// already a 32-byte digest (a Nostr event id, for example) without
    /// hashing it again, use [`KeyPair::sign_digest_with_aux_rand`].
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], IdentityError> {
        let aux = random_bytes32()?;
        self.sign_with_aux_rand(message, &aux)
    }

    /// Sign `message` with caller-supplied auxiliary randomness.
    ///
    /// The same `(secret, message, aux)` triple always yields the same
    /// signature. The message is hashed with SHA-256 before signing.
    pub fn sign_with_aux_rand(
        &self,
        message: &[u8],
        aux_rand: &[u8; 32],
    ) -> Result<[u8; SIGNATURE_LEN], IdentityError> {
        self.sign_digest_with_aux_rand(&message_digest(message), aux_rand)
    }

    /// Raw BIP-340 signing over a 32-byte digest.
    pub fn sign_digest_with_aux_rand(
        &self,
        digest: &[u8; 32],
        aux_rand: &[u8; 32],
    ) -> Result<[u8; SIGNATURE_LEN], IdentityError> {
        let sig = self
            .signing_key
            .sign_prehash_with_aux_rand(digest, aux_rand)
            .map_err(|_| IdentityError::Signing)?;
        Ok(sig.to_bytes())
    }

    /// Sign and return the 128-character lowercase hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> Result<String, IdentityError> {
        Ok(hex::encode(self.sign(message)?))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_hex", &self.public_key_hex)
            .field("secret_key_hex", &"<redacted>")
            .finish()
    }
}

/// Sign `message` with a hex-encoded secret key, returning a hex signature.
pub fn sign(secret_key_hex: &str, message: &[u8]) -> Result<String, IdentityError> {
    KeyPair::from_secret_hex(secret_key_hex)?.sign_hex(message)
}

/// Verify a BIP-340 signature over `message`.
///
/// Returns `false` for wrong-length inputs, keys that are not on the curve,
/// and signatures that do not verify. Never panics.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    if public_key.len() != PUBLIC_KEY_LEN || signature.len() != SIGNATURE_LEN {
        return false;
    }
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::try_from(signature) else {
        return false;
    };
    verifying_key
        .verify_prehash(&message_digest(message), &sig)
        .is_ok()
}

/// Hex-string variant of [`verify`]; malformed hex yields `false`.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    match (hex::decode(public_key_hex), hex::decode(signature_hex)) {
        (Ok(pk), Ok(sig)) => verify(&pk, message, &sig),
        _ => false,
    }
}

/// True for exactly 64 ASCII hex digits (either case).
pub fn is_public_key_hex(s: &str) -> bool {
    s.len() == PUBLIC_KEY_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdentityError> {
    if s.len() != N * 2 {
        return Err(IdentityError::InvalidKeyLength {
            expected: N,
            got: s.len() / 2,
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).map_err(|_| IdentityError::InvalidHex)?;
    Ok(out)
}
