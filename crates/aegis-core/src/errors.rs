//! Error types for Aegis Core.
//!
//! `HandshakeError` is the outcome taxonomy reported to callers of a
//! handshake. `RegistryError` and `UriError` stay internal to the
//! correlation engine and the codec, and are mapped at the boundary.

use std::time::Duration;

use aegis_crypto::IdentityError;
use thiserror::Error;

// ============================================================================
// Handshake Outcome Errors
// ============================================================================

/// Terminal failure of a handshake attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The signer app reported an explicit user cancellation
    #[error("user cancelled the request")]
    UserCancelled,

    /// Malformed or missing input, detected before any external interaction
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The launcher could not hand control to the signer app
    #[error("unable to launch external app")]
    UnableToLaunchExternalApp,

    /// Any error callback other than a user cancellation
    #[error("verification failed")]
    VerificationFailed,

    /// No callback arrived within the configured timeout
    #[error("no callback received within {0:?}")]
    Timeout(Duration),

    /// The pending entry was discarded before a callback fired it
    #[error("pending request was discarded before a callback arrived")]
    Abandoned,

    /// Operation called in the wrong state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Identity generation failed
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl HandshakeError {
    /// Errors raised by the signer app's error callback.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::UserCancelled | Self::VerificationFailed)
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors from the pending request registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The token generator produced a token that is still pending
    #[error("correlation token already pending: {0}")]
    DuplicateToken(String),

    /// A callback without a token arrived while several requests were pending
    #[error("callback carries no correlation token and {pending} requests are pending")]
    AmbiguousCallback { pending: usize },
}

// ============================================================================
// URI Errors
// ============================================================================

/// Errors from parsing connection, launch, or callback URIs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("malformed uri: {0}")]
    Malformed(String),

    #[error("uri has no query component")]
    MissingQuery,

    #[error("unexpected scheme: expected {expected}, got {got}")]
    WrongScheme { expected: String, got: String },

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(String),
}

impl From<url::ParseError> for UriError {
    fn from(e: url::ParseError) -> Self {
        UriError::Malformed(e.to_string())
    }
}
