//! Aegis Core - handshake correlation for inter-app NIP-46 authentication.
//!
//! This crate implements:
//! - The `nostrconnect://` connection URI codec and the x-callback launch URI
//! - A registry correlating callback tokens with pending handshakes
//! - The handshake state machine driving one authentication attempt
//! - Callback ingestion for URIs redirected back by the signer app

#![forbid(unsafe_code)]

// Core state machine
pub mod handshake;
pub mod registry;
pub mod ingest;

// Wire format
pub mod uri;

// Supporting modules
pub mod errors;
pub mod types;
pub mod harness;

#[cfg(test)]
mod proptests;

pub use errors::{HandshakeError, RegistryError, UriError};
pub use handshake::{
    ConnectParams, Connected, ExternalLauncher, Handshake, HandshakeConfig, HandshakeCoordinator,
    HandshakeState,
};
pub use ingest::CallbackIngestor;
pub use registry::{Outcome, PendingRequestRegistry, Resolution};
pub use types::{ConnectionRequest, Credential, RedirectConfig};
