//! Callback ingestion.
//!
//! The only externally triggered entry point: the host application hands
//! every URI it is opened with to [`CallbackIngestor::ingest`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::registry::PendingRequestRegistry;
use crate::uri::CallbackUri;

/// Routes inbound callback URIs to the pending handshake they belong to.
#[derive(Clone)]
pub struct CallbackIngestor {
    registry: Arc<PendingRequestRegistry>,
}

impl CallbackIngestor {
    pub fn new(registry: Arc<PendingRequestRegistry>) -> Self {
        Self { registry }
    }

    /// Handle an inbound URI. Returns `true` if it resolved a pending handshake.
    ///
    /// Unparseable, unmatched, and ambiguous URIs are dropped without touching
    /// the registry.
    pub fn ingest(&self, uri: &str) -> bool {
        let callback = match CallbackUri::parse(uri) {
            Ok(callback) => callback,
            Err(e) => {
                debug!(error = %e, "ignoring unparseable callback");
                return false;
            }
        };

        let resolution = match self.registry.resolve(&callback) {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                debug!(path = %callback.path(), "no pending handshake matches callback");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "dropping callback");
                return false;
            }
        };

        let token = resolution.token().to_string();
        let success = resolution.outcome().is_ok();
        if resolution.fire() {
            info!(token = %token, success, "handshake resolved");
        } else {
            debug!(token = %token, "handshake was no longer awaiting its callback");
        }
        true
    }
}
