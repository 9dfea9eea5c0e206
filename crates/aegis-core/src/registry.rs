//! Pending request registry.
//!
//! Maps a correlation token to the one-shot resolver of the handshake that
//! is waiting for it. All access goes through one mutex, held only for the
//! lookup and removal; resolvers are fired by the caller after the lock is
//! released.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{HandshakeError, RegistryError};
use crate::types::Credential;
use crate::uri::CallbackUri;

/// Outcome delivered to a waiting handshake.
pub type Outcome = Result<Credential, HandshakeError>;

/// One-shot completion hook. Sending consumes it.
pub type Resolver = oneshot::Sender<Outcome>;

const UNKNOWN_CALLBACK_URL: &str = "unknown";

struct PendingEntry {
    resolver: Resolver,
    /// `x-success` value sent with this request
    success_redirect: Option<String>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, PendingEntry>,
    last_sent_success: Option<String>,
}

/// A matched entry, already removed from the registry.
///
/// Firing consumes the resolution, so an entry can be delivered at most once.
pub struct Resolution {
    token: String,
    resolver: Resolver,
    outcome: Outcome,
}

impl Resolution {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Deliver the outcome. Returns `false` if the waiting side is gone.
    pub fn fire(self) -> bool {
        self.resolver.send(self.outcome).is_ok()
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("token", &self.token)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Concurrent-safe table of pending handshakes keyed by correlation token.
#[derive(Default)]
pub struct PendingRequestRegistry {
    inner: Mutex<Table>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Resolvers never run under the lock, so a poisoned table is still consistent.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a pending entry. The token must not already be pending.
    pub fn register(&self, token: impl Into<String>, resolver: Resolver) -> Result<(), RegistryError> {
        self.insert(token.into(), resolver, None)
    }

    /// Insert a pending entry and record the `x-success` value sent with it.
    ///
    /// The value also becomes the registry-wide "last sent success" fallback.
    pub fn register_with_success(
        &self,
        token: impl Into<String>,
        resolver: Resolver,
        success_redirect: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.insert(token.into(), resolver, Some(success_redirect.into()))
    }

    fn insert(
        &self,
        token: String,
        resolver: Resolver,
        success_redirect: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut table = self.lock();
        if table.entries.contains_key(&token) {
            warn!(token = %token, "correlation token collision");
            return Err(RegistryError::DuplicateToken(token));
        }
        if let Some(success) = &success_redirect {
            table.last_sent_success = Some(success.clone());
        }
        table.entries.insert(
            token.clone(),
            PendingEntry {
                resolver,
                success_redirect,
            },
        );
        debug!(token = %token, pending = table.entries.len(), "registered pending handshake");
        Ok(())
    }

    /// Remove an entry without firing it. Returns whether it was present.
    pub fn remove(&self, token: &str) -> bool {
        let removed = self.lock().entries.remove(token).is_some();
        if removed {
            debug!(token = %token, "removed pending handshake");
        }
        removed
    }

    /// Find, remove, and classify the entry a callback belongs to.
    ///
    /// With a `state` token the lookup is exact and a miss yields `Ok(None)`.
    /// Without one, the single pending entry is taken; if more than one is
    /// pending the callback is ambiguous and nothing is removed.
    pub fn resolve(&self, callback: &CallbackUri) -> Result<Option<Resolution>, RegistryError> {
        let (token, entry, fallback_success) = {
            let mut table = self.lock();
            let found = match callback.token() {
                Some(token) => table.entries.remove_entry(token),
                None => match table.entries.len() {
                    0 => None,
                    1 => {
                        let token = table.entries.keys().next().cloned();
                        token.and_then(|t| table.entries.remove_entry(&t))
                    }
                    pending => return Err(RegistryError::AmbiguousCallback { pending }),
                },
            };
            match found {
                Some((token, entry)) => (token, entry, table.last_sent_success.clone()),
                None => return Ok(None),
            }
        };

        let callback_url = entry
            .success_redirect
            .or(fallback_success)
            .unwrap_or_else(|| UNKNOWN_CALLBACK_URL.to_string());

        Ok(Some(Resolution {
            token,
            resolver: entry.resolver,
            outcome: classify(callback, callback_url),
        }))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recently registered `x-success` value.
    pub fn last_sent_success(&self) -> Option<String> {
        self.lock().last_sent_success.clone()
    }
}

/// Success if the path carries the success marker; otherwise the error code
/// decides between a user cancellation and a verification failure.
fn classify(callback: &CallbackUri, callback_url: String) -> Outcome {
    if callback.is_success() {
        Ok(Credential {
            callback_url,
            full_callback_url: callback.full().to_string(),
            query_parameters: callback.query_map(),
        })
    } else if callback.is_user_cancel() {
        Err(HandshakeError::UserCancelled)
    } else {
        Err(HandshakeError::VerificationFailed)
    }
}
