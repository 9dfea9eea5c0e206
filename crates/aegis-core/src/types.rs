use std::collections::HashMap;
use std::sync::Arc;

use aegis_crypto::is_public_key_hex;
use serde::{Deserialize, Serialize};

use crate::errors::HandshakeError;

/// Relay used when neither the caller nor the config names one.
pub const DEFAULT_RELAY: &str = "ws://127.0.0.1:8081";

/// Path suffixes used by [`RedirectConfig::for_scheme`].
pub const SUCCESS_PATH: &str = "nip46AuthSuccess";
pub const ERROR_PATH: &str = "nip46AuthError";

/// Produces a fresh correlation token per call.
pub type TokenGenerator = Arc<dyn Fn() -> String + Send + Sync>;

// ============================================================================
// Connection Request
// ============================================================================

/// A NIP-46 connection request. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionRequest {
    client_public_key: String,
    shared_secret: String,
    relays: Vec<String>,
    permissions: Option<String>,
    display_name: Option<String>,
    app_url: Option<String>,
    app_image_url: Option<String>,
    callback_scheme: Option<String>,
}

impl ConnectionRequest {
    pub fn builder(
        client_public_key: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> ConnectionRequestBuilder {
        ConnectionRequestBuilder {
            client_public_key: client_public_key.into(),
            shared_secret: shared_secret.into(),
            relays: Vec::new(),
            permissions: None,
            display_name: None,
            app_url: None,
            app_image_url: None,
            callback_scheme: None,
        }
    }

    /// Lowercase 64-char hex x-only public key.
    pub fn client_public_key(&self) -> &str {
        &self.client_public_key
    }

    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }

    /// Relays in the order they were added. Never empty.
    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    pub fn permissions(&self) -> Option<&str> {
        self.permissions.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn app_url(&self) -> Option<&str> {
        self.app_url.as_deref()
    }

    pub fn app_image_url(&self) -> Option<&str> {
        self.app_image_url.as_deref()
    }

    pub fn callback_scheme(&self) -> Option<&str> {
        self.callback_scheme.as_deref()
    }
}

/// Builder for [`ConnectionRequest`]. Empty optional values are treated as absent.
#[derive(Clone, Debug)]
pub struct ConnectionRequestBuilder {
    client_public_key: String,
    shared_secret: String,
    relays: Vec<String>,
    permissions: Option<String>,
    display_name: Option<String>,
    app_url: Option<String>,
    app_image_url: Option<String>,
    callback_scheme: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ConnectionRequestBuilder {
    pub fn relay(mut self, relay: impl Into<String>) -> Self {
        self.relays.push(relay.into());
        self
    }

    pub fn relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays.extend(relays.into_iter().map(Into::into));
        self
    }

    pub fn permissions(mut self, perms: Option<String>) -> Self {
        self.permissions = non_empty(perms);
        self
    }

    pub fn display_name(mut self, name: Option<String>) -> Self {
        self.display_name = non_empty(name);
        self
    }

    pub fn app_url(mut self, url: Option<String>) -> Self {
        self.app_url = non_empty(url);
        self
    }

    pub fn app_image_url(mut self, image: Option<String>) -> Self {
        self.app_image_url = non_empty(image);
        self
    }

    pub fn callback_scheme(mut self, scheme: Option<String>) -> Self {
        self.callback_scheme = non_empty(scheme);
        self
    }

    /// Validate and freeze the request.
    pub fn build(self) -> Result<ConnectionRequest, HandshakeError> {
        if self.client_public_key.is_empty() {
            return Err(HandshakeError::InvalidParameter(
                "client public key cannot be empty".into(),
            ));
        }
        if !is_public_key_hex(&self.client_public_key) {
            return Err(HandshakeError::InvalidParameter(
                "client public key should be a 64-character hex string".into(),
            ));
        }
        if self.shared_secret.is_empty() {
            return Err(HandshakeError::InvalidParameter("secret cannot be empty".into()));
        }
        if self.relays.is_empty() {
            return Err(HandshakeError::InvalidParameter(
                "at least one relay is required".into(),
            ));
        }
        if self.relays.iter().any(|r| r.is_empty()) {
            return Err(HandshakeError::InvalidParameter("relay cannot be empty".into()));
        }

        Ok(ConnectionRequest {
            client_public_key: self.client_public_key.to_ascii_lowercase(),
            shared_secret: self.shared_secret,
            relays: self.relays,
            permissions: self.permissions,
            display_name: self.display_name,
            app_url: self.app_url,
            app_image_url: self.app_image_url,
            callback_scheme: self.callback_scheme,
        })
    }
}

// ============================================================================
// Redirect Configuration
// ============================================================================

/// x-callback redirect targets handed to the signer app, plus the token source.
#[derive(Clone)]
pub struct RedirectConfig {
    /// Caller's own callback scheme identifier (`x-source`)
    pub source: String,
    /// Redirect target on success (`x-success`)
    pub success_path: String,
    /// Redirect target on failure (`x-error`)
    pub error_path: String,
    token_generator: TokenGenerator,
}

impl RedirectConfig {
    /// Redirect config with random UUID v4 correlation tokens.
    pub fn new(
        source: impl Into<String>,
        success_path: impl Into<String>,
        error_path: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            success_path: success_path.into(),
            error_path: error_path.into(),
            token_generator: Arc::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// `<scheme>://x-callback-url/nip46AuthSuccess` and `.../nip46AuthError`.
    pub fn for_scheme(scheme: &str) -> Self {
        Self::new(
            scheme,
            format!("{scheme}://x-callback-url/{SUCCESS_PATH}"),
            format!("{scheme}://x-callback-url/{ERROR_PATH}"),
        )
    }

    /// Replace the token source, e.g. with a fixed token in tests.
    pub fn with_token_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.token_generator = Arc::new(generator);
        self
    }

    pub fn next_token(&self) -> String {
        (self.token_generator)()
    }
}

impl std::fmt::Debug for RedirectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectConfig")
            .field("source", &self.source)
            .field("success_path", &self.success_path)
            .field("error_path", &self.error_path)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Credential
// ============================================================================

/// Success payload delivered by the signer app's callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The `x-success` value sent with the request, or `unknown`
    pub callback_url: String,
    /// The inbound callback URI as received
    pub full_callback_url: String,
    /// Flattened query parameters of the callback (last value wins)
    pub query_parameters: HashMap<String, String>,
}
