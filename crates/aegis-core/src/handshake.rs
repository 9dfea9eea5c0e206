//! Handshake state machine.
//!
//! One [`Handshake`] drives a single authentication attempt:
//!
//! ```text
//! Idle -> Built -> Launched -> AwaitingCallback -> Resolved | Failed
//! ```
//!
//! Validation failures in `build` end in `Failed` without touching the
//! registry. A failed launch removes the entry it registered. Exactly one
//! terminal transition happens per attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use aegis_crypto::{random::random_hex, KeyPair};

use crate::{
    errors::HandshakeError,
    ingest::CallbackIngestor,
    registry::{Outcome, PendingRequestRegistry},
    types::{ConnectionRequest, Credential, RedirectConfig, DEFAULT_RELAY},
    uri::{build_connection_uri, build_launch_uri_for, with_query_params, LaunchTarget, STATE_PARAM},
};

// ============================================================================
// External Launcher Trait
// ============================================================================

/// Capability to hand control to another application.
#[async_trait]
pub trait ExternalLauncher: Send + Sync {
    /// Attempt to open `uri` in the app registered for its scheme.
    ///
    /// Returns whether control was handed off.
    async fn launch(&self, uri: &str) -> bool;
}

// ============================================================================
// Configuration
// ============================================================================

/// Coordinator-wide settings.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Signer app endpoint receiving the launch URI
    pub target: LaunchTarget,
    /// Relays used when a request names none
    pub relays: Vec<String>,
    /// Upper bound on the wait for a callback (`None` waits forever)
    pub timeout: Option<Duration>,
    /// Append `state=<token>` to the `x-success`/`x-error` redirects
    pub embed_token: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            target: LaunchTarget::default(),
            relays: vec![DEFAULT_RELAY.to_string()],
            timeout: None,
            embed_token: true,
        }
    }
}

/// Caller-supplied fields of a connection request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectParams {
    /// 64-char hex x-only public key
    pub client_public_key: String,
    pub secret: String,
    /// Empty means the configured default relays
    pub relays: Vec<String>,
    pub permissions: Option<String>,
    /// Defaults to `scheme` when absent
    pub name: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    /// Caller's own callback scheme
    pub scheme: Option<String>,
}

impl ConnectParams {
    pub fn new(client_public_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_public_key: client_public_key.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Handshake State Machine
// ============================================================================

/// State of one handshake attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum HandshakeState {
    /// Nothing built yet
    Idle,
    /// Request and launch URI built, token chosen but not registered
    Built {
        request: ConnectionRequest,
        launch_uri: String,
        token: String,
        success_redirect: String,
    },
    /// Entry registered and the signer app launched
    Launched { token: String },
    /// Suspended until the callback fires the resolver
    AwaitingCallback { token: String },
    /// The signer app reported success
    Resolved(Credential),
    /// Terminal failure
    Failed(HandshakeError),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Built { .. } => "built",
            Self::Launched { .. } => "launched",
            Self::AwaitingCallback { .. } => "awaiting-callback",
            Self::Resolved(_) => "resolved",
            Self::Failed(_) => "failed",
        }
    }
}

/// A single authentication attempt.
pub struct Handshake<L: ExternalLauncher> {
    state: HandshakeState,
    registry: Arc<PendingRequestRegistry>,
    launcher: Arc<L>,
    config: HandshakeConfig,
    receiver: Option<oneshot::Receiver<Outcome>>,
}

impl<L: ExternalLauncher> Handshake<L> {
    pub fn new(
        registry: Arc<PendingRequestRegistry>,
        launcher: Arc<L>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            state: HandshakeState::Idle,
            registry,
            launcher,
            config,
            receiver: None,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Correlation token, once one has been chosen.
    pub fn token(&self) -> Option<&str> {
        match &self.state {
            HandshakeState::Built { token, .. }
            | HandshakeState::Launched { token }
            | HandshakeState::AwaitingCallback { token } => Some(token),
            _ => None,
        }
    }

    fn fail<T>(&mut self, err: HandshakeError) -> Result<T, HandshakeError> {
        self.state = HandshakeState::Failed(err.clone());
        Err(err)
    }

    /// Validate inputs and build the launch URI. `Idle -> Built`.
    pub fn build(
        &mut self,
        params: &ConnectParams,
        redirect: &RedirectConfig,
    ) -> Result<String, HandshakeError> {
        if !matches!(self.state, HandshakeState::Idle) {
            return Err(HandshakeError::InvalidState("can only build from Idle state"));
        }

        match self.prepare(params, redirect) {
            Ok((built, launch_uri)) => {
                self.state = built;
                Ok(launch_uri)
            }
            Err(e) => {
                debug!(error = %e, "rejected handshake parameters");
                self.fail(e)
            }
        }
    }

    fn prepare(
        &self,
        params: &ConnectParams,
        redirect: &RedirectConfig,
    ) -> Result<(HandshakeState, String), HandshakeError> {
        if redirect.source.is_empty() {
            return Err(HandshakeError::InvalidParameter(
                "redirect source cannot be empty".into(),
            ));
        }

        let relays = if params.relays.is_empty() {
            self.config.relays.clone()
        } else {
            params.relays.clone()
        };

        let request = ConnectionRequest::builder(&params.client_public_key, &params.secret)
            .relays(relays)
            .permissions(params.permissions.clone())
            .display_name(params.name.clone().or_else(|| params.scheme.clone()))
            .app_url(params.url.clone())
            .app_image_url(params.image.clone())
            .callback_scheme(params.scheme.clone())
            .build()?;

        let token = redirect.next_token();
        if token.is_empty() {
            return Err(HandshakeError::InvalidParameter(
                "token generator produced an empty token".into(),
            ));
        }

        let (success_redirect, error_redirect) = if self.config.embed_token {
            (
                with_query_params(&redirect.success_path, &[(STATE_PARAM, &token)]),
                with_query_params(&redirect.error_path, &[(STATE_PARAM, &token)]),
            )
        } else {
            (redirect.success_path.clone(), redirect.error_path.clone())
        };

        let launch_uri = build_launch_uri_for(
            &self.config.target,
            &build_connection_uri(&request),
            &redirect.source,
            &success_redirect,
            &error_redirect,
        );

        let built = HandshakeState::Built {
            request,
            launch_uri: launch_uri.clone(),
            token,
            success_redirect,
        };
        Ok((built, launch_uri))
    }

    /// Register the pending entry and launch the signer app. `Built -> Launched`.
    pub async fn launch(&mut self) -> Result<(), HandshakeError> {
        let (launch_uri, token, success_redirect) = match &self.state {
            HandshakeState::Built {
                launch_uri,
                token,
                success_redirect,
                ..
            } => (launch_uri.clone(), token.clone(), success_redirect.clone()),
            _ => return Err(HandshakeError::InvalidState("can only launch from Built state")),
        };

        let (tx, rx) = oneshot::channel();
        if let Err(e) = self
            .registry
            .register_with_success(token.clone(), tx, success_redirect)
        {
            return self.fail(HandshakeError::InvalidParameter(e.to_string()));
        }

        debug!(token = %token, app = %self.config.target.scheme, "launching signer app");
        if !self.launcher.launch(&launch_uri).await {
            self.registry.remove(&token);
            warn!(token = %token, "signer app could not be launched");
            return self.fail(HandshakeError::UnableToLaunchExternalApp);
        }

        self.receiver = Some(rx);
        self.state = HandshakeState::Launched { token };
        Ok(())
    }

    /// Suspend until the callback resolves this attempt.
    /// `Launched -> AwaitingCallback -> Resolved | Failed`.
    pub async fn await_callback(&mut self) -> Result<Credential, HandshakeError> {
        let token = match &self.state {
            HandshakeState::Launched { token } => token.clone(),
            _ => {
                return Err(HandshakeError::InvalidState(
                    "can only await a callback from Launched state",
                ))
            }
        };
        let Some(mut rx) = self.receiver.take() else {
            return Err(HandshakeError::InvalidState("resolver receiver missing"));
        };
        self.state = HandshakeState::AwaitingCallback {
            token: token.clone(),
        };

        let received = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received,
                Err(_) => {
                    if self.registry.remove(&token) {
                        warn!(token = %token, ?limit, "no callback before timeout");
                        return self.fail(HandshakeError::Timeout(limit));
                    }
                    // A callback took the entry as the timer fired; its outcome is in flight.
                    rx.await
                }
            },
            None => rx.await,
        };

        match received.unwrap_or_else(|_| Err(HandshakeError::Abandoned)) {
            Ok(credential) => {
                info!(token = %token, "handshake succeeded");
                self.state = HandshakeState::Resolved(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                info!(token = %token, error = %e, "handshake failed");
                self.fail(e)
            }
        }
    }

    /// Drive the whole attempt from `Idle` to a terminal state.
    pub async fn run(
        &mut self,
        params: &ConnectParams,
        redirect: &RedirectConfig,
    ) -> Result<Credential, HandshakeError> {
        self.build(params, redirect)?;
        self.launch().await?;
        self.await_callback().await
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Result of [`HandshakeCoordinator::connect_with_new_identity`].
#[derive(Clone, Debug)]
pub struct Connected {
    /// Ephemeral identity generated for this attempt
    pub keys: KeyPair,
    /// Shared secret sent in the connection URI
    pub secret: String,
    pub credential: Credential,
}

/// Composes a registry and a launcher and runs handshakes against them.
pub struct HandshakeCoordinator<L: ExternalLauncher> {
    registry: Arc<PendingRequestRegistry>,
    launcher: Arc<L>,
    config: HandshakeConfig,
}

impl<L: ExternalLauncher> HandshakeCoordinator<L> {
    /// Create a coordinator with a fresh registry.
    pub fn new(launcher: Arc<L>, config: HandshakeConfig) -> Self {
        Self::with_registry(Arc::new(PendingRequestRegistry::new()), launcher, config)
    }

    /// Create a coordinator sharing an existing registry.
    pub fn with_registry(
        registry: Arc<PendingRequestRegistry>,
        launcher: Arc<L>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            registry,
            launcher,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<PendingRequestRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Ingestor feeding callbacks into this coordinator's registry.
    pub fn ingestor(&self) -> CallbackIngestor {
        CallbackIngestor::new(self.registry.clone())
    }

    /// A fresh `Idle` handshake bound to this coordinator.
    pub fn handshake(&self) -> Handshake<L> {
        Handshake::new(self.registry.clone(), self.launcher.clone(), self.config.clone())
    }

    /// Run one handshake to completion.
    pub async fn connect(
        &self,
        params: &ConnectParams,
        redirect: &RedirectConfig,
    ) -> Result<Credential, HandshakeError> {
        self.handshake().run(params, redirect).await
    }

    /// Run a handshake redirecting back to `scheme`'s default callback paths.
    pub async fn authenticate(
        &self,
        client_public_key: &str,
        secret: &str,
        scheme: &str,
    ) -> Result<Credential, HandshakeError> {
        if scheme.is_empty() {
            return Err(HandshakeError::InvalidParameter(
                "no callback scheme configured".into(),
            ));
        }
        let params = ConnectParams {
            scheme: Some(scheme.to_string()),
            ..ConnectParams::new(client_public_key, secret)
        };
        self.connect(&params, &RedirectConfig::for_scheme(scheme)).await
    }

    /// Run a handshake with a freshly generated identity and shared secret.
    ///
    /// `params.client_public_key` and `params.secret` are overwritten.
    pub async fn connect_with_new_identity(
        &self,
        mut params: ConnectParams,
        redirect: &RedirectConfig,
    ) -> Result<Connected, HandshakeError> {
        let keys = KeyPair::generate()?;
        let secret = random_hex(32)?;
        params.client_public_key = keys.public_key_hex().to_string();
        params.secret = secret.clone();

        let credential = self.connect(&params, redirect).await?;
        Ok(Connected {
            keys,
            secret,
            credential,
        })
    }
}
