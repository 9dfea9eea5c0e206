//! Test harness for Aegis core handshakes.
//!
//! Launchers standing in for the host platform and a simulated signer app,
//! plus fixtures shared by unit and integration tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::form_urlencoded;

use crate::{
    handshake::{ConnectParams, ExternalLauncher},
    ingest::CallbackIngestor,
    types::RedirectConfig,
    uri::{parse_launch_uri, with_query_params, ERROR_CODE_PARAM, STATE_PARAM, USER_CANCEL_CODE},
};

/// Public key of BIP-340 test vector 0.
pub const SAMPLE_PUBLIC_KEY: &str =
    "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

/// Params for a request from `myapp` with a fixed key and secret.
pub fn sample_params() -> ConnectParams {
    ConnectParams {
        scheme: Some("myapp".into()),
        ..ConnectParams::new(SAMPLE_PUBLIC_KEY, "s3cret")
    }
}

/// `myapp` redirects that always hand out `token`.
pub fn fixed_redirect(token: &str) -> RedirectConfig {
    let token = token.to_string();
    RedirectConfig::for_scheme("myapp").with_token_generator(move || token.clone())
}

/// Drop every `name` parameter from the query of `uri`.
pub fn strip_query_param(uri: &str, name: &str) -> String {
    let Some((base, query)) = uri.split_once('?') else {
        return uri.to_string();
    };
    let kept: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(k, _)| k != name)
        .collect();
    if kept.is_empty() {
        return base.to_string();
    }
    let pairs: Vec<(&str, &str)> = kept.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    with_query_params(base, &pairs)
}

// ============================================================================
// Recording Launcher
// ============================================================================

/// Records every launch URI and reports a fixed result.
pub struct RecordingLauncher {
    succeed: bool,
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// A host with no app registered for the signer scheme.
    pub fn failing() -> Self {
        Self {
            succeed: false,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ExternalLauncher for RecordingLauncher {
    async fn launch(&self, uri: &str) -> bool {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(uri.to_string());
        self.succeed
    }
}

// ============================================================================
// Loopback Launcher
// ============================================================================

/// How the simulated signer app answers a launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignerBehavior {
    /// Redirect to `x-success` with these extra parameters
    Approve(Vec<(String, String)>),
    /// Redirect to `x-success` with the `state` token removed
    ApproveWithoutToken(Vec<(String, String)>),
    /// Redirect to `x-error` with `errorCode=USER_CANCEL`
    Cancel,
    /// Redirect to `x-error` with the given error code
    Reject(String),
    /// Open but never call back
    Ignore,
}

impl SignerBehavior {
    /// Approve and report a signer public key.
    pub fn approve() -> Self {
        Self::Approve(vec![("pubkey".into(), SAMPLE_PUBLIC_KEY.into())])
    }
}

/// Simulated signer app: parses the launch URI and redirects back through
/// the ingestor, like the host platform would on an inbound URI.
pub struct LoopbackLauncher {
    ingestor: CallbackIngestor,
    behavior: SignerBehavior,
    delay: Option<Duration>,
    launched: Mutex<Vec<String>>,
}

impl LoopbackLauncher {
    pub fn new(ingestor: CallbackIngestor, behavior: SignerBehavior) -> Self {
        Self {
            ingestor,
            behavior,
            delay: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Answer from a spawned task after `delay` instead of during the launch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn callback_for(&self, success: &str, error: &str) -> Option<String> {
        let with = |base: &str, extra: &[(String, String)]| {
            let refs: Vec<(&str, &str)> = extra.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            with_query_params(base, &refs)
        };

        match &self.behavior {
            SignerBehavior::Approve(extra) => Some(with(success, extra)),
            SignerBehavior::ApproveWithoutToken(extra) => {
                Some(with(&strip_query_param(success, STATE_PARAM), extra))
            }
            SignerBehavior::Cancel => Some(with_query_params(
                error,
                &[(ERROR_CODE_PARAM, USER_CANCEL_CODE)],
            )),
            SignerBehavior::Reject(code) => {
                Some(with_query_params(error, &[(ERROR_CODE_PARAM, code.as_str())]))
            }
            SignerBehavior::Ignore => None,
        }
    }
}

#[async_trait]
impl ExternalLauncher for LoopbackLauncher {
    async fn launch(&self, uri: &str) -> bool {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(uri.to_string());

        let request = match parse_launch_uri(uri) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "signer could not read launch URI");
                return false;
            }
        };

        let Some(callback) = self.callback_for(&request.success, &request.error) else {
            return true;
        };

        match self.delay {
            Some(delay) => {
                let ingestor = self.ingestor.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    ingestor.ingest(&callback);
                });
            }
            None => {
                self.ingestor.ingest(&callback);
            }
        }
        true
    }
}
