//! Connection URI codec.
//!
//! Builds the `nostrconnect://` connection URI, wraps it in the x-callback
//! launch URI addressed to the signer app, and parses inbound callbacks.
//!
//! Outbound query values are form-urlencoded. Relays are carried as repeated
//! `relay` parameters in insertion order; parameter order is fixed so the same
//! request always serializes to the same string.
//!
//! Inbound callbacks come from another app and are only percent-decoded: a
//! literal `+` stays a `+`, so base64 values survive.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use url::{form_urlencoded, Url};

use crate::errors::UriError;
use crate::types::{ConnectionRequest, RedirectConfig};

pub const CONNECT_SCHEME: &str = "nostrconnect";
pub const CALLBACK_HOST: &str = "x-callback-url";

pub const STATE_PARAM: &str = "state";
pub const ERROR_CODE_PARAM: &str = "errorCode";
pub const USER_CANCEL_CODE: &str = "USER_CANCEL";
const SUCCESS_MARKER: &str = "success";

// Launch URI parameter names. These MUST NOT change.
const NOSTRCONNECT_PARAM: &str = "nostrconnect";
const X_SOURCE: &str = "x-source";
const X_SUCCESS: &str = "x-success";
const X_ERROR: &str = "x-error";

// ============================================================================
// Launch Target
// ============================================================================

/// The signer app's x-callback endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchTarget {
    /// URL scheme registered by the signer app
    pub scheme: String,
    /// Action path under `x-callback-url`
    pub path: String,
}

impl Default for LaunchTarget {
    fn default() -> Self {
        Self {
            scheme: "aegis".to_string(),
            path: "nip46Auth".to_string(),
        }
    }
}

/// Fields recovered from a launch URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRequest {
    pub target: LaunchTarget,
    pub connection_uri: String,
    pub source: String,
    pub success: String,
    pub error: String,
}

// ============================================================================
// Builders
// ============================================================================

/// Serialize a connection request into its canonical `nostrconnect://` URI.
pub fn build_connection_uri(request: &ConnectionRequest) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for relay in request.relays() {
        query.append_pair("relay", relay);
    }
    query.append_pair("secret", request.shared_secret());

    let optional = [
        ("scheme", request.callback_scheme()),
        ("perms", request.permissions()),
        ("name", request.display_name()),
        ("url", request.app_url()),
        ("image", request.app_image_url()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            query.append_pair(key, value);
        }
    }

    format!(
        "{CONNECT_SCHEME}://{}?{}",
        request.client_public_key(),
        query.finish()
    )
}

/// Wrap a connection URI in a launch URI for the default signer app.
pub fn build_launch_uri(connection_uri: &str, redirect: &RedirectConfig) -> String {
    build_launch_uri_for(
        &LaunchTarget::default(),
        connection_uri,
        &redirect.source,
        &redirect.success_path,
        &redirect.error_path,
    )
}

/// Wrap a connection URI in a launch URI addressed to `target`.
///
/// `success` and `error` are passed verbatim as `x-success`/`x-error`.
pub fn build_launch_uri_for(
    target: &LaunchTarget,
    connection_uri: &str,
    source: &str,
    success: &str,
    error: &str,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair(NOSTRCONNECT_PARAM, connection_uri)
        .append_pair(X_SOURCE, source)
        .append_pair(X_SUCCESS, success)
        .append_pair(X_ERROR, error)
        .finish();
    format!(
        "{}://{CALLBACK_HOST}/{}?{query}",
        target.scheme,
        target.path.trim_start_matches('/')
    )
}

/// Append query parameters to `base`, keeping any it already has.
pub fn with_query_params(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{encoded}")
}

// ============================================================================
// Parsers
// ============================================================================

/// Extract the correlation token from an inbound URI, if any.
///
/// Works on any string with a query component; no URL validation is done.
pub fn extract_token(inbound_uri: &str) -> Option<String> {
    let (_, rest) = inbound_uri.split_once('?')?;
    let query = rest.split('#').next().unwrap_or_default();
    decode_query(query)
        .into_iter()
        .find(|(k, _)| k == STATE_PARAM)
        .map(|(_, v)| v)
}

/// Split a raw query on `&` and the first `=`, percent-decoding each side.
///
/// A parameter without `=` has an empty value. Empty segments are skipped.
fn decode_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Reverse [`build_connection_uri`].
pub fn parse_connection_uri(uri: &str) -> Result<ConnectionRequest, UriError> {
    let url = Url::parse(uri)?;
    if url.scheme() != CONNECT_SCHEME {
        return Err(UriError::WrongScheme {
            expected: CONNECT_SCHEME.to_string(),
            got: url.scheme().to_string(),
        });
    }
    let public_key = url.host_str().ok_or(UriError::MissingField("public key"))?;

    let mut relays = Vec::new();
    let mut fields: HashMap<String, String> = HashMap::new();
    for (k, v) in url.query_pairs() {
        if k == "relay" {
            relays.push(v.into_owned());
        } else {
            fields.insert(k.into_owned(), v.into_owned());
        }
    }
    let secret = fields.remove("secret").ok_or(UriError::MissingField("secret"))?;

    ConnectionRequest::builder(public_key, secret)
        .relays(relays)
        .callback_scheme(fields.remove("scheme"))
        .permissions(fields.remove("perms"))
        .display_name(fields.remove("name"))
        .app_url(fields.remove("url"))
        .app_image_url(fields.remove("image"))
        .build()
        .map_err(|e| UriError::InvalidField(e.to_string()))
}

/// Recover the connection URI and redirect fields from a launch URI.
pub fn parse_launch_uri(uri: &str) -> Result<LaunchRequest, UriError> {
    let url = Url::parse(uri)?;
    if url.host_str() != Some(CALLBACK_HOST) {
        return Err(UriError::InvalidField(format!(
            "expected host {CALLBACK_HOST}"
        )));
    }
    let mut fields: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let mut take = |name: &'static str| fields.remove(name).ok_or(UriError::MissingField(name));

    Ok(LaunchRequest {
        target: LaunchTarget {
            scheme: url.scheme().to_string(),
            path: url.path().trim_start_matches('/').to_string(),
        },
        connection_uri: take(NOSTRCONNECT_PARAM)?,
        source: take(X_SOURCE)?,
        success: take(X_SUCCESS)?,
        error: take(X_ERROR)?,
    })
}

// ============================================================================
// Inbound Callback
// ============================================================================

/// A parsed inbound callback URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackUri {
    full: String,
    /// Percent-decoded path
    path: String,
    query: Vec<(String, String)>,
    token: Option<String>,
}

impl CallbackUri {
    /// Parse an inbound callback. A URI without a query component is rejected.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let url = Url::parse(uri)?;
        let Some(query) = url.query() else {
            return Err(UriError::MissingQuery);
        };
        Ok(Self {
            full: url.as_str().to_string(),
            path: percent_decode(url.path()),
            query: decode_query(query),
            token: extract_token(url.as_str()),
        })
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of the named parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.param(ERROR_CODE_PARAM)
    }

    /// Decoded path contains `success` in any casing.
    pub fn is_success(&self) -> bool {
        self.path.to_lowercase().contains(SUCCESS_MARKER)
    }

    pub fn is_user_cancel(&self) -> bool {
        self.error_code() == Some(USER_CANCEL_CODE)
    }

    /// Flattened query mapping; later duplicates overwrite earlier ones.
    pub fn query_map(&self) -> HashMap<String, String> {
        self.query.iter().cloned().collect()
    }
}
