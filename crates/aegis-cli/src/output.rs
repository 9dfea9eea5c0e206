//! Output formatting for CLI results
//!
//! Three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting
//! - Quiet: Minimal output, exit codes only

use std::collections::BTreeMap;
use std::str::FromStr;

use aegis_core::Credential;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
            exit_code: None,
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str, code: ExitCode) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
            exit_code: Some(code.into()),
        }
    }
}

// Command results

#[derive(Debug, Clone, Serialize)]
pub struct KeyPairOutput {
    pub public_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureOutput {
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutput {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UriOutput {
    pub connection_uri: String,
    pub launch_uri: String,
    pub token: String,
    pub secret: String,
}

/// Decoded fields of an inspected URI, in display order
#[derive(Debug, Clone, Serialize)]
pub struct InspectOutput {
    pub kind: &'static str,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedOutput {
    pub public_key: String,
    pub secret_key: String,
    pub shared_secret: String,
    pub credential: Credential,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigFileOutput {
    pub path: String,
    pub written: bool,
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn format_key_pair(&self, keys: &KeyPairOutput) -> String {
        self.render(keys, "keygen", || {
            property_table(&[
                ("Public Key", keys.public_key.as_str()),
                ("Secret Key", keys.secret_key.as_str()),
            ])
        })
    }

    pub fn format_signature(&self, sig: &SignatureOutput) -> String {
        self.render(sig, "sign", || sig.signature.clone())
    }

    pub fn format_verification(&self, result: &VerificationOutput) -> String {
        self.render(result, "verify", || {
            if result.valid {
                "✓ Signature is valid".to_string()
            } else {
                "✗ Signature is NOT valid".to_string()
            }
        })
    }

    pub fn format_uris(&self, uris: &UriOutput) -> String {
        self.render(uris, "uri", || {
            property_table(&[
                ("Connection URI", uris.connection_uri.as_str()),
                ("Launch URI", uris.launch_uri.as_str()),
                ("Token", uris.token.as_str()),
                ("Secret", uris.secret.as_str()),
            ])
        })
    }

    pub fn format_inspection(&self, inspected: &InspectOutput) -> String {
        self.render(inspected, "inspect", || {
            let mut rows: Vec<(&str, &str)> = vec![("Kind", inspected.kind)];
            rows.extend(inspected.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            property_table(&rows)
        })
    }

    pub fn format_connected(&self, connected: &ConnectedOutput) -> String {
        self.render(connected, "connect", || {
            let mut rows = vec![
                ("Public Key", connected.public_key.clone()),
                ("Secret Key", connected.secret_key.clone()),
                ("Shared Secret", connected.shared_secret.clone()),
                ("Callback URL", connected.credential.callback_url.clone()),
                ("Full Callback URL", connected.credential.full_callback_url.clone()),
            ];
            let mut params: Vec<_> = connected.credential.query_parameters.iter().collect();
            params.sort();
            for (k, v) in params {
                rows.push(("Parameter", format!("{k}={v}")));
            }
            let refs: Vec<(&str, &str)> = rows.iter().map(|(k, v)| (*k, v.as_str())).collect();
            property_table(&refs)
        })
    }

    pub fn format_config_file(&self, file: &ConfigFileOutput) -> String {
        self.render(file, "config", || {
            if file.written {
                format!("✓ Wrote {}", file.path)
            } else {
                file.path.clone()
            }
        })
    }

    /// Format an error with its exit code
    pub fn format_error(&self, message: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {message}"),
            OutputFormat::Json => to_json(&JsonResponse::<()>::error(message, code)),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress message, shown in verbose table mode only
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Status line on stderr, so stdout stays machine-readable
    pub fn notice(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("{message}");
        }
    }

    fn render<T: Serialize>(&self, data: &T, command: &str, table: impl FnOnce() -> String) -> String {
        match self.format {
            OutputFormat::Table => table(),
            OutputFormat::Json => to_json(&JsonResponse::success(data, command)),
            OutputFormat::Quiet => String::new(),
        }
    }
}

fn property_table(rows: &[(&str, &str)]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    for (key, value) in rows {
        table.add_row(vec![*key, *value]);
    }
    table.to_string()
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
