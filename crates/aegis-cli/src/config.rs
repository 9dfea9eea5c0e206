//! Configuration management for aegis-connect
//!
//! Configuration is stored in TOML format at the platform config directory:
//!
//! - Linux: `~/.config/aegis-connect/config.toml`
//! - macOS: `~/Library/Application Support/io.aegis.aegis-connect/config.toml`
//! - Windows: `%APPDATA%\aegis\aegis-connect\config\config.toml`
//!
//! `--config` points at a different file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aegis_core::{types::DEFAULT_RELAY, uri::LaunchTarget, HandshakeConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [handshake]
/// app_scheme = "aegis"
/// handshake_path = "nip46Auth"
/// relays = ["ws://127.0.0.1:8081"]
/// timeout_seconds = 120  # 0 = wait forever
/// embed_token = true
///
/// [app]
/// scheme = "aegisconnect"
/// name = "Aegis Connect CLI"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub handshake: HandshakeSection,

    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Signer app endpoint and handshake behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeSection {
    /// URL scheme of the signer app
    #[serde(default = "default_app_scheme")]
    pub app_scheme: String,

    /// Action path under `x-callback-url`
    #[serde(default = "default_handshake_path")]
    pub handshake_path: String,

    /// Relays advertised when the command names none
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    /// Seconds to wait for a callback (0 = no limit)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Append `state=<token>` to the redirects sent to the signer
    #[serde(default = "default_true")]
    pub embed_token: bool,
}

fn default_app_scheme() -> String {
    "aegis".to_string()
}

fn default_handshake_path() -> String {
    "nip46Auth".to_string()
}

fn default_relays() -> Vec<String> {
    vec![DEFAULT_RELAY.to_string()]
}

fn default_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self {
            app_scheme: default_app_scheme(),
            handshake_path: default_handshake_path(),
            relays: default_relays(),
            timeout_seconds: default_timeout(),
            embed_token: true,
        }
    }
}

/// How this CLI presents itself to the signer app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    /// Our own callback scheme (`x-source`)
    #[serde(default = "default_callback_scheme")]
    pub scheme: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    /// Requested permissions, passed through verbatim
    #[serde(default)]
    pub permissions: Option<String>,
}

fn default_callback_scheme() -> String {
    "aegisconnect".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            scheme: default_callback_scheme(),
            name: None,
            url: None,
            image: None,
            permissions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values given on the command line, taking precedence over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub relays: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
}

impl Config {
    /// Load and validate configuration from `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, or defaults if no file exists
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load from a custom path or the default location
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "aegis", "aegis-connect")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake.app_scheme.is_empty() {
            return Err(ConfigError::ValidationError(
                "handshake.app_scheme cannot be empty".to_string(),
            ));
        }

        if self.handshake.relays.is_empty() {
            return Err(ConfigError::ValidationError(
                "handshake.relays must name at least one relay".to_string(),
            ));
        }

        if self.handshake.relays.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "handshake.relays cannot contain an empty relay".to_string(),
            ));
        }

        if self.app.scheme.is_empty() {
            return Err(ConfigError::ValidationError(
                "app.scheme cannot be empty".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Apply command-line overrides. Empty override lists are ignored.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(relays) = overrides.relays.as_ref().filter(|r| !r.is_empty()) {
            self.handshake.relays = relays.clone();
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.handshake.timeout_seconds = timeout;
        }
        self
    }

    /// Core handshake settings derived from this configuration
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            target: LaunchTarget {
                scheme: self.handshake.app_scheme.clone(),
                path: self.handshake.handshake_path.clone(),
            },
            relays: self.handshake.relays.clone(),
            timeout: match self.handshake.timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            embed_token: self.handshake.embed_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.handshake.app_scheme, "aegis");
        assert_eq!(config.handshake.handshake_path, "nip46Auth");
        assert_eq!(config.handshake.relays, vec![DEFAULT_RELAY.to_string()]);
        assert_eq!(config.app.scheme, "aegisconnect");
        assert_eq!(config.logging.level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_relays() {
        let mut config = Config::default();
        config.handshake.relays.clear();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.handshake.relays = vec![" ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_empty_app_scheme() {
        let mut config = Config::default();
        config.handshake.app_scheme.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.app.scheme.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let config = Config::from_toml(
            r#"
[handshake]
app_scheme = "signer"
relays = ["wss://relay.one", "wss://relay.two"]
timeout_seconds = 0

[app]
scheme = "myapp"
name = "My App"
"#,
        )
        .unwrap();

        assert_eq!(config.handshake.app_scheme, "signer");
        assert_eq!(config.handshake.handshake_path, "nip46Auth");
        assert!(config.handshake.embed_token);
        assert_eq!(config.app.name.as_deref(), Some("My App"));

        let handshake = config.handshake_config();
        assert_eq!(handshake.target.scheme, "signer");
        assert_eq!(handshake.relays, ["wss://relay.one", "wss://relay.two"]);
        assert_eq!(handshake.timeout, None);
    }

    #[test]
    fn test_toml_parsing_rejects_invalid() {
        assert!(matches!(
            Config::from_toml("[handshake]\nrelays = []\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            Config::from_toml("[handshake\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_cli_overrides() {
        let overrides = CliOverrides {
            relays: Some(vec!["wss://cli.relay".to_string()]),
            timeout_seconds: Some(5),
        };
        let config = Config::default().with_overrides(&overrides);
        assert_eq!(config.handshake.relays, vec!["wss://cli.relay".to_string()]);
        assert_eq!(
            config.handshake_config().timeout,
            Some(Duration::from_secs(5))
        );

        let unchanged = Config::default().with_overrides(&CliOverrides {
            relays: Some(Vec::new()),
            timeout_seconds: None,
        });
        assert_eq!(unchanged.handshake.relays, default_relays());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.app.scheme = "saved".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.app.scheme, "saved");
        assert_eq!(loaded.handshake.relays, config.handshake.relays);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
