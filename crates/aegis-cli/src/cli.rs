//! CLI command definitions and argument parsing

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aegis_core::{
    uri::{build_connection_uri, parse_connection_uri, parse_launch_uri, CallbackUri},
    CallbackIngestor, ConnectParams, ConnectionRequest, HandshakeCoordinator, HandshakeError,
    HandshakeState, RedirectConfig, UriError,
};
use aegis_crypto::{random::random_hex, verify_hex, KeyPair};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::config::{CliOverrides, Config};
use crate::launcher::PrintLauncher;
use crate::output::{
    ConfigFileOutput, ConnectedOutput, InspectOutput, KeyPairOutput, OutputFormat, OutputFormatter, SignatureOutput,
    UriOutput, VerificationOutput,
};
use crate::ExitCode;

/// Aegis Connect CLI - NIP-46 handshakes with an external signer app
#[derive(Parser, Debug)]
#[command(name = "aegis-connect")]
#[command(version, about = "Aegis Connect CLI - NIP-46 handshakes with an external signer app")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "AEGIS_CONNECT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Relay URL (can be specified multiple times)
    #[arg(long = "relay", global = true)]
    pub relays: Vec<String>,

    /// Seconds to wait for the signer app's callback (0 = no limit)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Command-line values that take precedence over the config file
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            relays: if self.relays.is_empty() {
                None
            } else {
                Some(self.relays.clone())
            },
            timeout_seconds: self.timeout,
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output, self.verbose);

        match self.command {
            Commands::Keygen(args) => args.execute(&formatter),
            Commands::Sign(args) => args.execute(&formatter),
            Commands::Verify(args) => args.execute(&formatter),
            Commands::Uri(args) => args.execute(&formatter, &config),
            Commands::Inspect(args) => args.execute(&formatter),
            Commands::Connect(args) => args.execute(&formatter, &config).await,
            Commands::Config(args) => args.execute(&formatter, self.config.as_deref(), &config),
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a key pair, or derive the public key of an existing secret
    Keygen(KeygenArgs),
    /// Sign a message with a secret key
    Sign(SignArgs),
    /// Verify a signature (exit code 2 if invalid)
    Verify(VerifyArgs),
    /// Build the connection URI and launch URI for a request
    Uri(UriArgs),
    /// Decode a connection, launch, or callback URI
    Inspect(InspectArgs),
    /// Run a handshake with a fresh identity, reading callbacks from stdin
    Connect(ConnectArgs),
    /// Manage the configuration file
    Config(ConfigArgs),
}

impl Commands {
    /// Whether this command creates the config file, so a missing file is fine
    pub fn creates_config(&self) -> bool {
        matches!(
            self,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Init { .. }
            })
        )
    }
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{output}");
    }
}

fn fail(formatter: &OutputFormatter, message: &str, code: ExitCode) -> ExitCode {
    let output = formatter.format_error(message, code);
    match formatter.format() {
        OutputFormat::Json => println!("{output}"),
        OutputFormat::Table => eprintln!("{output}"),
        OutputFormat::Quiet => {}
    }
    code
}

fn fail_handshake(formatter: &OutputFormatter, err: &HandshakeError) -> ExitCode {
    fail(formatter, &err.to_string(), ExitCode::from(err))
}

// ============================================================================
// Key Commands
// ============================================================================

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Existing 64-char hex secret key
    #[arg(long, env = "AEGIS_SECRET_KEY", hide_env_values = true)]
    pub from_secret: Option<String>,
}

impl KeygenArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let keys = match self.from_secret.as_deref() {
            Some(secret) => KeyPair::from_secret_hex(secret),
            None => KeyPair::generate(),
        };
        let keys = match keys {
            Ok(keys) => keys,
            Err(e) => return Ok(fail(formatter, &e.to_string(), ExitCode::InvalidInput)),
        };

        print_output(&formatter.format_key_pair(&KeyPairOutput {
            public_key: keys.public_key_hex().to_string(),
            secret_key: keys.secret_key_hex().to_string(),
        }));
        Ok(ExitCode::Success)
    }
}

#[derive(Parser, Debug)]
pub struct SignArgs {
    /// 64-char hex secret key
    #[arg(long, env = "AEGIS_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Message to sign (UTF-8)
    #[arg(long)]
    pub message: String,
}

impl SignArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let keys = match KeyPair::from_secret_hex(&self.secret_key) {
            Ok(keys) => keys,
            Err(e) => return Ok(fail(formatter, &e.to_string(), ExitCode::InvalidInput)),
        };
        let signature = keys.sign_hex(self.message.as_bytes())?;

        print_output(&formatter.format_signature(&SignatureOutput {
            public_key: keys.public_key_hex().to_string(),
            signature,
        }));
        Ok(ExitCode::Success)
    }
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// 64-char hex x-only public key
    #[arg(long)]
    pub public_key: String,

    /// Message that was signed (UTF-8)
    #[arg(long)]
    pub message: String,

    /// 128-char hex signature
    #[arg(long)]
    pub signature: String,
}

impl VerifyArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let valid = verify_hex(&self.public_key, self.message.as_bytes(), &self.signature);
        print_output(&formatter.format_verification(&VerificationOutput { valid }));
        Ok(if valid {
            ExitCode::Success
        } else {
            ExitCode::VerificationFailed
        })
    }
}

// ============================================================================
// URI Commands
// ============================================================================

/// Request fields shared by `uri` and `connect`; unset values come from `[app]`
#[derive(Args, Debug, Default)]
pub struct RequestArgs {
    /// Our callback scheme
    #[arg(long)]
    pub scheme: Option<String>,

    /// Display name shown by the signer app
    #[arg(long)]
    pub name: Option<String>,

    /// App URL
    #[arg(long)]
    pub url: Option<String>,

    /// App image URL
    #[arg(long)]
    pub image: Option<String>,

    /// Requested permissions
    #[arg(long)]
    pub perms: Option<String>,
}

impl RequestArgs {
    fn scheme(&self, config: &Config) -> String {
        self.scheme.clone().unwrap_or_else(|| config.app.scheme.clone())
    }

    fn params(self, config: &Config) -> ConnectParams {
        let scheme = self.scheme(config);
        ConnectParams {
            permissions: self.perms.or_else(|| config.app.permissions.clone()),
            name: self.name.or_else(|| config.app.name.clone()),
            url: self.url.or_else(|| config.app.url.clone()),
            image: self.image.or_else(|| config.app.image.clone()),
            scheme: Some(scheme),
            ..ConnectParams::default()
        }
    }
}

#[derive(Parser, Debug)]
pub struct UriArgs {
    /// 64-char hex x-only public key of the client
    #[arg(long)]
    pub public_key: String,

    /// Shared secret (random if omitted)
    #[arg(long)]
    pub secret: Option<String>,

    #[command(flatten)]
    pub request: RequestArgs,
}

impl UriArgs {
    pub fn execute(self, formatter: &OutputFormatter, config: &Config) -> anyhow::Result<ExitCode> {
        let secret = match self.secret {
            Some(secret) => secret,
            None => random_hex(32)?,
        };
        let redirect = RedirectConfig::for_scheme(&self.request.scheme(config));
        let params = ConnectParams {
            client_public_key: self.public_key,
            secret: secret.clone(),
            ..self.request.params(config)
        };

        // Building never registers or launches anything.
        let coordinator = HandshakeCoordinator::new(
            Arc::new(PrintLauncher::new(formatter.format())),
            config.handshake_config(),
        );
        let mut handshake = coordinator.handshake();
        let launch_uri = match handshake.build(&params, &redirect) {
            Ok(uri) => uri,
            Err(e) => return Ok(fail_handshake(formatter, &e)),
        };
        let HandshakeState::Built { request, token, .. } = handshake.state() else {
            anyhow::bail!("handshake left Built state unexpectedly");
        };

        print_output(&formatter.format_uris(&UriOutput {
            connection_uri: build_connection_uri(request),
            launch_uri,
            token: token.clone(),
            secret,
        }));
        Ok(ExitCode::Success)
    }
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// URI to decode
    pub uri: String,
}

impl InspectArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        match inspect(&self.uri) {
            Ok(inspected) => {
                print_output(&formatter.format_inspection(&inspected));
                Ok(ExitCode::Success)
            }
            Err(e) => Ok(fail(formatter, &e.to_string(), ExitCode::InvalidInput)),
        }
    }
}

fn request_fields(request: &ConnectionRequest, fields: &mut BTreeMap<String, String>) {
    fields.insert("public_key".into(), request.client_public_key().into());
    fields.insert("secret".into(), request.shared_secret().into());
    fields.insert("relays".into(), request.relays().join(", "));
    let optional = [
        ("scheme", request.callback_scheme()),
        ("perms", request.permissions()),
        ("name", request.display_name()),
        ("url", request.app_url()),
        ("image", request.app_image_url()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            fields.insert(key.into(), value.into());
        }
    }
}

/// Decode a connection, launch, or callback URI into displayable fields.
pub fn inspect(uri: &str) -> Result<InspectOutput, UriError> {
    let mut fields = BTreeMap::new();

    if let Ok(request) = parse_connection_uri(uri) {
        request_fields(&request, &mut fields);
        return Ok(InspectOutput {
            kind: "connection",
            fields,
        });
    }

    if let Ok(launch) = parse_launch_uri(uri) {
        fields.insert("app_scheme".into(), launch.target.scheme);
        fields.insert("path".into(), launch.target.path);
        fields.insert("x-source".into(), launch.source);
        fields.insert("x-success".into(), launch.success);
        fields.insert("x-error".into(), launch.error);
        match parse_connection_uri(&launch.connection_uri) {
            Ok(request) => request_fields(&request, &mut fields),
            Err(e) => {
                fields.insert("connection_error".into(), e.to_string());
            }
        }
        return Ok(InspectOutput {
            kind: "launch",
            fields,
        });
    }

    let callback = CallbackUri::parse(uri)?;
    let outcome = if callback.is_success() {
        "success"
    } else if callback.is_user_cancel() {
        "user-cancelled"
    } else {
        "verification-failed"
    };
    fields.insert("path".into(), callback.path().into());
    fields.insert("outcome".into(), outcome.into());
    if let Some(token) = callback.token() {
        fields.insert("state".into(), token.into());
    }
    for (key, value) in callback.query_map() {
        fields.entry(format!("param.{key}")).or_insert(value);
    }
    Ok(InspectOutput {
        kind: "callback",
        fields,
    })
}

// ============================================================================
// Interactive Handshake
// ============================================================================

#[derive(Parser, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

impl ConnectArgs {
    pub async fn execute(self, formatter: &OutputFormatter, config: &Config) -> anyhow::Result<ExitCode> {
        let redirect = RedirectConfig::for_scheme(&self.request.scheme(config));
        let params = self.request.params(config);

        let coordinator = HandshakeCoordinator::new(
            Arc::new(PrintLauncher::new(formatter.format())),
            config.handshake_config(),
        );
        formatter.progress(&format!(
            "Waiting for {}://x-callback-url/{}",
            config.handshake.app_scheme, config.handshake.handshake_path
        ));

        let connect = coordinator.connect_with_new_identity(params, &redirect);
        tokio::pin!(connect);

        let result = tokio::select! {
            biased;
            result = &mut connect => result,
            () = feed_callbacks(coordinator.ingestor(), formatter) => {
                // A callback read right before EOF has already fired the resolver.
                match tokio::time::timeout(Duration::ZERO, &mut connect).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Ok(fail(
                            formatter,
                            "stdin closed before a matching callback arrived",
                            ExitCode::GeneralError,
                        ))
                    }
                }
            }
        };

        match result {
            Ok(connected) => {
                print_output(&formatter.format_connected(&ConnectedOutput {
                    public_key: connected.keys.public_key_hex().to_string(),
                    secret_key: connected.keys.secret_key_hex().to_string(),
                    shared_secret: connected.secret,
                    credential: connected.credential,
                }));
                Ok(ExitCode::Success)
            }
            Err(e) => Ok(fail_handshake(formatter, &e)),
        }
    }
}

/// Feed stdin lines to the ingestor until EOF.
async fn feed_callbacks(ingestor: CallbackIngestor, formatter: &OutputFormatter) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "stdin read failed");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !ingestor.ingest(line) {
            formatter.notice("That URI does not match the pending request; paste the callback URI.");
        }
    }
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

impl ConfigArgs {
    pub fn execute(
        self,
        formatter: &OutputFormatter,
        custom_path: Option<&Path>,
        config: &Config,
    ) -> anyhow::Result<ExitCode> {
        let Some(path) = custom_path.map(Path::to_path_buf).or_else(Config::default_path) else {
            return Ok(fail(
                formatter,
                "no config directory on this platform; pass --config",
                ExitCode::GeneralError,
            ));
        };

        let written = match self.action {
            ConfigAction::Path => false,
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    return Ok(fail(
                        formatter,
                        &format!("{} already exists (use --force to overwrite)", path.display()),
                        ExitCode::InvalidInput,
                    ));
                }
                formatter.progress(&format!("Writing {}...", path.display()));
                config.save(&path)?;
                true
            }
        };

        print_output(&formatter.format_config_file(&ConfigFileOutput {
            path: path.display().to_string(),
            written,
        }));
        Ok(ExitCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0000000000000000000000000000000000000000000000000000000000000003";
    const PUBLIC: &str = "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

    fn quiet() -> OutputFormatter {
        OutputFormatter::new(OutputFormat::Quiet, false)
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "aegis-connect",
            "uri",
            "--public-key",
            PUBLIC,
            "--relay",
            "wss://a",
            "--relay",
            "wss://b",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.overrides().relays, Some(vec!["wss://a".to_string(), "wss://b".to_string()]));
        assert!(matches!(cli.command, Commands::Uri(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_output() {
        assert!(Cli::try_parse_from(["aegis-connect", "keygen", "--output", "yaml"]).is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let keys = KeyPair::from_secret_hex(SECRET).unwrap();
        let signature = keys.sign_hex(b"hello").unwrap();

        let ok = VerifyArgs {
            public_key: PUBLIC.into(),
            message: "hello".into(),
            signature: signature.clone(),
        };
        assert_eq!(ok.execute(&quiet()).unwrap(), ExitCode::Success);

        let tampered = VerifyArgs {
            public_key: PUBLIC.into(),
            message: "hullo".into(),
            signature,
        };
        assert_eq!(tampered.execute(&quiet()).unwrap(), ExitCode::VerificationFailed);
    }

    #[test]
    fn test_sign_rejects_bad_secret() {
        let args = SignArgs {
            secret_key: "not-hex".into(),
            message: "m".into(),
        };
        assert_eq!(args.execute(&quiet()).unwrap(), ExitCode::InvalidInput);
    }

    #[test]
    fn test_uri_rejects_bad_public_key() {
        let args = UriArgs {
            public_key: "abc".into(),
            secret: None,
            request: RequestArgs::default(),
        };
        assert_eq!(
            args.execute(&quiet(), &Config::default()).unwrap(),
            ExitCode::InvalidInput
        );
    }

    #[test]
    fn test_inspect_connection_uri() {
        let uri = format!("nostrconnect://{PUBLIC}?relay=wss%3A%2F%2Fr&secret=s&name=App");
        let inspected = inspect(&uri).unwrap();
        assert_eq!(inspected.kind, "connection");
        assert_eq!(inspected.fields["public_key"], PUBLIC);
        assert_eq!(inspected.fields["relays"], "wss://r");
        assert_eq!(inspected.fields["name"], "App");
    }

    #[test]
    fn test_inspect_launch_uri() {
        let request = ConnectionRequest::builder(PUBLIC, "s").relay("wss://r").build().unwrap();
        let connection_uri = build_connection_uri(&request);
        let launch = aegis_core::uri::build_launch_uri(&connection_uri, &RedirectConfig::for_scheme("myapp"));

        let inspected = inspect(&launch).unwrap();
        assert_eq!(inspected.kind, "launch");
        assert_eq!(inspected.fields["x-source"], "myapp");
        assert_eq!(inspected.fields["public_key"], PUBLIC);
    }

    #[test]
    fn test_inspect_callback_uri() {
        let inspected =
            inspect("myapp://x-callback-url/nip46AuthError?state=t&errorCode=USER_CANCEL").unwrap();
        assert_eq!(inspected.kind, "callback");
        assert_eq!(inspected.fields["outcome"], "user-cancelled");
        assert_eq!(inspected.fields["state"], "t");
        assert_eq!(inspected.fields["param.errorCode"], "USER_CANCEL");
    }

    #[test]
    fn test_config_init_writes_effective_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aegis").join("config.toml");
        let config = Config::default().with_overrides(&CliOverrides {
            relays: Some(vec!["wss://relay.init".into()]),
            timeout_seconds: Some(30),
        });

        let init = || ConfigArgs {
            action: ConfigAction::Init { force: false },
        };
        assert_eq!(
            init().execute(&quiet(), Some(&path), &config).unwrap(),
            ExitCode::Success
        );
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.handshake.relays, ["wss://relay.init"]);
        assert_eq!(loaded.handshake.timeout_seconds, 30);

        // Existing file is kept unless forced.
        assert_eq!(
            init().execute(&quiet(), Some(&path), &Config::default()).unwrap(),
            ExitCode::InvalidInput
        );
        let forced = ConfigArgs {
            action: ConfigAction::Init { force: true },
        };
        assert_eq!(
            forced.execute(&quiet(), Some(&path), &Config::default()).unwrap(),
            ExitCode::Success
        );
        assert_eq!(Config::load(&path).unwrap().handshake.timeout_seconds, 120);
    }

    #[test]
    fn test_config_init_is_creating_command() {
        let cli = Cli::try_parse_from(["aegis-connect", "config", "init", "--force"]).unwrap();
        assert!(cli.command.creates_config());
        let cli = Cli::try_parse_from(["aegis-connect", "config", "path"]).unwrap();
        assert!(!cli.command.creates_config());
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect("not a uri").is_err());
    }
}
