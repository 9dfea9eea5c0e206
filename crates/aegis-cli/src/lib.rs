//! Aegis Connect CLI
//!
//! This crate provides a command-line interface for:
//! - Generating and using BIP-340 key pairs
//! - Building and inspecting NIP-46 connection and launch URIs
//! - Running an interactive handshake against an external signer app

pub mod cli;
pub mod config;
pub mod launcher;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use aegis_core::HandshakeError;

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Verification failed (bad signature, or the signer rejected the request)
/// - 3: Timeout waiting for the signer app
/// - 4: The signer app could not be launched
/// - 5: Invalid input
/// - 6: The user cancelled in the signer app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    VerificationFailed = 2,
    Timeout = 3,
    LaunchFailed = 4,
    InvalidInput = 5,
    Cancelled = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&HandshakeError> for ExitCode {
    fn from(err: &HandshakeError) -> Self {
        match err {
            HandshakeError::UserCancelled => ExitCode::Cancelled,
            HandshakeError::InvalidParameter(_) => ExitCode::InvalidInput,
            HandshakeError::UnableToLaunchExternalApp => ExitCode::LaunchFailed,
            HandshakeError::VerificationFailed => ExitCode::VerificationFailed,
            HandshakeError::Timeout(_) => ExitCode::Timeout,
            HandshakeError::Abandoned
            | HandshakeError::InvalidState(_)
            | HandshakeError::Identity(_) => ExitCode::GeneralError,
        }
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::VerificationFailed => "VERIFICATION_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::LaunchFailed => "LAUNCH_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::Cancelled => "CANCELLED",
        }
    }
}
