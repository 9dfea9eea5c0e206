//! Terminal launcher.
//!
//! The CLI cannot open another app itself, so "launching" means handing the
//! URI to the user on stdout. The user opens it on a device with the signer
//! app installed and pastes the redirect back on stdin.

use std::io::Write;

use aegis_core::ExternalLauncher;
use async_trait::async_trait;
use serde::Serialize;

use crate::output::OutputFormat;

#[derive(Serialize)]
struct LaunchLine<'a> {
    launch_uri: &'a str,
}

/// Prints the launch URI for the user to open.
pub struct PrintLauncher {
    format: OutputFormat,
}

impl PrintLauncher {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Text written to stdout for `uri`.
    pub fn render(&self, uri: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(&LaunchLine { launch_uri: uri })
                .unwrap_or_else(|_| uri.to_string()),
            OutputFormat::Table | OutputFormat::Quiet => uri.to_string(),
        }
    }

    fn print(&self, uri: &str) -> bool {
        if self.format == OutputFormat::Table {
            eprintln!("Open this URI with the signer app, then paste the callback URI here:");
        }
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", self.render(uri))
            .and_then(|_| stdout.flush())
            .is_ok()
    }
}

#[async_trait]
impl ExternalLauncher for PrintLauncher {
    async fn launch(&self, uri: &str) -> bool {
        self.print(uri)
    }
}
