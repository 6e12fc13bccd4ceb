//! Command-line interface definition for Authgate
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving the gateway and checking configuration.

use clap::{Parser, Subcommand};

/// Authgate - authorization gateway
///
/// Verifies bearer tokens against an identity provider's key set and
/// drives a single OAuth2 authorization-code integration.
#[derive(Parser, Debug, Clone)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/authgate.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "AUTHGATE_JSON_LOGS")]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Authgate
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the gateway over HTTP
    Serve {
        /// Override the listen address from config (e.g. 0.0.0.0:8443)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Listen address override supplied on the command line, if any
    pub fn bind_override(&self) -> Option<&str> {
        match &self.command {
            Commands::Serve { bind } => bind.as_deref(),
            Commands::CheckConfig => None,
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/authgate.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: Commands::Serve { bind: None },
        }
    }
}
