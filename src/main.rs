//! Authgate - authorization gateway
//!
#![doc = "Authgate - authorization gateway"]
#![doc = "Main entry point for the authgate binary."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use authgate::cli::{Cli, Commands};
use authgate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/authgate.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting gateway");
            authgate::server::serve(config).await?;
            Ok(())
        }
        Commands::CheckConfig => {
            print_summary(config_path, &config);
            Ok(())
        }
    }
}

/// Prints the effective configuration without secrets
fn print_summary(path: &str, config: &Config) {
    println!("Configuration OK ({})", path);
    println!("  bind:            {}", config.server.bind);
    println!("  auth host:       {}", config.server.auth_host);
    println!("  api host:        {}", config.server.api_host);
    println!(
        "  downstream:      {}",
        config.server.downstream_url.as_deref().unwrap_or("(none)")
    );
    println!("  issuer:          {}", config.identity.issuer());
    println!("  audience:        {}", config.identity.audience);
    println!("  jwks url:        {}", config.identity.jwks_url());
    println!("  jwks ttl:        {}s", config.identity.jwks_ttl_seconds);
    println!("  oauth client:    {}", config.oauth.client_id);
    println!("  redirect uri:    {}", config.oauth.redirect_uri);
    println!("  state ttl:       {}s", config.oauth.state_ttl_seconds);
    println!("  public paths:    {}", config.gate.public_paths.join(", "));
}

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "authgate=debug" } else { "authgate=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
