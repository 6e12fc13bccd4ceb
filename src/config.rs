//! Configuration management for Authgate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest first: built-in defaults, the YAML file, `AUTHGATE_*`
//! environment variables, CLI flags.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure for Authgate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listener and host routing settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider (bearer token verification) settings
    #[serde(default)]
    pub identity: IdentityConfig,
    /// OAuth integration settings
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Request admission settings
    #[serde(default)]
    pub gate: GateConfig,
    /// Protected resource metadata served to clients
    #[serde(default)]
    pub resource: ResourceConfig,
}

/// Listener and host routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Host name that serves the OAuth start and callback routes
    #[serde(default = "default_auth_host")]
    pub auth_host: String,

    /// Host name that serves the protected API
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Host names accepted at all; an empty list accepts any host
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Service that admitted API requests are forwarded to
    #[serde(default)]
    pub downstream_url: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8443".to_string()
}

fn default_auth_host() -> String {
    "auth.localhost".to_string()
}

fn default_api_host() -> String {
    "mcp.localhost".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec![default_auth_host(), default_api_host()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_host: default_auth_host(),
            api_host: default_api_host(),
            allowed_hosts: default_allowed_hosts(),
            downstream_url: None,
        }
    }
}

/// Identity provider configuration
///
/// `issuer` and `jwks_url` may be left unset, in which case they are derived
/// from `project_url` (`<project>/auth/v1` and
/// `<issuer>/.well-known/jwks.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity provider project
    #[serde(default = "default_project_url")]
    pub project_url: String,

    /// Expected `iss` claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Key-set endpoint
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// Expected `aud` claim
    #[serde(default = "default_audience")]
    pub audience: String,

    /// How long a fetched key set is served before refetching (seconds)
    #[serde(default = "default_jwks_ttl_seconds")]
    pub jwks_ttl_seconds: u64,

    /// Timeout for a single key-set fetch (seconds)
    #[serde(default = "default_jwks_timeout_seconds")]
    pub jwks_timeout_seconds: u64,

    /// Clock skew tolerated on `exp` (seconds)
    #[serde(default)]
    pub leeway_seconds: u64,
}

fn default_project_url() -> String {
    "https://your-project.supabase.co".to_string()
}

fn default_audience() -> String {
    "authenticated".to_string()
}

fn default_jwks_ttl_seconds() -> u64 {
    3600
}

fn default_jwks_timeout_seconds() -> u64 {
    10
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            project_url: default_project_url(),
            issuer: None,
            jwks_url: None,
            audience: default_audience(),
            jwks_ttl_seconds: default_jwks_ttl_seconds(),
            jwks_timeout_seconds: default_jwks_timeout_seconds(),
            leeway_seconds: 0,
        }
    }
}

impl IdentityConfig {
    /// Effective issuer, derived from the project URL when unset
    pub fn issuer(&self) -> String {
        match &self.issuer {
            Some(issuer) => issuer.clone(),
            None => format!("{}/auth/v1", self.project_url.trim_end_matches('/')),
        }
    }

    /// Effective key-set URL, derived from the issuer when unset
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/.well-known/jwks.json",
                self.issuer().trim_end_matches('/')
            ),
        }
    }

    /// Key-set TTL as a [`Duration`]
    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_seconds)
    }

    /// Key-set fetch timeout as a [`Duration`]
    pub fn jwks_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_timeout_seconds)
    }
}

/// OAuth integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth client secret, sent in the Basic authorization header
    #[serde(default = "default_client_secret")]
    pub client_secret: String,

    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Value of the provider's `owner` authorize parameter
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Provider authorize endpoint
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Provider token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Provider endpoint called to prove a fresh token works
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Provider API version, sent as `Notion-Version` when set
    #[serde(default = "default_api_version")]
    pub api_version: Option<String>,

    /// User agent for outbound provider calls
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Lifetime of an issued state value (seconds)
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: u64,

    /// Timeout for the token exchange and the probe (seconds)
    #[serde(default = "default_exchange_timeout_seconds")]
    pub exchange_timeout_seconds: u64,

    /// Path of the flow start route on the auth host
    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// Path of the callback route on the auth host
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_client_id() -> String {
    "sample-client-id".to_string()
}

fn default_client_secret() -> String {
    "sample-client-secret".to_string()
}

fn default_redirect_uri() -> String {
    "https://localhost:8443/oauth/callback".to_string()
}

fn default_owner() -> String {
    "user".to_string()
}

fn default_authorize_url() -> String {
    "https://api.notion.com/v1/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://api.notion.com/v1/oauth/token".to_string()
}

fn default_probe_url() -> String {
    "https://api.notion.com/v1/search".to_string()
}

fn default_api_version() -> Option<String> {
    Some("2022-06-28".to_string())
}

fn default_user_agent() -> String {
    format!("authgate/{}", env!("CARGO_PKG_VERSION"))
}

fn default_state_ttl_seconds() -> u64 {
    600
}

fn default_exchange_timeout_seconds() -> u64 {
    20
}

fn default_start_path() -> String {
    "/oauth/start".to_string()
}

fn default_callback_path() -> String {
    "/oauth/callback".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            redirect_uri: default_redirect_uri(),
            owner: default_owner(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            probe_url: default_probe_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            state_ttl_seconds: default_state_ttl_seconds(),
            exchange_timeout_seconds: default_exchange_timeout_seconds(),
            start_path: default_start_path(),
            callback_path: default_callback_path(),
        }
    }
}

impl OAuthConfig {
    /// State TTL as a [`Duration`]
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_seconds)
    }

    /// Exchange and probe timeout as a [`Duration`]
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_seconds)
    }
}

/// Request admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Path prefixes admitted without a bearer credential
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/.well-known/".to_string()]
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            public_paths: default_public_paths(),
        }
    }
}

/// Protected resource metadata (RFC 9728) advertised on the API host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Identifier of the protected resource
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Authorization servers that protect the resource
    #[serde(default = "default_authorization_servers")]
    pub authorization_servers: Vec<String>,

    /// Scopes the resource understands
    #[serde(default = "default_scopes_supported")]
    pub scopes_supported: Vec<String>,
}

fn default_resource() -> String {
    "https://auth.localhost:8443".to_string()
}

fn default_authorization_servers() -> Vec<String> {
    vec![default_resource()]
}

fn default_scopes_supported() -> Vec<String> {
    vec!["mcp:read".to_string(), "mcp:write".to_string()]
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            authorization_servers: default_authorization_servers(),
            scopes_supported: default_scopes_supported(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            identity: IdentityConfig::default(),
            oauth: OAuthConfig::default(),
            gate: GateConfig::default(),
            resource: ResourceConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Server overrides
        if let Ok(bind) = std::env::var("AUTHGATE_BIND") {
            self.server.bind = bind;
        }

        if let Ok(host) = std::env::var("AUTHGATE_AUTH_HOST") {
            self.server.auth_host = host;
        }

        if let Ok(host) = std::env::var("AUTHGATE_API_HOST") {
            self.server.api_host = host;
        }

        if let Ok(hosts) = std::env::var("AUTHGATE_ALLOWED_HOSTS") {
            self.server.allowed_hosts = split_list(&hosts);
        }

        if let Ok(url) = std::env::var("AUTHGATE_DOWNSTREAM_URL") {
            self.server.downstream_url = Some(url).filter(|u| !u.is_empty());
        }

        // Identity overrides
        if let Ok(project_url) = std::env::var("AUTHGATE_PROJECT_URL") {
            self.identity.project_url = project_url;
        }

        if let Ok(issuer) = std::env::var("AUTHGATE_ISSUER") {
            self.identity.issuer = Some(issuer);
        }

        if let Ok(jwks_url) = std::env::var("AUTHGATE_JWKS_URL") {
            self.identity.jwks_url = Some(jwks_url);
        }

        if let Ok(audience) = std::env::var("AUTHGATE_AUDIENCE") {
            self.identity.audience = audience;
        }

        if let Ok(ttl) = std::env::var("AUTHGATE_JWKS_TTL_SECONDS") {
            if let Ok(value) = ttl.parse() {
                self.identity.jwks_ttl_seconds = value;
            } else {
                tracing::warn!("Invalid AUTHGATE_JWKS_TTL_SECONDS: {}", ttl);
            }
        }

        if let Ok(timeout) = std::env::var("AUTHGATE_JWKS_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.identity.jwks_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AUTHGATE_JWKS_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(leeway) = std::env::var("AUTHGATE_LEEWAY_SECONDS") {
            if let Ok(value) = leeway.parse() {
                self.identity.leeway_seconds = value;
            } else {
                tracing::warn!("Invalid AUTHGATE_LEEWAY_SECONDS: {}", leeway);
            }
        }

        // OAuth overrides
        if let Ok(client_id) = std::env::var("AUTHGATE_OAUTH_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("AUTHGATE_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = client_secret;
        }

        if let Ok(redirect_uri) = std::env::var("AUTHGATE_OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(owner) = std::env::var("AUTHGATE_OAUTH_OWNER") {
            self.oauth.owner = owner;
        }

        if let Ok(ttl) = std::env::var("AUTHGATE_STATE_TTL_SECONDS") {
            if let Ok(value) = ttl.parse() {
                self.oauth.state_ttl_seconds = value;
            } else {
                tracing::warn!("Invalid AUTHGATE_STATE_TTL_SECONDS: {}", ttl);
            }
        }

        if let Ok(timeout) = std::env::var("AUTHGATE_EXCHANGE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.oauth.exchange_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AUTHGATE_EXCHANGE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        // Gate overrides
        if let Ok(paths) = std::env::var("AUTHGATE_PUBLIC_PATHS") {
            self.gate.public_paths = split_list(&paths);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(bind) = cli.bind_override() {
            self.server.bind = bind.to_string();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(GatewayError::Config(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            ))
            .into());
        }

        if self.server.auth_host.is_empty() || self.server.api_host.is_empty() {
            return Err(GatewayError::Config(
                "server.auth_host and server.api_host cannot be empty".to_string(),
            )
            .into());
        }

        if let Some(ref downstream) = self.server.downstream_url {
            require_url("server.downstream_url", downstream)?;
        }

        if self.identity.issuer().is_empty() {
            return Err(GatewayError::Config("identity.issuer cannot be empty".to_string()).into());
        }

        if self.identity.audience.is_empty() {
            return Err(
                GatewayError::Config("identity.audience cannot be empty".to_string()).into(),
            );
        }

        require_url("identity.jwks_url", &self.identity.jwks_url())?;

        if self.identity.jwks_ttl_seconds == 0 {
            return Err(GatewayError::Config(
                "identity.jwks_ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.identity.jwks_timeout_seconds == 0 {
            return Err(GatewayError::Config(
                "identity.jwks_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.oauth.client_id.is_empty() || self.oauth.client_secret.is_empty() {
            return Err(GatewayError::Config(
                "oauth.client_id and oauth.client_secret must be set".to_string(),
            )
            .into());
        }

        require_url("oauth.redirect_uri", &self.oauth.redirect_uri)?;
        require_url("oauth.authorize_url", &self.oauth.authorize_url)?;
        require_url("oauth.token_url", &self.oauth.token_url)?;
        require_url("oauth.probe_url", &self.oauth.probe_url)?;

        if self.oauth.state_ttl_seconds == 0 {
            return Err(GatewayError::Config(
                "oauth.state_ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.oauth.exchange_timeout_seconds == 0 {
            return Err(GatewayError::Config(
                "oauth.exchange_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for path in [&self.oauth.start_path, &self.oauth.callback_path] {
            if !path.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "OAuth route paths must start with '/': {}",
                    path
                ))
                .into());
            }
        }

        if let Some(bad) = self.gate.public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(GatewayError::Config(format!(
                "gate.public_paths entries must start with '/': {}",
                bad
            ))
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

fn require_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| GatewayError::Config(format!("{} is not a valid URL: {}", field, e)).into())
}

/// Splits a comma-separated environment value, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
