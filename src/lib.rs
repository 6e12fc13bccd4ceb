//! Authgate - authorization gateway library
//!
//! This library verifies bearer tokens issued by an identity provider and
//! drives a single OAuth2 authorization-code integration, with replay and
//! expiry protection on the callback.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `identity`: signing key cache, token verification, principals
//! - `oauth`: state machine, provider exchange client, token store
//! - `gate`: request admission and the callback flow
//! - `server`: axum routers, host dispatch, reverse proxy
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use authgate::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/authgate.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     authgate::server::serve(config).await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod oauth;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{GatewayError, Result};
pub use gate::{Admission, AuthContext, CredentialGate};

#[cfg(test)]
pub mod test_utils;
