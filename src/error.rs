//! Error types for Authgate
//!
//! This module defines the error kinds produced by the credential core and
//! the umbrella [`GatewayError`] the HTTP layer turns into responses. All
//! types use `thiserror` for their `Display` and `Error` implementations.
//!
//! Component errors ([`KeySetError`], [`VerifyError`], [`ConsumeError`],
//! [`ExchangeError`]) are small enums so callers branch on the variant, not
//! on message text. Their messages are short reasons that are safe to show
//! to a caller: they never carry key material or full claim sets.

use thiserror::Error;

/// Main error type for Authgate operations
///
/// Every failure that reaches the HTTP surface is expressed as one of these
/// variants. The variant decides the status code; the message becomes the
/// `{"error": ...}` body.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing, malformed, expired, or otherwise invalid bearer credential
    #[error("{0}")]
    Unauthenticated(String),

    /// Malformed OAuth callback parameters or an unusable state value
    #[error("{0}")]
    BadRequest(String),

    /// The identity provider, OAuth provider, or downstream service could
    /// not be reached in time
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The OAuth provider answered with a non-success status
    #[error("Provider rejected the request with status {status}")]
    ExchangeRejected {
        /// HTTP status returned by the provider
        status: u16,
    },

    /// A request body exceeded the forwarding limit
    #[error("{0}")]
    PayloadTooLarge(String),
}

/// Failures of a signing-key lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySetError {
    /// Neither the cached nor a freshly fetched key set contains the `kid`
    #[error("no signing key with kid '{0}'")]
    KeyNotFound(String),

    /// The key-set fetch failed (transport, timeout, status, or body)
    #[error("key set unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Failures of bearer token verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The token cannot be parsed or has no `kid` header
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The `kid` in the header does not resolve to a provider key
    #[error("unknown signing key: {0}")]
    UnknownSigningKey(String),

    /// Bad signature, or an algorithm other than the accepted one
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),

    /// Wrong audience, wrong issuer, expired, or a required claim missing
    #[error("invalid claims: {0}")]
    ClaimsInvalid(String),

    /// The key set could not be fetched
    #[error("key set unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<KeySetError> for VerifyError {
    fn from(err: KeySetError) -> Self {
        match err {
            KeySetError::KeyNotFound(kid) => VerifyError::UnknownSigningKey(kid),
            KeySetError::UpstreamUnavailable(msg) => VerifyError::UpstreamUnavailable(msg),
        }
    }
}

/// Failures of a single-use OAuth state consumption
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    /// The state value was never issued
    #[error("Invalid OAuth state.")]
    StateNotFound,

    /// The state value was already used by an earlier callback
    #[error("OAuth state already used.")]
    StateAlreadyConsumed,

    /// The state value outlived its TTL before being used
    #[error("OAuth state expired.")]
    StateExpired,
}

/// Failures of the outbound OAuth calls (code exchange and probe)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The provider answered with a non-success status
    #[error("provider returned {status}")]
    Rejected {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body returned by the provider
        body: String,
    },

    /// Transport failure, timeout, or an unreadable response
    #[error("provider unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<ConsumeError> for GatewayError {
    fn from(err: ConsumeError) -> Self {
        GatewayError::BadRequest(err.to_string())
    }
}

impl From<ExchangeError> for GatewayError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Rejected { status, .. } => GatewayError::ExchangeRejected { status },
            ExchangeError::UpstreamUnavailable(msg) => GatewayError::UpstreamUnavailable(msg),
        }
    }
}

/// Result type alias for bootstrap and configuration code
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. The request
/// path uses the typed errors above instead.
pub type Result<T> = anyhow::Result<T>;
