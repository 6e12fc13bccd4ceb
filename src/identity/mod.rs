//! Caller identity
//!
//! - [`jwks`]: TTL cache over the provider's published signing keys
//! - [`verifier`]: RS256 bearer token verification
//! - [`principal`]: stable principals keyed by `(issuer, subject)`

pub mod jwks;
pub mod principal;
pub mod verifier;

pub use jwks::{KeySetCache, SigningKeySet};
pub use principal::{Principal, PrincipalRegistry};
pub use verifier::{TokenVerifier, VerifiedCredential};
