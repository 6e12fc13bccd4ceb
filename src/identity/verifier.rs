//! Bearer token verification
//!
//! Tokens are RS256 JWTs issued by the identity provider. The header is read
//! without verification to find the `kid`, the key is resolved through the
//! [`KeySetCache`], and `jsonwebtoken` checks the signature plus the `exp`,
//! `iss` and `aud` claims.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::IdentityConfig;
use crate::error::VerifyError;
use crate::identity::jwks::KeySetCache;

/// The only algorithm accepted from the provider
const ACCEPTED_ALG: &str = "RS256";

/// Header fields read before the signature is checked.
///
/// `alg` is kept as a string so that `"none"` and other values
/// `jsonwebtoken` cannot represent still parse and can be rejected as a
/// signature problem rather than a malformed token.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// The decoded claim set of an accepted token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCredential {
    /// `iss` claim
    pub issuer: String,
    /// `sub` claim; empty when the token carries none
    pub subject: String,
    /// `aud` claim, normalized to a list
    pub audience: Vec<String>,
    /// `exp` claim
    pub expires_at: Option<DateTime<Utc>>,
    /// Every claim in the token, including the ones above
    pub claims: Map<String, Value>,
}

impl VerifiedCredential {
    fn from_claims(claims: Map<String, Value>) -> Self {
        let string_claim = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let audience = match claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let expires_at = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| DateTime::from_timestamp(exp, 0));

        Self {
            issuer: string_claim("iss"),
            subject: string_claim("sub"),
            audience,
            expires_at,
            claims,
        }
    }
}

/// Verifies provider-issued bearer tokens.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier expecting `issuer` and `audience`, tolerating
    /// `leeway_seconds` of clock skew on `exp`.
    pub fn new(keys: Arc<KeySetCache>, issuer: &str, audience: &str, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = leeway_seconds;

        Self { keys, validation }
    }

    /// Creates a verifier from the identity configuration.
    pub fn from_config(keys: Arc<KeySetCache>, config: &IdentityConfig) -> Self {
        Self::new(
            keys,
            &config.issuer(),
            &config.audience,
            config.leeway_seconds,
        )
    }

    /// The key cache this verifier resolves signing keys through
    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verifies `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::MalformedToken`] if the token does not parse or its
    ///   header has no `kid`
    /// - [`VerifyError::SignatureInvalid`] if the header names any
    ///   algorithm other than RS256, or the signature does not verify
    /// - [`VerifyError::UnknownSigningKey`] if the `kid` is not published
    /// - [`VerifyError::ClaimsInvalid`] on a wrong issuer or audience, an
    ///   expired token, or a missing required claim
    /// - [`VerifyError::UpstreamUnavailable`] if the key set cannot be fetched
    pub async fn verify(&self, token: &str) -> Result<VerifiedCredential, VerifyError> {
        let header = read_header(token)?;

        if header.alg != ACCEPTED_ALG {
            return Err(VerifyError::SignatureInvalid(format!(
                "algorithm {} is not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| VerifyError::MalformedToken("missing kid header".to_string()))?;

        let key = self.keys.get_key(&kid).await?;

        let data = decode::<Map<String, Value>>(token, &key, &self.validation)
            .map_err(classify_decode_error)?;

        tracing::debug!(kid = %kid, "Token verified");
        Ok(VerifiedCredential::from_claims(data.claims))
    }
}

fn read_header(token: &str) -> Result<UnverifiedHeader, VerifyError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VerifyError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| VerifyError::MalformedToken("header is not base64url".to_string()))?;

    serde_json::from_slice(&bytes)
        .map_err(|_| VerifyError::MalformedToken("header is not valid JSON".to_string()))
}

fn classify_decode_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            VerifyError::SignatureInvalid("signature verification failed".to_string())
        }
        ErrorKind::ExpiredSignature => VerifyError::ClaimsInvalid("token expired".to_string()),
        ErrorKind::ImmatureSignature => {
            VerifyError::ClaimsInvalid("token not yet valid".to_string())
        }
        ErrorKind::InvalidAudience => VerifyError::ClaimsInvalid("audience mismatch".to_string()),
        ErrorKind::InvalidIssuer => VerifyError::ClaimsInvalid("issuer mismatch".to_string()),
        ErrorKind::InvalidSubject => VerifyError::ClaimsInvalid("subject mismatch".to_string()),
        ErrorKind::MissingRequiredClaim(claim) => {
            VerifyError::ClaimsInvalid(format!("missing required claim {claim}"))
        }
        _ => VerifyError::MalformedToken("token could not be decoded".to_string()),
    }
}
