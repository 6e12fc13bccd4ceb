//! Test utilities for Authgate
//!
//! Fixed RSA fixtures, key-set documents derived from them, and helpers for
//! minting RS256 tokens the way the identity provider would.

use crate::config::Config;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Key id published for [`PRIMARY_PEM`]
pub const PRIMARY_KID: &str = "primary-2024";

/// Signing key the provider publishes
pub const PRIMARY_PEM: &str = include_str!("../tests/fixtures/rsa_primary.pem");

/// A key the provider never publishes
pub const ROGUE_PEM: &str = include_str!("../tests/fixtures/rsa_rogue.pem");

/// Issuer used by test configurations
pub const TEST_ISSUER: &str = "https://idp.test/auth/v1";

/// Audience used by test configurations
pub const TEST_AUDIENCE: &str = "authenticated";

/// Builds a key-set document publishing the public half of each `(kid, pem)`
pub fn jwks_for(keys: &[(&str, &str)]) -> Value {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::traits::PublicKeyParts;

    let keys: Vec<Value> = keys
        .iter()
        .map(|(kid, pem)| {
            let private = rsa::RsaPrivateKey::from_pkcs1_pem(pem).expect("fixture PEM must parse");
            let public = private.to_public_key();
            json!({
                "kid": kid,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            })
        })
        .collect();

    json!({ "keys": keys })
}

/// Claims a well-formed provider token carries, expiring in an hour
pub fn standard_claims(subject: &str) -> Value {
    json!({
        "iss": TEST_ISSUER,
        "sub": subject,
        "aud": TEST_AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "iat": chrono::Utc::now().timestamp(),
        "role": "authenticated",
    })
}

/// Signs `claims` with RS256 under `kid`
pub fn mint_token(kid: &str, pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture PEM must load");
    encode(&header, claims, &key).expect("token must encode")
}

/// Assembles a token from raw header and claims JSON with an arbitrary
/// signature segment, for algorithms `jsonwebtoken` refuses to produce
pub fn forge_token(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

/// Configuration pointing the identity section at `jwks_url`
pub fn test_config(jwks_url: &str) -> Config {
    let mut config = Config::default();
    config.identity.issuer = Some(TEST_ISSUER.to_string());
    config.identity.jwks_url = Some(jwks_url.to_string());
    config.identity.audience = TEST_AUDIENCE.to_string();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_for_publishes_each_key() {
        let doc = jwks_for(&[(PRIMARY_KID, PRIMARY_PEM), ("rogue", ROGUE_PEM)]);
        let keys = doc["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0]["kid"], PRIMARY_KID);
        assert_eq!(keys[0]["e"], "AQAB");
        assert_ne!(keys[0]["n"], keys[1]["n"]);
    }

    #[test]
    fn test_mint_token_sets_kid() {
        let token = mint_token(PRIMARY_KID, PRIMARY_PEM, &standard_claims("user-1"));
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(PRIMARY_KID));
    }

    #[test]
    fn test_test_config_validates() {
        let config = test_config("http://127.0.0.1:9/jwks.json");
        assert_eq!(config.identity.issuer(), TEST_ISSUER);
        assert!(config.validate().is_ok());
    }
}
