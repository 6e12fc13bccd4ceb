use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;

use authgate::config::Config;

#[allow(dead_code)]
pub const PRIMARY_KID: &str = "primary-2024";
#[allow(dead_code)]
pub const PRIMARY_PEM: &str = include_str!("../fixtures/rsa_primary.pem");
#[allow(dead_code)]
pub const ROGUE_PEM: &str = include_str!("../fixtures/rsa_rogue.pem");
#[allow(dead_code)]
pub const ISSUER: &str = "https://idp.test/auth/v1";
#[allow(dead_code)]
pub const AUDIENCE: &str = "authenticated";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("authgate.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Key-set document publishing the public half of each `(kid, pem)`.
#[allow(dead_code)]
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

/// Claims of a valid token for `subject`, expiring in an hour.
#[allow(dead_code)]
pub fn claims_for(subject: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "sub": subject,
        "aud": AUDIENCE,
        "exp": now + 3600,
        "iat": now,
        "email": format!("{subject}@example.com"),
    })
}

/// RS256 token signed with `pem` under `kid`.
#[allow(dead_code)]
pub fn mint(kid: &str, pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture PEM must load");
    encode(&header, claims, &key).expect("token must encode")
}

/// HS256 token under `kid`, signed with an arbitrary shared secret.
#[allow(dead_code)]
pub fn mint_hs256(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(b"shared-secret")).expect("token must encode")
}

/// Configuration whose identity and OAuth endpoints all live on `base`.
#[allow(dead_code)]
pub fn config_for(base: &str) -> Config {
    let mut config = Config::default();
    config.identity.issuer = Some(ISSUER.to_string());
    config.identity.jwks_url = Some(format!("{base}/jwks.json"));
    config.identity.audience = AUDIENCE.to_string();
    config.oauth.client_id = "client-123".to_string();
    config.oauth.client_secret = "secret-456".to_string();
    config.oauth.authorize_url = format!("{base}/v1/oauth/authorize");
    config.oauth.token_url = format!("{base}/v1/oauth/token");
    config.oauth.probe_url = format!("{base}/v1/search");
    config
}
