//! Signing key set cache
//!
//! [`KeySetCache`] fetches the identity provider's published JSON Web Key
//! Set and serves decoding keys by `kid`. A fetched set is served until its
//! TTL elapses; the first lookup after that performs exactly one fetch and
//! swaps the whole set. There is no background refresh and nothing survives
//! a restart, so a cold cache always fetches.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;

use crate::config::IdentityConfig;
use crate::error::KeySetError;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// One entry of a key-set document. Fields the gateway does not use are
/// ignored so that providers can publish EC or symmetric keys alongside.
#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

// ---------------------------------------------------------------------------
// SigningKeySet
// ---------------------------------------------------------------------------

/// An immutable snapshot of the provider's RS256 verification keys.
///
/// Snapshots are replaced wholesale on refresh and never mutated, so a
/// reader holding an `Arc<SigningKeySet>` always sees one complete set.
pub struct SigningKeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl SigningKeySet {
    fn from_document(doc: JwksDocument) -> Self {
        let mut keys = HashMap::with_capacity(doc.keys.len());

        for jwk in doc.keys {
            let Some(kid) = jwk.kid else {
                tracing::debug!("Skipping key without kid");
                continue;
            };

            if jwk.kty != "RSA" {
                tracing::debug!(kid = %kid, kty = %jwk.kty, "Skipping non-RSA key");
                continue;
            }

            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                tracing::debug!(kid = %kid, "Skipping key with non-RS256 alg");
                continue;
            }

            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                tracing::debug!(kid = %kid, "Skipping non-signing key");
                continue;
            }

            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::warn!(kid = %kid, "RSA key is missing modulus or exponent");
                continue;
            };

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => {
                    tracing::warn!(kid = %kid, error = %e, "Skipping unusable RSA key");
                }
            }
        }

        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Number of usable keys in the snapshot
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the snapshot holds no usable keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns `true` if the snapshot holds a key for `kid`
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

impl std::fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("SigningKeySet")
            .field("kids", &kids)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KeySetCache
// ---------------------------------------------------------------------------

/// TTL cache over the provider's key-set endpoint.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use authgate::identity::KeySetCache;
///
/// let cache = KeySetCache::new(
///     Arc::new(reqwest::Client::new()),
///     "https://idp.example.com/auth/v1/.well-known/jwks.json",
///     Duration::from_secs(3600),
/// );
/// assert!(cache.snapshot().is_none());
/// ```
pub struct KeySetCache {
    http: Arc<reqwest::Client>,
    jwks_url: String,
    ttl: Duration,
    fetch_timeout: Duration,
    current: RwLock<Option<Arc<SigningKeySet>>>,
}

impl KeySetCache {
    /// Creates an empty cache for `jwks_url` with the default 10 second
    /// fetch timeout.
    pub fn new(http: Arc<reqwest::Client>, jwks_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            jwks_url: jwks_url.into(),
            ttl,
            fetch_timeout: Duration::from_secs(10),
            current: RwLock::new(None),
        }
    }

    /// Creates a cache from the identity configuration.
    pub fn from_config(http: Arc<reqwest::Client>, config: &IdentityConfig) -> Self {
        Self::new(http, config.jwks_url(), config.jwks_ttl())
            .with_fetch_timeout(config.jwks_timeout())
    }

    /// Overrides the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// The key-set endpoint this cache fetches from
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// The currently cached snapshot, fresh or not
    pub fn snapshot(&self) -> Option<Arc<SigningKeySet>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolves the decoding key for `kid`.
    ///
    /// Serves from the cached snapshot while it is fresh. A stale or absent
    /// snapshot triggers exactly one fetch before the lookup is answered,
    /// even when the refreshed set turns out not to contain `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::KeyNotFound`] if the set consulted has no key
    /// for `kid`, and [`KeySetError::UpstreamUnavailable`] if a required
    /// fetch fails (transport error, timeout, non-2xx status, bad body).
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, KeySetError> {
        let set = match self.fresh_snapshot() {
            Some(set) => set,
            None => self.refresh().await?,
        };

        set.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeySetError::KeyNotFound(kid.to_string()))
    }

    fn fresh_snapshot(&self) -> Option<Arc<SigningKeySet>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|set| set.is_fresh(self.ttl))
            .map(Arc::clone)
    }

    fn install(&self, set: Arc<SigningKeySet>) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(set);
    }

    async fn refresh(&self) -> Result<Arc<SigningKeySet>, KeySetError> {
        tracing::debug!(url = %self.jwks_url, "Fetching signing key set");

        let resp = self
            .http
            .get(&self.jwks_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Key set request failed");
                KeySetError::UpstreamUnavailable(format!("key set request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Key set endpoint returned an error");
            return Err(KeySetError::UpstreamUnavailable(format!(
                "key set endpoint returned {status}"
            )));
        }

        let doc: JwksDocument = resp.json().await.map_err(|e| {
            KeySetError::UpstreamUnavailable(format!("failed to parse key set: {e}"))
        })?;

        let set = Arc::new(SigningKeySet::from_document(doc));
        self.install(Arc::clone(&set));

        tracing::info!(keys = set.len(), "Signing key set refreshed");
        Ok(set)
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_url", &self.jwks_url)
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
