//! Outbound calls to the OAuth provider
//!
//! [`OAuthExchangeClient`] builds the provider's authorize URL, trades an
//! authorization code for an access token, and runs one cheap authenticated
//! call (the probe) to prove the token works. Neither call is retried.
//!
//! The token request authenticates the client with HTTP Basic credentials
//! and sends a JSON body:
//!
//! ```text
//! POST <token_url>
//! Authorization: Basic base64(client_id:client_secret)
//! {"grant_type": "authorization_code", "code": "...", "redirect_uri": "..."}
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::OAuthConfig;
use crate::error::ExchangeError;

/// Header carrying the provider API version
const API_VERSION_HEADER: &str = "Notion-Version";

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Successful token endpoint response.
///
/// `raw` keeps the full provider payload; the typed fields are the ones the
/// gateway uses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    /// Access token for the provider API
    pub access_token: String,
    /// Workspace the grant belongs to
    pub workspace_id: Option<String>,
    /// Human readable workspace name
    pub workspace_name: Option<String>,
    /// Granted scope, when the provider reports one
    pub scope: Option<String>,
    /// The complete JSON body returned by the provider
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct TokenFields {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    workspace_name: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn from_raw(raw: Value) -> Result<Self, ExchangeError> {
        let fields: TokenFields = serde_json::from_value(raw.clone()).map_err(|e| {
            ExchangeError::UpstreamUnavailable(format!("unexpected token response shape: {e}"))
        })?;

        let access_token = fields
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ExchangeError::UpstreamUnavailable(
                    "token response has no access_token".to_string(),
                )
            })?;

        Ok(Self {
            access_token,
            workspace_id: fields.workspace_id,
            workspace_name: fields.workspace_name,
            scope: fields.scope,
            raw,
        })
    }
}

/// Body returned by the probe call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProbeResult(pub Value);

// ---------------------------------------------------------------------------
// OAuthExchangeClient
// ---------------------------------------------------------------------------

/// Client for the provider's authorize, token and probe endpoints.
pub struct OAuthExchangeClient {
    http: Arc<reqwest::Client>,
    config: OAuthConfig,
}

impl OAuthExchangeClient {
    /// Creates a client from the OAuth configuration
    pub fn new(http: Arc<reqwest::Client>, config: &OAuthConfig) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }

    /// Per-call timeout for the exchange and the probe
    pub fn timeout(&self) -> Duration {
        self.config.exchange_timeout()
    }

    /// Builds the provider authorize URL carrying `state`.
    ///
    /// Query parameters are, in order: `client_id`, `redirect_uri`,
    /// `response_type=code`, `owner`, `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UpstreamUnavailable`] if the configured
    /// authorize URL does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use authgate::config::OAuthConfig;
    /// use authgate::oauth::OAuthExchangeClient;
    ///
    /// let client = OAuthExchangeClient::new(Arc::new(reqwest::Client::new()), &OAuthConfig::default());
    /// let url = client.authorize_url("abc").unwrap();
    /// assert!(url.as_str().contains("response_type=code"));
    /// assert!(url.as_str().ends_with("state=abc"));
    /// ```
    pub fn authorize_url(&self, state: &str) -> Result<Url, ExchangeError> {
        let mut url = Url::parse(&self.config.authorize_url).map_err(|e| {
            ExchangeError::UpstreamUnavailable(format!("invalid authorize URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("owner", &self.config.owner)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchanges an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Rejected`] on a non-2xx answer,
    /// [`ExchangeError::UpstreamUnavailable`] on transport failure, timeout,
    /// or a body without an access token.
    pub async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError> {
        let body = json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.config.redirect_uri,
        });

        let request = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .json(&body)
            .timeout(self.timeout());

        let raw = self.send_json(request, "token exchange").await?;
        let token = TokenResponse::from_raw(raw)?;

        tracing::info!(
            workspace_id = token.workspace_id.as_deref().unwrap_or("-"),
            "OAuth code exchanged"
        );
        Ok(token)
    }

    /// Runs the probe call with `access_token`.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`exchange`](Self::exchange).
    pub async fn probe(&self, access_token: &str) -> Result<ProbeResult, ExchangeError> {
        let request = self
            .http
            .post(&self.config.probe_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .json(&json!({"query": "", "page_size": 1}))
            .timeout(self.timeout());

        let raw = self.send_json(request, "probe").await?;
        tracing::debug!("Probe succeeded");
        Ok(ProbeResult(raw))
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Value, ExchangeError> {
        let request = match self.config.api_version.as_deref() {
            Some(version) => request.header(API_VERSION_HEADER, version),
            None => request,
        };

        let resp = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "{} request failed", what);
            ExchangeError::UpstreamUnavailable(format!("{what} request failed: {e}"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "{} rejected by provider", what);
            tracing::debug!(body = %body_preview(&body), "{} rejection body", what);
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        resp.json().await.map_err(|e| {
            ExchangeError::UpstreamUnavailable(format!("failed to parse {what} response: {e}"))
        })
    }
}

/// First characters of a provider error body, for debug logs only
fn body_preview(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}... ({} bytes)", &body[..idx], body.len()),
        None => body.to_string(),
    }
}

impl std::fmt::Debug for OAuthExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthExchangeClient")
            .field("client_id", &self.config.client_id)
            .field("token_url", &self.config.token_url)
            .field("probe_url", &self.config.probe_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthExchangeClient {
        OAuthExchangeClient::new(Arc::new(reqwest::Client::new()), &OAuthConfig::default())
    }

    #[test]
    fn test_authorize_url_parameter_order() {
        let url = client().authorize_url("s1").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["client_id", "redirect_uri", "response_type", "owner", "state"]
        );
        assert_eq!(pairs[0].1, "sample-client-id");
        assert_eq!(pairs[1].1, "https://localhost:8443/oauth/callback");
        assert_eq!(pairs[2].1, "code");
        assert_eq!(pairs[3].1, "user");
        assert_eq!(pairs[4].1, "s1");
        assert!(url
            .as_str()
            .starts_with("https://api.notion.com/v1/oauth/authorize?"));
    }

    #[test]
    fn test_authorize_url_encodes_redirect_uri() {
        let url = client().authorize_url("s1").unwrap();
        assert!(url
            .as_str()
            .contains("redirect_uri=https%3A%2F%2Flocalhost%3A8443%2Foauth%2Fcallback"));
    }

    #[test]
    fn test_invalid_authorize_url() {
        let mut config = OAuthConfig::default();
        config.authorize_url = "not a url".to_string();
        let client = OAuthExchangeClient::new(Arc::new(reqwest::Client::new()), &config);
        assert!(matches!(
            client.authorize_url("s"),
            Err(ExchangeError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn test_token_response_from_raw() {
        let raw = json!({
            "access_token": "secret-token",
            "workspace_id": "ws-1",
            "workspace_name": "Docs",
            "bot_id": "bot-1",
        });
        let token = TokenResponse::from_raw(raw.clone()).unwrap();
        assert_eq!(token.access_token, "secret-token");
        assert_eq!(token.workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(token.workspace_name.as_deref(), Some("Docs"));
        assert!(token.scope.is_none());
        assert_eq!(token.raw, raw);
    }

    #[test]
    fn test_token_response_requires_access_token() {
        let err = TokenResponse::from_raw(json!({"workspace_id": "ws-1"})).unwrap_err();
        assert!(matches!(err, ExchangeError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_debug_omits_secret() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("sample-client-secret"));
    }

    #[test]
    fn test_body_preview_truncates_long_bodies() {
        assert_eq!(body_preview("{\"error\":\"invalid_grant\"}"), "{\"error\":\"invalid_grant\"}");

        let long = "x".repeat(500);
        let preview = body_preview(&long);
        assert!(preview.starts_with(&"x".repeat(200)));
        assert!(preview.ends_with("... (500 bytes)"));
    }
}
