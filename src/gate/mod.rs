//! Request admission and the OAuth callback flow
//!
//! [`CredentialGate`] is the one object the HTTP layer talks to. It owns the
//! verifier, the principal registry, the state machine, the exchange client
//! and the token store, all injected at construction.
//!
//! Admission for a request path:
//!
//! 1. A path starting with a configured public prefix is admitted as is.
//! 2. Otherwise an `Authorization: Bearer <token>` header is required.
//! 3. The token must verify and carry non-empty `iss` and `sub`.
//! 4. The `(iss, sub)` pair resolves to a principal, which is handed back
//!    with the claims as an [`AuthContext`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::GatewayError;
use crate::identity::{
    KeySetCache, Principal, PrincipalRegistry, TokenVerifier, VerifiedCredential,
};
use crate::oauth::{
    OAuthExchangeClient, OAuthState, OAuthStateMachine, TokenRecord, TokenStore, TokenView,
};

/// Identity attached to an admitted request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The caller
    pub principal: Arc<Principal>,
    /// The caller's verified claims
    pub credential: Arc<VerifiedCredential>,
}

/// Outcome of a successful admission check.
#[derive(Debug, Clone)]
pub enum Admission {
    /// The path is public; no credential was examined
    Public,
    /// The request carried a valid credential
    Authenticated(AuthContext),
}

impl Admission {
    /// The auth context, when the request was authenticated
    pub fn context(&self) -> Option<&AuthContext> {
        match self {
            Admission::Public => None,
            Admission::Authenticated(ctx) => Some(ctx),
        }
    }
}

/// A freshly started authorization flow.
#[derive(Debug, Clone)]
pub struct StartedFlow {
    /// The issued state record
    pub state: OAuthState,
    /// Provider authorize URL to redirect the caller to
    pub redirect_url: Url,
}

/// Body returned by a successful callback.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    /// Sanitized view of the stored token
    pub token: TokenView,
    /// Probe response from the provider
    pub smoke_test: Value,
}

/// Orchestrates admission and the OAuth callback flow.
pub struct CredentialGate {
    verifier: TokenVerifier,
    principals: Arc<PrincipalRegistry>,
    states: Arc<OAuthStateMachine>,
    exchange: OAuthExchangeClient,
    tokens: Arc<TokenStore>,
    public_paths: Vec<String>,
}

impl CredentialGate {
    /// Assembles a gate from its collaborators
    pub fn new(
        verifier: TokenVerifier,
        principals: Arc<PrincipalRegistry>,
        states: Arc<OAuthStateMachine>,
        exchange: OAuthExchangeClient,
        tokens: Arc<TokenStore>,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            verifier,
            principals,
            states,
            exchange,
            tokens,
            public_paths,
        }
    }

    /// Builds every collaborator from configuration, sharing `http`
    pub fn from_config(config: &Config, http: Arc<reqwest::Client>) -> Self {
        let keys = Arc::new(KeySetCache::from_config(
            Arc::clone(&http),
            &config.identity,
        ));

        Self::new(
            TokenVerifier::from_config(keys, &config.identity),
            Arc::new(PrincipalRegistry::new()),
            Arc::new(OAuthStateMachine::new(config.oauth.state_ttl())),
            OAuthExchangeClient::new(http, &config.oauth),
            Arc::new(TokenStore::new()),
            config.gate.public_paths.clone(),
        )
    }

    /// Registry of principals seen so far
    pub fn principals(&self) -> &Arc<PrincipalRegistry> {
        &self.principals
    }

    /// Outstanding and consumed OAuth states
    pub fn states(&self) -> &Arc<OAuthStateMachine> {
        &self.states
    }

    /// Store of the latest provider token
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Returns `true` if `path` starts with a public prefix
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Decides whether a request for `path` carrying `authorization` may
    /// proceed.
    ///
    /// # Errors
    ///
    /// Every rejection is [`GatewayError::Unauthenticated`] with a short
    /// reason.
    pub async fn admit(
        &self,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<Admission, GatewayError> {
        if self.is_public(path) {
            return Ok(Admission::Public);
        }

        let token = bearer_token(authorization).ok_or_else(|| {
            tracing::debug!(path = %path, "Request without bearer token");
            GatewayError::Unauthenticated("Missing Bearer token.".to_string())
        })?;

        self.authenticate(token)
            .await
            .map(Admission::Authenticated)
    }

    /// Verifies `token` and resolves its principal.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, GatewayError> {
        let credential = self.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(reason = %e, "Bearer token rejected");
            GatewayError::Unauthenticated(format!("Invalid token: {e}"))
        })?;

        if credential.issuer.is_empty() || credential.subject.is_empty() {
            return Err(GatewayError::Unauthenticated(
                "Token missing iss/sub.".to_string(),
            ));
        }

        let principal = self
            .principals
            .get_or_create(&credential.issuer, &credential.subject);

        Ok(AuthContext {
            principal,
            credential: Arc::new(credential),
        })
    }

    /// Starts an authorization flow, optionally bound to `principal`.
    pub fn start(&self, principal: Option<&Principal>) -> Result<StartedFlow, GatewayError> {
        let state = self.states.start(None, principal);
        let redirect_url = self.exchange.authorize_url(&state.state)?;

        tracing::info!(bound = principal.is_some(), "OAuth flow started");
        Ok(StartedFlow {
            state,
            redirect_url,
        })
    }

    /// Completes an authorization flow.
    ///
    /// Consumes `state`, exchanges `code`, stores the resulting token and
    /// runs the probe. The record is stored before the probe, so a failed
    /// probe still leaves the new token as the current one.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::BadRequest`] if either parameter is missing or
    ///   empty, or the state is unknown, used, or expired
    /// - [`GatewayError::ExchangeRejected`] or
    ///   [`GatewayError::UpstreamUnavailable`] from the provider calls
    pub async fn callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<CallbackOutcome, GatewayError> {
        let (Some(code), Some(state)) = (
            code.filter(|c| !c.is_empty()),
            state.filter(|s| !s.is_empty()),
        ) else {
            return Err(GatewayError::BadRequest(
                "Missing code or state".to_string(),
            ));
        };

        let consumed = self.states.consume(state).map_err(|e| {
            tracing::warn!(reason = %e, "OAuth callback with unusable state");
            e
        })?;

        let response = self.exchange.exchange(code).await?;
        let record = self
            .tokens
            .save(TokenRecord::from_response(response, Utc::now()));

        let probe = self.exchange.probe(&record.access_token).await?;

        tracing::info!(
            workspace_id = record.workspace_id.as_deref().unwrap_or("-"),
            bound = consumed.principal_id.is_some(),
            "OAuth callback completed"
        );

        Ok(CallbackOutcome {
            token: record.view(),
            smoke_test: probe.0,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value. The
/// scheme is matched case-insensitively.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let (scheme, token) = authorization?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
