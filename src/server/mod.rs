//! HTTP surface
//!
//! Two hosts share one listener:
//!
//! - the auth host serves the OAuth start and callback routes
//! - the API host serves `/health`, the protected resource metadata, and
//!   proxies everything else to the downstream service, all behind the
//!   admission middleware

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::gate::CredentialGate;
use middleware::HostRouters;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Admission and OAuth flow orchestration
    pub gate: Arc<CredentialGate>,
    /// Validated configuration the routes read from
    pub config: Arc<Config>,
    /// Client used for downstream forwarding
    pub http: Arc<reqwest::Client>,
}

impl AppState {
    /// Builds the gate and the shared HTTP client from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let http = Arc::new(
            reqwest::Client::builder()
                .user_agent(config.oauth.user_agent.as_str())
                .build()
                .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?,
        );
        let gate = Arc::new(CredentialGate::from_config(&config, Arc::clone(&http)));

        Ok(Self {
            gate,
            config: Arc::new(config),
            http,
        })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ExchangeRejected { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": message }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Router for the auth host
pub fn auth_router(state: AppState) -> Router {
    let oauth = &state.config.oauth;
    Router::new()
        .route(&oauth.start_path, routing::get(routes::oauth_start))
        .route(&oauth.callback_path, routing::get(routes::oauth_callback))
        .fallback(|| async { routes::not_found() })
        .with_state(state.clone())
}

/// Router for the API host, every route behind admission
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", routing::get(routes::health))
        .route(
            "/.well-known/oauth-protected-resource",
            routing::get(routes::protected_resource_metadata),
        )
        .fallback(routes::proxy_downstream)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admission_middleware,
        ))
        .with_state(state)
}

/// The complete application: host dispatch over both routers, traced
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let hosts = Arc::new(HostRouters {
        auth_host: server.auth_host.clone(),
        api_host: server.api_host.clone(),
        allowed_hosts: server.allowed_hosts.clone(),
        auth: auth_router(state.clone()),
        api: api_router(state.clone()),
    });

    Router::new()
        .fallback(middleware::dispatch_by_host)
        .with_state(hosts)
        .layer(TraceLayer::new_for_http())
}

/// Binds the configured address and serves until the process is stopped
pub async fn serve(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let state = AppState::from_config(config)?;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(
        bind = %bind,
        auth_host = %state.config.server.auth_host,
        api_host = %state.config.server.api_host,
        "Authgate listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
