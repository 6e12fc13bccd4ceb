//! Request admission and host dispatch
//!
//! [`admission_middleware`] runs the credential gate in front of every API
//! route. [`dispatch_by_host`] picks the auth or API router from the `Host`
//! header.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tower::ServiceExt as _;

use crate::gate::Admission;
use crate::server::AppState;

/// Admits or rejects a request through the gate.
///
/// Authenticated requests carry an [`AuthContext`](crate::gate::AuthContext)
/// in their extensions.
pub async fn admission_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let admission = state
        .gate
        .admit(req.uri().path(), authorization.as_deref())
        .await;

    match admission {
        Ok(Admission::Public) => next.run(req).await,
        Ok(Admission::Authenticated(ctx)) => {
            tracing::debug!(principal = %ctx.principal.id, path = %req.uri().path(), "Request admitted");
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// The per-host routers and the host allow-list.
#[derive(Clone)]
pub struct HostRouters {
    /// Host name served by `auth`
    pub auth_host: String,
    /// Host name served by `api`
    pub api_host: String,
    /// Accepted host names; empty accepts any
    pub allowed_hosts: Vec<String>,
    /// OAuth start and callback routes
    pub auth: Router,
    /// Admission-guarded API routes
    pub api: Router,
}

/// Routes a request to the auth or API router by its host name.
///
/// A host outside a non-empty allow-list is a 400; an allowed host that
/// matches neither router is a 404.
pub async fn dispatch_by_host(State(hosts): State<Arc<HostRouters>>, req: Request<Body>) -> Response {
    let host = request_host(&req).unwrap_or_default();

    if !hosts.allowed_hosts.is_empty()
        && !hosts
            .allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&host))
    {
        tracing::debug!(host = %host, "Rejected request for unknown host");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid host header"})),
        )
            .into_response();
    }

    let router = if host.eq_ignore_ascii_case(&hosts.auth_host) {
        hosts.auth.clone()
    } else if host.eq_ignore_ascii_case(&hosts.api_host) {
        hosts.api.clone()
    } else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response();
    };

    router.oneshot(req).await.unwrap_or_else(|e| match e {})
}

/// Host name of the request without its port, from `Host` or the URI
fn request_host(req: &Request<Body>) -> Option<String> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;
    Some(strip_port(raw).to_ascii_lowercase())
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}
