//! HTTP handlers for the auth and API hosts

use std::time::Duration;

use axum::{
    body::Body,
    extract::{RawQuery, Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::gate::{bearer_token, AuthContext, CallbackOutcome};
use crate::server::AppState;

/// Largest request body forwarded downstream
const MAX_PROXY_BODY: usize = 5 * 1024 * 1024;

/// Upper bound on waiting for the downstream response head. The body
/// stream that follows is not bounded.
const PROXY_TIMEOUT: Duration = Duration::from_secs(60);

/// Headers that describe one connection and are never forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response()
}

// ---------------------------------------------------------------------------
// Auth host
// ---------------------------------------------------------------------------

/// `GET <start_path>`: issues a state and redirects to the provider.
///
/// An `Authorization` header is optional. When present it must hold a valid
/// bearer token, and the state is bound to that caller.
pub async fn oauth_start(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let principal = match headers.get(header::AUTHORIZATION) {
        None => None,
        Some(value) => {
            let token = bearer_token(value.to_str().ok()).ok_or_else(|| {
                GatewayError::Unauthenticated("Missing Bearer token.".to_string())
            })?;
            Some(state.gate.authenticate(token).await?.principal)
        }
    };

    let flow = state.gate.start(principal.as_deref())?;

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, flow.redirect_url.to_string())],
    )
        .into_response())
}

/// Query parameters of the OAuth callback
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code issued by the provider
    pub code: Option<String>,
    /// State value issued by the start route
    pub state: Option<String>,
}

impl CallbackParams {
    /// Parses a raw query string. Unknown keys are ignored and a repeated
    /// key keeps its last value.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// `GET <callback_path>?code=&state=`
pub async fn oauth_callback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<CallbackOutcome>, GatewayError> {
    let params = CallbackParams::from_query(query.as_deref());
    let outcome = state
        .gate
        .callback(params.code.as_deref(), params.state.as_deref())
        .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// API host
// ---------------------------------------------------------------------------

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({"ok": true, "service": "api"}))
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself.
    pub resource: String,

    /// Authorization servers that protect this resource.
    pub authorization_servers: Vec<String>,

    /// Scopes the resource understands.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    /// Ways a bearer token may be presented.
    pub bearer_methods_supported: Vec<String>,
}

/// `GET /.well-known/oauth-protected-resource`
pub async fn protected_resource_metadata(
    State(state): State<AppState>,
) -> Json<ProtectedResourceMetadata> {
    let resource = &state.config.resource;
    Json(ProtectedResourceMetadata {
        resource: resource.resource.clone(),
        authorization_servers: resource.authorization_servers.clone(),
        scopes_supported: resource.scopes_supported.clone(),
        bearer_methods_supported: vec!["header".to_string()],
    })
}

/// Forwards an admitted request to the downstream service.
///
/// The caller's `Authorization` header is replaced by `x-authgate-*`
/// identity headers. The response body is streamed back unbuffered.
pub async fn proxy_downstream(
    State(state): State<AppState>,
    ctx: Option<Extension<AuthContext>>,
    req: Request,
) -> Result<Response, GatewayError> {
    let Some(base) = state.config.server.downstream_url.as_deref() else {
        return Ok(not_found());
    };

    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", base.trim_end_matches('/'), path_and_query);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| GatewayError::BadRequest("Unsupported method".to_string()))?;

    let body = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge("Request body too large".to_string()))?;

    let mut builder = state.http.request(method, &url);

    for (name, value) in parts.headers.iter() {
        if !forwardable(name) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    if let Some(Extension(ctx)) = ctx {
        builder = builder
            .header("x-authgate-principal", ctx.principal.id.to_string())
            .header("x-authgate-issuer", ctx.principal.issuer.as_str())
            .header("x-authgate-subject", ctx.principal.subject.as_str());
    }

    let resp = await_response_head(PROXY_TIMEOUT, builder.body(body)).await?;

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = Response::builder().status(status);
    for (name, value) in resp.headers() {
        let name = name.as_str();
        if HOP_BY_HOP.contains(&name) || name == "content-length" {
            continue;
        }
        out = out.header(name, value.as_bytes());
    }

    out.body(Body::from_stream(resp.bytes_stream()))
        .map_err(|e| GatewayError::UpstreamUnavailable(format!("bad downstream response: {e}")))
}

/// Sends `request` and waits at most `deadline` for the status line and
/// headers. The returned body is read without a deadline.
async fn await_response_head(
    deadline: Duration,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, GatewayError> {
    tokio::time::timeout(deadline, request.send())
        .await
        .map_err(|_| {
            tracing::warn!(timeout = ?deadline, "Downstream request timed out");
            GatewayError::UpstreamUnavailable("downstream service timed out".to_string())
        })?
        .map_err(|e| {
            tracing::warn!(error = %e, "Downstream request failed");
            GatewayError::UpstreamUnavailable("downstream service unavailable".to_string())
        })
}

fn forwardable(name: &HeaderName) -> bool {
    let name = name.as_str();
    !(HOP_BY_HOP.contains(&name)
        || name == "authorization"
        || name == "host"
        || name == "content-length"
        || name.starts_with("x-authgate-"))
}
