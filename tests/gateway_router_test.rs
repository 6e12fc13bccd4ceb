//! End-to-end router tests
//!
//! Drives the full axum application with `tower::ServiceExt::oneshot`. The
//! identity provider, the OAuth provider and the downstream service are all
//! played by one wiremock server.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authgate::config::Config;
use authgate::server::{build_router, AppState};

use common::{claims_for, config_for, jwks_for, mint, PRIMARY_KID, PRIMARY_PEM};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app(config: Config) -> Router {
    build_router(AppState::from_config(config).expect("state should build"))
}

async fn mount_jwks(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_for(&[(PRIMARY_KID, PRIMARY_PEM)])))
        .expect(expected)
        .mount(server)
        .await;
}

fn get(host: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, host)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("body should be JSON")
}

fn state_from_location(location: &str) -> String {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("redirect should carry state")
}

// ---------------------------------------------------------------------------
// API host: admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_is_public_and_skips_verification() {
    let server = MockServer::start().await;
    mount_jwks(&server, 0).await;
    let app = app(config_for(&server.uri()));

    let (status, _, body) = send(&app, get("mcp.localhost:8443", "/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"ok": true, "service": "api"}));
}

#[tokio::test]
async fn test_protected_resource_metadata_is_public() {
    let server = MockServer::start().await;
    mount_jwks(&server, 0).await;
    let app = app(config_for(&server.uri()));

    let (status, _, body) = send(
        &app,
        get("mcp.localhost", "/.well-known/oauth-protected-resource")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["resource"], "https://auth.localhost:8443");
    assert_eq!(body["scopes_supported"], json!(["mcp:read", "mcp:write"]));
}

#[tokio::test]
async fn test_missing_bearer_is_401() {
    let server = MockServer::start().await;
    mount_jwks(&server, 0).await;
    let app = app(config_for(&server.uri()));

    let (status, headers, body) = send(&app, get("mcp.localhost", "/mcp").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(json_body(&body), json!({"error": "Missing Bearer token."}));
}

#[tokio::test]
async fn test_expired_bearer_is_401_with_error() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    let app = app(config_for(&server.uri()));

    let mut claims = claims_for("user-1");
    claims["exp"] = json!(chrono::Utc::now().timestamp() - 120);
    let token = mint(PRIMARY_KID, PRIMARY_PEM, &claims);

    let (status, _, body) = send(
        &app,
        get("mcp.localhost", "/mcp")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let message = json_body(&body)["error"].as_str().unwrap().to_string();
    assert!(message.starts_with("Invalid token:"));
    assert!(!message.contains(&token));
}

#[tokio::test]
async fn test_valid_bearer_without_downstream_is_404() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    let app = app(config_for(&server.uri()));
    let token = mint(PRIMARY_KID, PRIMARY_PEM, &claims_for("user-1"));

    let (status, _, _) = send(
        &app,
        get("mcp.localhost", "/mcp")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_valid_bearer_is_proxied_with_identity_headers() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(wiremock::matchers::header("x-authgate-subject", "user-7"))
        .and(wiremock::matchers::header("x-authgate-issuer", common::ISSUER))
        .and(header_exists("x-authgate-principal"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-downstream", "yes")
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.server.downstream_url = Some(server.uri());
    let app = app(config);
    let token = mint(PRIMARY_KID, PRIMARY_PEM, &claims_for("user-7"));

    let (status, headers, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::HOST, "mcp.localhost")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers["x-downstream"], "yes");
    assert_eq!(json_body(&body)["jsonrpc"], "2.0");

    let received = server.received_requests().await.unwrap();
    let forwarded = received
        .iter()
        .find(|r| r.url.path() == "/mcp")
        .expect("downstream should see the request");
    assert_eq!(
        forwarded.body,
        br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_vec()
    );
}

#[tokio::test]
async fn test_unreachable_downstream_is_503() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let mut config = config_for(&server.uri());
    config.server.downstream_url = Some("http://127.0.0.1:1".to_string());
    let app = app(config);
    let token = mint(PRIMARY_KID, PRIMARY_PEM, &claims_for("user-1"));

    let (status, _, body) = send(
        &app,
        get("mcp.localhost", "/mcp")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json_body(&body).get("error").is_some());
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.server.downstream_url = Some(server.uri());
    let app = app(config);
    let token = mint(PRIMARY_KID, PRIMARY_PEM, &claims_for("user-1"));

    let (status, _, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::HOST, "mcp.localhost")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(vec![b'a'; 5 * 1024 * 1024 + 1]))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(&body), json!({"error": "Request body too large"}));
}

// ---------------------------------------------------------------------------
// Host dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_host_is_400() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    let (status, _, body) = send(&app, get("evil.example", "/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "Invalid host header"}));
}

#[tokio::test]
async fn test_oauth_routes_only_on_auth_host() {
    let server = MockServer::start().await;
    mount_jwks(&server, 0).await;
    let app = app(config_for(&server.uri()));

    // On the API host the start path is just another protected path.
    let (status, _, _) = send(&app, get("mcp.localhost", "/oauth/start").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, get("auth.localhost", "/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Auth host: OAuth flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_redirects_to_provider() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    let (status, headers, _) = send(&app, get("auth.localhost:8443", "/oauth/start").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::FOUND);
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("{}/v1/oauth/authorize?", server.uri())));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("owner=user"));
    assert_eq!(state_from_location(location).len(), 43);
}

#[tokio::test]
async fn test_start_with_invalid_bearer_is_401() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    let (status, _, _) = send(
        &app,
        get("auth.localhost", "/oauth/start")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_without_params_is_400() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    for uri in ["/oauth/callback", "/oauth/callback?code=abc", "/oauth/callback?state=abc"] {
        let (status, _, body) = send(&app, get("auth.localhost", uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json_body(&body), json!({"error": "Missing code or state"}));
    }
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_400() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    let (status, _, body) = send(
        &app,
        get("auth.localhost", "/oauth/callback?code=abc&state=forged")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "Invalid OAuth state."}));
}

#[tokio::test]
async fn test_callback_with_repeated_params_answers_json() {
    let server = MockServer::start().await;
    let app = app(config_for(&server.uri()));

    let (status, _, body) = send(
        &app,
        get("auth.localhost", "/oauth/callback?code=a&code=b&state=s")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "Invalid OAuth state."}));
}

#[tokio::test]
async fn test_full_flow_and_replay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "secret_live_token",
            "refresh_token": "secret_refresh",
            "workspace_id": "ws-42",
            "workspace_name": "Engineering",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(wiremock::matchers::header("authorization", "Bearer secret_live_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(config_for(&server.uri()));

    let (_, headers, _) = send(&app, get("auth.localhost", "/oauth/start").body(Body::empty()).unwrap()).await;
    let state = state_from_location(headers[header::LOCATION].to_str().unwrap());
    let callback = format!("/oauth/callback?code=code-1&state={state}");

    let (status, _, body) = send(&app, get("auth.localhost", &callback).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let raw = String::from_utf8(body.clone()).unwrap();
    assert!(!raw.contains("secret_live_token"));
    assert!(!raw.contains("secret_refresh"));

    let body = json_body(&body);
    assert_eq!(body["token"]["workspace_id"], "ws-42");
    assert_eq!(body["token"]["workspace_name"], "Engineering");
    assert!(body["token"]["created_at"].as_str().unwrap().contains('T'));
    assert!(body["token"].get("access_token").is_none());
    assert!(body["token"].get("raw").is_none());
    assert_eq!(body["smoke_test"]["object"], "list");

    let (status, _, body) = send(&app, get("auth.localhost", &callback).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "OAuth state already used."}));
}

#[tokio::test]
async fn test_rejected_exchange_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(config_for(&server.uri()));

    let (_, headers, _) = send(&app, get("auth.localhost", "/oauth/start").body(Body::empty()).unwrap()).await;
    let state = state_from_location(headers[header::LOCATION].to_str().unwrap());

    let (status, _, body) = send(
        &app,
        get("auth.localhost", &format!("/oauth/callback?code=bad&state={state}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(&body),
        json!({"error": "Provider rejected the request with status 400"})
    );
}
