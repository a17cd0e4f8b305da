// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, CORS, the auth middleware, and shared state. All tenant
//! routes live under `/api/v1`; `/health` is public.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use wabridge_config::CorsConfig;
use wabridge_core::BridgeError;
use wabridge_session::{PairingService, SessionRegistry};
use wabridge_webhook::WebhookDispatcher;

use crate::auth::{auth_middleware, AuthState};
use crate::{health, messages, sessions, webhooks};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub pairing: Arc<PairingService>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub auth: AuthState,
    /// Process start, for uptime reporting.
    pub started_at: std::time::Instant,
    /// Deployment environment name, for health reporting.
    pub environment: String,
    /// Cancelled when the process begins draining.
    pub shutdown: CancellationToken,
}

/// Builds the full application router.
pub fn build_router(state: AppState, cors: &CorsConfig, max_body_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/sessions/active", get(sessions::active))
        .route("/sessions/{tenant_id}/start", post(sessions::start))
        .route("/sessions/{tenant_id}/status", get(sessions::status))
        .route("/sessions/{tenant_id}/qr", get(sessions::qr))
        .route("/sessions/{tenant_id}", delete(sessions::stop))
        .route("/sessions/{tenant_id}/restart", post(sessions::restart))
        .route("/sessions/{tenant_id}/poll", get(sessions::poll))
        .route("/messages/{tenant_id}/send", post(messages::send))
        .route("/messages/{tenant_id}/send-media", post(messages::send_media))
        .route("/messages/{tenant_id}/send-bulk", post(messages::send_bulk))
        .route("/webhooks/register/{tenant_id}", post(webhooks::register))
        .route("/webhooks/list/{tenant_id}", get(webhooks::list))
        .route("/webhooks/{tenant_id}/{webhook_id}", delete(webhooks::remove))
        .route("/webhooks/test/{tenant_id}/{webhook_id}", post(webhooks::test))
        .route("/webhooks/stats/{tenant_id}", get(webhooks::stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(cors_layer(cors))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// A handler panic must not kill the connection; it becomes a plain 500.
fn handle_panic(
    panic: Box<dyn std::any::Any + Send + 'static>,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(detail = %detail, "request handler panicked");
    crate::responses::ApiError::Internal("internal error".to_string()).into_response()
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allow_any() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable allowed origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Binds and serves the router until `shutdown` fires.
pub async fn start_server(
    host: &str,
    port: u16,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| BridgeError::Internal(format!("gateway server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use wabridge_core::{ConnectionState, UpstreamUpdate};
    use wabridge_session::{CredentialStore, NoopEventHandler, SessionSettings};
    use wabridge_test_utils::{MockConnection, MockUpstream};

    use crate::auth::{issue_tenant_token, TenantClaims};

    const API_KEY: &str = "test-key-0123456789";
    const JWT_SECRET: &str = "jwt-secret-0123456789-0123456789";

    struct TestHarness {
        app: Router,
        upstream: Arc<MockUpstream>,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> TestHarness {
        let upstream = Arc::new(MockUpstream::new());
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::open(dir.path()).await.unwrap());

        let registry = Arc::new(SessionRegistry::new(
            upstream.clone(),
            store,
            Arc::new(NoopEventHandler),
            SessionSettings::default(),
            None,
        ));
        let state = AppState {
            registry,
            pairing: Arc::new(PairingService::new()),
            dispatcher: Arc::new(WebhookDispatcher::new().unwrap()),
            auth: AuthState {
                api_key: API_KEY.into(),
                jwt_secret: JWT_SECRET.into(),
                require_auth: true,
            },
            started_at: std::time::Instant::now(),
            environment: "test".into(),
            shutdown: CancellationToken::new(),
        };
        let app = build_router(state.clone(), &CorsConfig::default(), 1024 * 1024);
        TestHarness {
            app,
            upstream,
            state,
            _dir: dir,
        }
    }

    async fn request(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Scripts a connection that pairs immediately, so start returns a QR.
    async fn script_pairing(upstream: &MockUpstream) -> MockConnection {
        let conn = upstream.script_connection();
        conn.push(UpstreamUpdate::Pairing(vec![9u8; 900])).await;
        conn
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let h = harness().await;
        let (status, json) = request(&h.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["environment"], "test");
    }

    #[tokio::test]
    async fn health_flips_unhealthy_when_draining() {
        let h = harness().await;
        h.state.shutdown.cancel();
        let (status, json) = request(&h.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn api_routes_reject_missing_or_bad_tokens() {
        let h = harness().await;
        let (status, json) =
            request(&h.app, "GET", "/api/v1/sessions/t-1/status", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "UNAUTHORIZED");

        let (status, _) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-1/status",
            Some("wrong-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn start_returns_session_id_and_pairing_code() {
        let h = harness().await;
        let _conn = script_pairing(&h.upstream).await;

        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        let session_id = json["data"]["sessionId"].as_str().unwrap();
        assert!(session_id.starts_with("t-1_"));
        let qr = json["data"]["qrCode"].as_str().unwrap();
        assert!(qr.starts_with("data:image/png;base64,"));
        assert!(qr.len() >= 1000);

        // Status now reports the qr state; the qr route serves the artifact.
        let (_, json) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-1/status",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(json["data"]["status"], "qr");
        assert_eq!(json["data"]["connected"], false);

        let (_, json) =
            request(&h.app, "GET", "/api/v1/sessions/t-1/qr", Some(API_KEY), None).await;
        assert_eq!(json["data"]["hasQR"], true);
        assert!(json["data"]["qrCode"].as_str().unwrap().len() >= 1000);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_connected() {
        let h = harness().await;
        let conn = h.upstream.script_connection();
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;

        let (_, first) = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;
        let (_, second) = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(second["data"]["sessionId"], first["data"]["sessionId"]);
        assert_eq!(second["message"], "session already connected");
        assert!(second["data"]["qrCode"].is_null());
        assert_eq!(h.upstream.connect_count(), 1);
    }

    #[tokio::test]
    async fn delete_stops_the_session_and_clears_state() {
        let h = harness().await;
        let _conn = script_pairing(&h.upstream).await;
        let _ = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;

        let (status, _) = request(
            &h.app,
            "DELETE",
            "/api/v1/sessions/t-1",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-1/status",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(json["data"]["status"], "disconnected");

        // Deleting again is a 404.
        let (status, json) = request(
            &h.app,
            "DELETE",
            "/api/v1/sessions/t-1",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn tenant_tokens_are_scoped() {
        let h = harness().await;
        let token = issue_tenant_token(
            &TenantClaims {
                tenant_id: "t-a".into(),
                permissions: vec![],
                token_type: "tenant_access".into(),
                exp: None,
            },
            JWT_SECRET,
        )
        .unwrap();

        let (status, json) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-b/status",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "FORBIDDEN");

        let (status, _) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-a/status",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Admin listing is API-key only.
        let (status, _) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/active",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_tenant_ids_are_rejected() {
        let h = harness().await;
        let (status, json) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/ab/status",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn send_validates_recipient_and_session() {
        let h = harness().await;

        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/messages/t-1/send",
            Some(API_KEY),
            Some(serde_json::json!({"to": "bogus", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "VALIDATION_ERROR");

        // Valid recipient but no session.
        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/messages/t-1/send",
            Some(API_KEY),
            Some(serde_json::json!({"to": "+5511988887777", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn send_delivers_through_a_connected_session() {
        let h = harness().await;
        let conn = h.upstream.script_connection();
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        let _ = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;

        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/messages/t-1/send",
            Some(API_KEY),
            Some(serde_json::json!({"to": "+5511988887777", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {json}");
        assert!(json["data"]["messageId"].as_str().unwrap().starts_with("srv-"));
        assert_eq!(conn.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn bulk_send_is_bounded() {
        let h = harness().await;
        let items: Vec<_> = (0..51)
            .map(|_| serde_json::json!({"to": "+5511988887777", "message": "x"}))
            .collect();
        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/messages/t-1/send-bulk",
            Some(API_KEY),
            Some(serde_json::json!({"messages": items})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn bulk_send_reports_per_item_outcomes() {
        let h = harness().await;
        let conn = h.upstream.script_connection();
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        let _ = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;

        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/messages/t-1/send-bulk",
            Some(API_KEY),
            Some(serde_json::json!({"messages": [
                {"to": "+5511988887777", "message": "a"},
                {"to": "bogus", "message": "b", "delayMs": 0},
                {"to": "+5511988887777", "message": "c", "delayMs": 0}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["summary"]["total"], 3);
        assert_eq!(json["data"]["summary"]["sent"], 2);
        assert_eq!(json["data"]["summary"]["failed"], 1);
        assert_eq!(json["data"]["results"][1]["success"], false);
        assert!(json["data"]["results"][1]["error"]
            .as_str()
            .unwrap()
            .contains("must match"));
        assert_eq!(conn.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn webhook_routes_round_trip() {
        let h = harness().await;
        let (status, json) = request(
            &h.app,
            "POST",
            "/api/v1/webhooks/register/t-1",
            Some(API_KEY),
            Some(serde_json::json!({
                "url": "https://sink.local/wh",
                "secret": "s",
                "events": ["message", "status"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let webhook_id = json["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(json["data"]["active"], true);

        let (_, json) = request(
            &h.app,
            "GET",
            "/api/v1/webhooks/list/t-1",
            Some(API_KEY),
            None,
        )
        .await;
        let listed = &json["data"]["webhooks"][0];
        assert_eq!(listed["id"], webhook_id.as_str());
        // Secrets are never echoed back.
        assert!(listed.get("secret").is_none());
        assert_eq!(listed["hasSecret"], true);

        let (status, _) = request(
            &h.app,
            "DELETE",
            &format!("/api/v1/webhooks/t-1/{webhook_id}"),
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = request(
            &h.app,
            "DELETE",
            &format!("/api/v1/webhooks/t-1/{webhook_id}"),
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn poll_returns_once_pairing_is_reached() {
        let h = harness().await;
        let _conn = script_pairing(&h.upstream).await;
        let _ = request(
            &h.app,
            "POST",
            "/api/v1/sessions/t-1/start",
            Some(API_KEY),
            None,
        )
        .await;

        let (status, json) = request(
            &h.app,
            "GET",
            "/api/v1/sessions/t-1/poll?timeout=5000",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "qr");
    }
}
