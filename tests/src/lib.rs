//! Shared test harness for Postern integration tests.
//!
//! Provides [`TestGateway`] — a full daemon (store + state + daemon +
//! router) over a caller-supplied database path, so tests can stop one
//! instance and start another on the same file to exercise persistence.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt;
use postern_core::{Daemon, State};
use postern_driver::Registry;
use postern_http::{ApiServer, ApiServerConfig};
use postern_store::NodeStore;
use postern_types::Token;
use tower::ServiceExt;

/// A complete gateway instance over a database path.
pub struct TestGateway {
    router: Router,
    daemon: Arc<Daemon>,
    admin_token: Token,
}

impl TestGateway {
    /// Open a gateway over `db_path` with a fresh admin token.
    pub fn open(db_path: &Path) -> Self {
        Self::open_with_admin(db_path, Token::random())
    }

    /// Open a gateway over `db_path` with a caller-chosen admin token
    /// (restarted instances keep the same configured credential).
    pub fn open_with_admin(db_path: &Path, admin_token: Token) -> Self {
        let store = Arc::new(NodeStore::open(db_path).expect("open store"));
        let state = State::new(store, Arc::new(Registry::standard())).expect("load state");
        let daemon = Arc::new(Daemon::new(state));
        let server = ApiServer::new(ApiServerConfig {
            daemon: daemon.clone(),
            admin_token,
        });
        Self {
            router: server.into_router(),
            daemon,
            admin_token,
        }
    }

    /// Stop the gateway, draining every node's coordinator — what the
    /// binary does on SIGTERM.
    pub async fn shutdown(self) {
        self.daemon.close().await;
    }

    /// Issue a request against the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("request")
    }

    /// Issue an admin request with the gateway's credentials.
    pub async fn admin(&self, method: &str, uri: &str, body: &str) -> Response<Body> {
        let auth = format!(
            "Basic {}",
            BASE64.encode(format!("admin:{}", self.admin_token.to_hex()))
        );
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .body(Body::from(body.to_owned()))
            .expect("request");
        self.send(request).await
    }

    /// Register a mock-driver node.
    pub async fn register_mock(&self, label: &str, addr: &str) {
        let body = format!("{{\"type\": \"mock\", \"info\": {{\"addr\": \"{addr}\"}}}}");
        let response = self.admin("PUT", &format!("/node/{label}"), &body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Mint a token for `label`, returning its hex form.
    pub async fn mint(&self, label: &str) -> String {
        let response = self.admin("POST", &format!("/node/{label}/token"), "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        json["token"].as_str().expect("token field").to_owned()
    }

    /// The node's current version, per the admin API.
    pub async fn version(&self, label: &str) -> u64 {
        let response = self
            .admin("GET", &format!("/node/{label}/version"), "")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["version"]
            .as_u64()
            .expect("version")
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
