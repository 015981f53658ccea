//! HTTP API for Postern.
//!
//! Provides an [`ApiServer`] exposing an axum-based API over a
//! [`Daemon`]:
//!
//! Admin routes (HTTP Basic, username `admin`, password = admin token hex):
//!
//! - `PUT /node/{label}` — register or re-register a node
//! - `DELETE /node/{label}` — unregister a node
//! - `GET /node/{label}/version` — current registration version
//! - `POST /node/{label}/version` — conditional version bump
//! - `POST /node/{label}/token` — mint a fresh node token
//! - `DELETE /node/{label}/token` — invalidate the current token
//!
//! User routes (`?token=` query parameter):
//!
//! - `GET /node/{label}/console` — stream the serial console
//! - `POST /node/{label}/power_off`
//! - `POST /node/{label}/power_cycle` — body `{"force": bool}`
//! - `PUT /node/{label}/boot_device` — body `{"bootdev": "..."}`
//! - `GET /node/{label}/power_status`
//!
//! ## Authentication
//!
//! Admin credentials are checked in middleware with a constant-time token
//! comparison; any failure produces the same 404 an unknown route would,
//! masking which nodes exist. Node tokens are validated by the daemon
//! under its lock, also constant-time.

mod auth;
mod error;
mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use postern_core::Daemon;
use postern_types::Token;

pub use error::ApiError;

/// Shared application state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub daemon: Arc<Daemon>,
    pub admin_token: Token,
}

/// Middleware for admin routes: requests that do not carry the admin
/// credentials get a 404 indistinguishable from an unknown route.
async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !auth::check_admin(&request, &state.admin_token) {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Configuration for creating an [`ApiServer`].
pub struct ApiServerConfig {
    /// The daemon to serve.
    pub daemon: Arc<Daemon>,
    /// The master credential for admin routes.
    pub admin_token: Token,
}

/// HTTP server over a [`Daemon`].
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Create a new API server with the given configuration.
    pub fn new(config: ApiServerConfig) -> Self {
        let state = AppState {
            daemon: config.daemon,
            admin_token: config.admin_token,
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the axum [`Router`] for the API.
    fn build_router(state: AppState) -> Router {
        let admin_routes = Router::new()
            .route(
                "/node/{label}",
                put(handlers::set_node).delete(handlers::delete_node),
            )
            .route(
                "/node/{label}/version",
                get(handlers::get_version).post(handlers::set_version),
            )
            .route(
                "/node/{label}/token",
                post(handlers::mint_token).delete(handlers::invalidate_token),
            )
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_auth_middleware,
            ));

        let user_routes = Router::new()
            .route("/node/{label}/console", get(handlers::console))
            .route("/node/{label}/power_off", post(handlers::power_off))
            .route("/node/{label}/power_cycle", post(handlers::power_cycle))
            .route("/node/{label}/boot_device", put(handlers::boot_device))
            .route("/node/{label}/power_status", get(handlers::power_status));

        Router::new()
            .merge(admin_routes)
            .merge(user_routes)
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with
    /// `tower::ServiceExt`, and for the binary to mount on its listener).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the API on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "API listening");
        axum::serve(listener, self.router).await
    }

    /// Serve the API with graceful shutdown triggered by the given future.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "API listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
