//! API request handlers.
//!
//! Admin handlers assume the auth middleware has already vetted the
//! request. User handlers take the node token from the `?token=` query
//! parameter; a token that does not even parse is treated the same as a
//! wrong one (401), without touching any state.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use postern_types::Token;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

/// Response body for successful token mints.
#[derive(Serialize)]
pub(crate) struct TokenResp {
    token: Token,
}

/// Request and response body for version operations.
#[derive(Serialize, Deserialize)]
pub(crate) struct VersionBody {
    version: u64,
}

/// Request body for power cycle.
#[derive(Deserialize)]
pub(crate) struct PowerCycleArgs {
    force: bool,
}

/// Request body for set bootdev.
#[derive(Deserialize)]
pub(crate) struct SetBootdevArgs {
    bootdev: String,
}

/// Response body for power status requests.
#[derive(Serialize)]
pub(crate) struct PowerStatusResp {
    power_status: String,
}

/// Query parameter carrying the node token.
#[derive(Deserialize)]
pub(crate) struct TokenQuery {
    #[serde(default)]
    token: String,
}

impl TokenQuery {
    /// Parse the token, mapping any failure (including absence) to the
    /// invalid-token error.
    fn token(&self) -> Result<Token, ApiError> {
        Ok(self
            .token
            .parse::<Token>()
            .map_err(postern_core::DaemonError::from)?)
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedRequest(e.to_string()))
}

// -----------------------------------------------------------------------
// Admin: node registration
// -----------------------------------------------------------------------

/// `PUT /node/{label}` — register a node, or re-register an existing one
/// (which bumps its version and invalidates outstanding tokens).
pub(crate) async fn set_node(
    State(state): State<AppState>,
    Path(label): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.daemon.set_node(&label, &body).await?;
    info!(%label, "node registered");
    Ok(StatusCode::OK)
}

/// `DELETE /node/{label}` — unregister a node.
pub(crate) async fn delete_node(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.daemon.delete_node(&label).await?;
    info!(%label, "node deleted");
    Ok(StatusCode::OK)
}

// -----------------------------------------------------------------------
// Admin: versions
// -----------------------------------------------------------------------

/// `GET /node/{label}/version` — the node's current version.
pub(crate) async fn get_version(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<Json<VersionBody>, ApiError> {
    let version = state.daemon.get_node_version(&label).await?;
    Ok(Json(VersionBody { version }))
}

/// `POST /node/{label}/version` — conditional bump: the body carries the
/// expected next version; 409 with the current version on conflict.
pub(crate) async fn set_version(
    State(state): State<AppState>,
    Path(label): Path<String>,
    body: Bytes,
) -> Result<Json<VersionBody>, ApiError> {
    let args: VersionBody = decode_body(&body)?;
    let version = state.daemon.set_node_version(&label, args.version).await?;
    Ok(Json(VersionBody { version }))
}

// -----------------------------------------------------------------------
// Admin: tokens
// -----------------------------------------------------------------------

/// `POST /node/{label}/token` — mint a fresh token, invalidating any
/// previous one. The token is returned exactly once.
pub(crate) async fn mint_token(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<Json<TokenResp>, ApiError> {
    let version = state.daemon.get_node_version(&label).await?;
    let (token, _) = state.daemon.mint_token(&label, version).await?;
    info!(%label, "token minted");
    Ok(Json(TokenResp { token }))
}

/// `DELETE /node/{label}/token` — invalidate the current token and drop
/// any console using it.
pub(crate) async fn invalidate_token(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.daemon.invalidate_token(&label).await?;
    info!(%label, "token invalidated");
    Ok(StatusCode::OK)
}

// -----------------------------------------------------------------------
// User: console
// -----------------------------------------------------------------------

/// `GET /node/{label}/console` — stream the serial console.
///
/// The daemon lock is released once the dial returns; each chunk read from
/// the console is sent (and flushed) as its own body frame, so clients see
/// output promptly. Token invalidation tears down the coordinator's
/// session, which ends this stream.
pub(crate) async fn console(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiError> {
    let token = query.token()?;
    let console = state.daemon.dial_console(&label, &token).await?;
    info!(%label, "console attached");

    let body = Body::from_stream(ReaderStream::new(console));
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(body)
        .expect("static response parts are valid"))
}

// -----------------------------------------------------------------------
// User: power control
// -----------------------------------------------------------------------

/// `POST /node/{label}/power_off`.
pub(crate) async fn power_off(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, ApiError> {
    let token = query.token()?;
    state.daemon.power_off(&label, &token).await?;
    Ok(StatusCode::OK)
}

/// `POST /node/{label}/power_cycle` with body `{"force": bool}`.
pub(crate) async fn power_cycle(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = query.token()?;
    let args: PowerCycleArgs = decode_body(&body)?;
    state.daemon.power_cycle(&label, args.force, &token).await?;
    Ok(StatusCode::OK)
}

/// `PUT /node/{label}/boot_device` with body `{"bootdev": "..."}`.
pub(crate) async fn boot_device(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = query.token()?;
    let args: SetBootdevArgs = decode_body(&body)?;
    state.daemon.set_bootdev(&label, &args.bootdev, &token).await?;
    Ok(StatusCode::OK)
}

/// `GET /node/{label}/power_status`.
pub(crate) async fn power_status(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<PowerStatusResp>, ApiError> {
    let token = query.token()?;
    let power_status = state.daemon.get_power_status(&label, &token).await?;
    Ok(Json(PowerStatusResp { power_status }))
}
