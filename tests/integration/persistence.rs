//! Integration test: registrations survive daemon restarts.
//!
//! A node registered with one gateway instance must be usable — version
//! intact, tokens mintable — from a fresh instance opened on the same
//! database file.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use postern_integration_tests::TestGateway;
use postern_types::Token;

#[tokio::test]
async fn test_node_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nodes.db");

    let gateway = TestGateway::open(&db_path);
    gateway.register_mock("n1", "persist-restart").await;
    gateway.shutdown().await;

    // A new instance on the same DB can mint a token for n1 right away.
    let gateway = TestGateway::open(&db_path);
    let token = gateway.mint("n1").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/node/n1/power_off?token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(gateway.send(request).await.status(), StatusCode::OK);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_version_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nodes.db");
    let admin = Token::random();

    let gateway = TestGateway::open_with_admin(&db_path, admin);
    gateway.register_mock("n1", "persist-version").await;
    gateway.register_mock("n1", "persist-version").await; // version 2
    let response = gateway
        .admin("POST", "/node/n1/version", r#"{"version": 3}"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    gateway.shutdown().await;

    let gateway = TestGateway::open_with_admin(&db_path, admin);
    assert_eq!(gateway.version("n1").await, 3);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_tokens_do_not_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nodes.db");

    let gateway = TestGateway::open(&db_path);
    gateway.register_mock("n1", "persist-token").await;
    let token = gateway.mint("n1").await;
    gateway.shutdown().await;

    // Tokens are in-memory only; the old one is useless after a restart.
    let gateway = TestGateway::open(&db_path);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/node/n1/power_off?token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        gateway.send(request).await.status(),
        StatusCode::UNAUTHORIZED
    );
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_deleted_node_stays_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nodes.db");

    let gateway = TestGateway::open(&db_path);
    gateway.register_mock("n1", "persist-delete").await;
    let response = gateway.admin("DELETE", "/node/n1", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    gateway.shutdown().await;

    let gateway = TestGateway::open(&db_path);
    let response = gateway.admin("GET", "/node/n1/version", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    gateway.shutdown().await;
}
