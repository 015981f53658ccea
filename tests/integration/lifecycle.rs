//! Integration test: full operator workflow against one gateway.
//!
//! Register → mint → stream console → control power → revoke → re-mint,
//! exercising the admin and user surfaces together.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use postern_driver::{PowerAction, last_power_action};
use postern_integration_tests::{TestGateway, body_json};

/// Read body frames until the buffer contains at least one newline.
async fn read_line(body: &mut Body, buf: &mut Vec<u8>) {
    while !buf.contains(&b'\n') {
        let frame = body
            .frame()
            .await
            .expect("console stream ended early")
            .unwrap();
        if let Ok(data) = frame.into_data() {
            buf.extend_from_slice(&data);
        }
    }
}

#[tokio::test]
async fn test_operator_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = TestGateway::open(&dir.path().join("nodes.db"));

    // Register and take a token.
    gateway.register_mock("rack1-07", "lifecycle-addr").await;
    assert_eq!(gateway.version("rack1-07").await, 1);
    let token = gateway.mint("rack1-07").await;

    // Stream a bit of console output.
    let request = Request::builder()
        .uri(format!("/node/rack1-07/console?token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = gateway.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    let mut transcript = Vec::new();
    read_line(&mut body, &mut transcript).await;
    assert!(transcript.starts_with(b"0"));

    // Power control with the same token.
    let request = Request::builder()
        .method("POST")
        .uri(format!("/node/rack1-07/power_cycle?token={token}"))
        .body(Body::from(r#"{"force": false}"#))
        .unwrap();
    assert_eq!(gateway.send(request).await.status(), StatusCode::OK);
    assert_eq!(
        last_power_action("lifecycle-addr"),
        Some(PowerAction::SoftReboot)
    );

    let request = Request::builder()
        .uri(format!("/node/rack1-07/power_status?token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = gateway.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["power_status"], "Mock Status");

    // Revoke: the console stream ends and the token stops working.
    let response = gateway.admin("DELETE", "/node/rack1-07/token", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    body.collect().await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/node/rack1-07/power_off?token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        gateway.send(request).await.status(),
        StatusCode::UNAUTHORIZED
    );

    // A fresh token restores access.
    let token = gateway.mint("rack1-07").await;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/node/rack1-07/power_off?token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(gateway.send(request).await.status(), StatusCode::OK);
    assert_eq!(last_power_action("lifecycle-addr"), Some(PowerAction::Off));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_deleting_node_ends_console() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = TestGateway::open(&dir.path().join("nodes.db"));

    gateway.register_mock("ephemeral", "lifecycle-del").await;
    let token = gateway.mint("ephemeral").await;

    let request = Request::builder()
        .uri(format!("/node/ephemeral/console?token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = gateway.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    let mut transcript = Vec::new();
    read_line(&mut body, &mut transcript).await;

    let response = gateway.admin("DELETE", "/node/ephemeral", "").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Node deletion drains the coordinator; the stream terminates.
    body.collect().await.unwrap();

    let request = Request::builder()
        .uri(format!("/node/ephemeral/console?token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(gateway.send(request).await.status(), StatusCode::NOT_FOUND);

    gateway.shutdown().await;
}
