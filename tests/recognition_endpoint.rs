//! Integration tests for the recognition endpoint and submission client.
//!
//! The stub endpoint is served on an ephemeral local port with zero
//! artificial latency, and the real submission client is pointed at it, so
//! the full multipart request/response contract is exercised.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use dialect_alert::audio::AudioAsset;
use dialect_alert::recognition::endpoint::{serve, EndpointState};
use dialect_alert::recognition::{submit, Dialect, SubmitError};

/// Spawn the stub endpoint and return its base URL.
async fn spawn_stub() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let state = Arc::new(EndpointState::simulated(Duration::ZERO));
    tokio::spawn(async move {
        let _ = serve(listener, state).await;
    });

    format!("http://{addr}")
}

fn sample_asset() -> AudioAsset {
    // The stub does not decode the payload; any bytes stand in for a capture.
    AudioAsset::new(Uuid::new_v4(), vec![0u8; 128])
}

#[tokio::test]
async fn submit_returns_a_complete_result() {
    let base = spawn_stub().await;
    let url = format!("{base}/dialect-recognition");

    let result = submit(&url, sample_asset()).await.expect("submission");

    assert!(Dialect::ALL.contains(&result.dialect));
    assert!(
        (0.7..1.0).contains(&result.confidence),
        "confidence {} out of [0.7, 1.0)",
        result.confidence
    );
    assert!(!result.transcript.is_empty());

    // Timestamp was assigned at response time and parsed from its wire form
    let age = Utc::now().signed_duration_since(result.timestamp);
    assert!(age.num_seconds().abs() < 10, "timestamp not recent: {}", result.timestamp);
}

#[tokio::test]
async fn missing_audio_field_yields_400_with_error_body() {
    let base = spawn_stub().await;
    let url = format!("{base}/dialect-recognition");

    // Hand-rolled request without the `audio` field
    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "No audio file provided");
}

#[tokio::test]
async fn client_classifies_non_success_status_as_endpoint_error() {
    let base = spawn_stub().await;

    // POST against a GET-only route to provoke a non-2xx response
    let err = submit(&format!("{base}/health"), sample_asset())
        .await
        .expect_err("should fail");

    match err {
        SubmitError::EndpointError { status, .. } => assert_eq!(status, 405),
        other => panic!("expected EndpointError, got: {other:?}"),
    }
}

#[tokio::test]
async fn client_classifies_connection_failure_as_network_error() {
    // Nothing listens on this port; the request dies in transport
    let err = submit("http://127.0.0.1:1/dialect-recognition", sample_asset())
        .await
        .expect_err("should fail");

    assert!(
        matches!(err, SubmitError::NetworkError(_)),
        "expected NetworkError, got: {err:?}"
    );
}

#[tokio::test]
async fn health_route_reports_ok() {
    let base = spawn_stub().await;

    let response = reqwest::get(format!("{base}/health")).await.expect("request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn successive_submissions_each_get_their_own_result() {
    let base = spawn_stub().await;
    let url = format!("{base}/dialect-recognition");

    let first = submit(&url, sample_asset()).await.expect("first");
    let second = submit(&url, sample_asset()).await.expect("second");

    // Timestamps are assigned per response
    assert!(second.timestamp >= first.timestamp);
}
