//! Recognition submission client.
//!
//! Packages a finalized audio asset into a multipart upload and posts it to
//! the recognition endpoint. At most one request is issued per asset; there
//! are no retries.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::audio::AudioAsset;
use crate::recognition::{Dialect, RecognitionResult};

/// Global HTTP client for reuse across requests (avoids TLS handshake overhead)
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Errors that can occur during submission
#[derive(Debug)]
pub enum SubmitError {
    /// Network/transport failure before a response arrived
    NetworkError(String),
    /// The endpoint returned a non-success status
    EndpointError { status: u16, message: String },
    /// Failed to build the request or parse the response
    ParseError(String),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::NetworkError(e) => write!(f, "Network error: {}", e),
            SubmitError::EndpointError { status, message } => {
                write!(f, "Recognition endpoint error ({}): {}", status, message)
            }
            SubmitError::ParseError(e) => write!(f, "Failed to parse endpoint response: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Success body as it appears on the wire: the timestamp is still a string.
#[derive(Debug, Deserialize)]
struct WireResult {
    dialect: Dialect,
    confidence: f64,
    transcript: String,
    timestamp: String,
}

/// Error body under non-2xx status
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
}

/// Submit a finalized audio asset to the recognition endpoint.
///
/// `endpoint_url` is the full URL of the recognition route. The asset is
/// consumed: whether the request succeeds or fails, the audio buffer is
/// released when this function returns.
pub async fn submit(
    endpoint_url: &str,
    asset: AudioAsset,
) -> Result<RecognitionResult, SubmitError> {
    log::info!(
        "Submitting audio asset: {} ({} bytes)",
        asset.file_name,
        asset.bytes.len()
    );

    let part = Part::bytes(asset.bytes)
        .file_name(asset.file_name)
        .mime_str(asset.content_type)
        .map_err(|e| SubmitError::ParseError(e.to_string()))?;

    let form = Form::new().part("audio", part);

    let response = http_client()
        .post(endpoint_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| SubmitError::NetworkError(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let wire: WireResult = response
            .json()
            .await
            .map_err(|e| SubmitError::ParseError(e.to_string()))?;

        let timestamp = DateTime::parse_from_rfc3339(&wire.timestamp)
            .map_err(|e| SubmitError::ParseError(format!("bad timestamp '{}': {}", wire.timestamp, e)))?
            .with_timezone(&Utc);

        let result = RecognitionResult {
            dialect: wire.dialect,
            confidence: wire.confidence,
            transcript: wire.transcript,
            timestamp,
        };
        log::info!("Submission succeeded: {}", result.summary());
        Ok(result)
    } else {
        let error_text = response.text().await.unwrap_or_default();

        let message = if let Ok(body) = serde_json::from_str::<WireError>(&error_text) {
            body.error
        } else {
            error_text
        };

        log::error!("Recognition endpoint error ({}): {}", status.as_u16(), message);

        Err(SubmitError::EndpointError {
            status: status.as_u16(),
            message,
        })
    }
}
