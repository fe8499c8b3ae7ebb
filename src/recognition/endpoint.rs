//! Placeholder recognition endpoint.
//!
//! Serves `POST /dialect-recognition`: accepts a multipart upload with an
//! `audio` file field and answers with a simulated classification after an
//! artificial delay. Classification sits behind the `Classifier` trait so a
//! real speech-classification backend can be dropped in without touching the
//! submission side.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::recognition::{Dialect, RecognitionResult};

const SAMPLE_TRANSCRIPT: &str = "This is a sample transcript from the audio recording. \
In a real implementation, this would contain the actual speech-to-text conversion.";

/// Produces a recognition result for an uploaded audio payload.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, audio: &[u8]) -> RecognitionResult;
}

/// Stand-in classifier: a random dialect from the closed set with a
/// confidence in [0.7, 1.0) and a canned transcript.
pub struct SimulatedClassifier;

impl Classifier for SimulatedClassifier {
    fn classify(&self, _audio: &[u8]) -> RecognitionResult {
        let mut rng = rand::thread_rng();
        let dialect = Dialect::ALL
            .choose(&mut rng)
            .copied()
            .unwrap_or(Dialect::Mandarin);

        RecognitionResult {
            dialect,
            confidence: rng.gen_range(0.7..1.0),
            transcript: SAMPLE_TRANSCRIPT.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Shared endpoint state: the classifier and the artificial response delay.
pub struct EndpointState {
    classifier: Arc<dyn Classifier>,
    latency: Duration,
}

impl EndpointState {
    pub fn new(classifier: Arc<dyn Classifier>, latency: Duration) -> Self {
        Self { classifier, latency }
    }

    /// The default stub configuration.
    pub fn simulated(latency: Duration) -> Self {
        Self::new(Arc::new(SimulatedClassifier), latency)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

pub fn router(state: Arc<EndpointState>) -> Router {
    Router::new()
        .route("/dialect-recognition", post(recognize))
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "ok"})) }),
        )
        .with_state(state)
}

/// Serve the endpoint on an already-bound listener. Binding is left to the
/// caller so tests can use an ephemeral port.
pub async fn serve(listener: TcpListener, state: Arc<EndpointState>) -> std::io::Result<()> {
    axum::serve(listener, router(state).into_make_service()).await
}

async fn recognize(
    State(state): State<Arc<EndpointState>>,
    mut multipart: Multipart,
) -> Response {
    match take_audio_field(&mut multipart).await {
        Ok(Some((file_name, bytes))) => {
            log::info!("Processing audio file: {}, size: {} bytes", file_name, bytes.len());

            // Artificial delay standing in for a real classification round-trip.
            tokio::time::sleep(state.latency).await;

            let result = state.classifier.classify(&bytes);
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "No audio file provided",
            }),
        )
            .into_response(),
        Err(err) => {
            log::error!("Dialect recognition error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Failed to process audio for dialect recognition",
                }),
            )
                .into_response()
        }
    }
}

/// Pull the `audio` file field out of the form, if present.
async fn take_audio_field(
    multipart: &mut Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("audio") {
            let file_name = field.file_name().unwrap_or("upload.bin").to_string();
            let bytes = field.bytes().await?.to_vec();
            return Ok(Some((file_name, bytes)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_confidence_stays_in_bounds() {
        let classifier = SimulatedClassifier;
        for _ in 0..256 {
            let result = classifier.classify(&[]);
            assert!(
                (0.7..1.0).contains(&result.confidence),
                "confidence {} out of [0.7, 1.0)",
                result.confidence
            );
        }
    }

    #[test]
    fn simulated_dialect_comes_from_the_closed_set() {
        let classifier = SimulatedClassifier;
        for _ in 0..64 {
            let result = classifier.classify(&[]);
            assert!(Dialect::ALL.contains(&result.dialect));
        }
    }

    #[test]
    fn simulated_transcript_and_timestamp_are_populated() {
        let result = SimulatedClassifier.classify(b"riff");
        assert!(!result.transcript.is_empty());
        let age = Utc::now().signed_duration_since(result.timestamp);
        assert!(age.num_seconds().abs() < 5);
    }
}
