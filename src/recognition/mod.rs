//! Recognition domain types and the two sides of the recognition exchange.
//!
//! `client` submits finalized audio assets to the recognition endpoint;
//! `endpoint` hosts the placeholder endpoint itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod endpoint;

pub use client::{submit, SubmitError};

/// Closed set of dialect labels the recognition endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Mandarin,
    Cantonese,
    Shanghainese,
    Sichuanese,
    Hokkien,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Mandarin,
        Dialect::Cantonese,
        Dialect::Shanghainese,
        Dialect::Sichuanese,
        Dialect::Hokkien,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Mandarin => "Mandarin",
            Dialect::Cantonese => "Cantonese",
            Dialect::Shanghainese => "Shanghainese",
            Dialect::Sichuanese => "Sichuanese",
            Dialect::Hokkien => "Hokkien",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classification produced by the recognition endpoint.
///
/// Immutable once created; after a successful submission it is owned by the
/// result history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub dialect: Dialect,
    /// In [0.0, 1.0]. The stub endpoint only emits values in [0.7, 1.0).
    pub confidence: f64,
    pub transcript: String,
    /// Assigned by the endpoint at response time; ISO-8601 on the wire.
    pub timestamp: DateTime<Utc>,
}

impl RecognitionResult {
    /// Summary line shown to the user when a result arrives, e.g.
    /// `Detected Mandarin with 93.4% confidence`.
    pub fn summary(&self) -> String {
        format!(
            "Detected {} with {:.1}% confidence",
            self.dialect,
            self.confidence * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_wire_form_is_the_plain_name() {
        for dialect in Dialect::ALL {
            let json = serde_json::to_string(&dialect).unwrap();
            assert_eq!(json, format!("\"{}\"", dialect.name()));
        }
    }

    #[test]
    fn result_serializes_all_four_fields() {
        let result = RecognitionResult {
            dialect: Dialect::Hokkien,
            confidence: 0.82,
            transcript: "sample".to_string(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();
        for key in ["dialect", "confidence", "transcript", "timestamp"] {
            assert!(object.contains_key(key), "missing field {key}");
        }
        assert_eq!(object["dialect"], "Hokkien");
    }

    #[test]
    fn summary_formats_confidence_as_percent() {
        let result = RecognitionResult {
            dialect: Dialect::Mandarin,
            confidence: 0.934,
            transcript: String::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(result.summary(), "Detected Mandarin with 93.4% confidence");
    }
}
