//! Audio capture module.
//!
//! Handles microphone input capture and in-memory WAV finalization.
//! Uses CPAL for audio capture and hound for WAV encoding.

use std::fmt;

use uuid::Uuid;

pub mod recorder;

pub use recorder::{CaptureError, CaptureHandle, Recorder};

/// A finalized recording: the concatenated capture segments encoded as one
/// WAV byte sequence, ready for upload.
///
/// Exactly one asset exists per completed recording session. It is handed to
/// the recognition submitter and dropped once the response (or failure) is in.
#[derive(Clone)]
pub struct AudioAsset {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Informational upload filename, derived from the session id.
    pub file_name: String,
}

impl AudioAsset {
    pub fn new(session_id: Uuid, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "audio/wav",
            file_name: format!("{session_id}.wav"),
        }
    }
}

impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}
