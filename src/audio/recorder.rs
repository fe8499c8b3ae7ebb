//! Microphone recorder built on CPAL.
//!
//! The `Recorder` captures audio from the default input device. Each capture
//! session runs on a dedicated thread that owns the CPAL stream (streams are
//! not `Send`), buffers incoming sample segments, and on finalization
//! concatenates them into a single in-memory WAV `AudioAsset`.

use std::sync::mpsc::{self, sync_channel, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use hound::{WavSpec, WavWriter};
use uuid::Uuid;

use super::AudioAsset;

/// How long to wait for the capture thread to come up or wind down.
const THREAD_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while capturing audio.
#[derive(Debug, Clone)]
pub enum CaptureError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    EncodeFailed(String),
    ThreadFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInputDevice => write!(f, "No audio input device found"),
            CaptureError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            CaptureError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            CaptureError::EncodeFailed(e) => write!(f, "Failed to encode audio data: {}", e),
            CaptureError::ThreadFailed(e) => write!(f, "Capture thread failure: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

enum CaptureCommand {
    Finalize {
        reply: SyncSender<Result<AudioAsset, CaptureError>>,
    },
    Discard,
}

/// Handle to an active capture session.
///
/// The underlying CPAL stream lives on the capture thread. `finalize()`
/// stops the device and returns the encoded asset. Dropping the handle
/// without finalizing disconnects the command channel, which makes the
/// capture thread drop the stream and release the device as well; there is
/// no exit path that keeps the microphone open.
pub struct CaptureHandle {
    session_id: Uuid,
    commands: Sender<CaptureCommand>,
}

impl CaptureHandle {
    /// Stop capturing and concatenate the buffered segments into one asset.
    pub fn finalize(self) -> Result<AudioAsset, CaptureError> {
        let (reply_tx, reply_rx) = sync_channel(1);
        self.commands
            .send(CaptureCommand::Finalize { reply: reply_tx })
            .map_err(|_| CaptureError::ThreadFailed("capture thread is gone".to_string()))?;

        match reply_rx.recv_timeout(THREAD_REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(_) => Err(CaptureError::ThreadFailed(
                "capture thread did not respond".to_string(),
            )),
        }
    }

    /// Stop capturing and throw the buffered audio away.
    pub fn discard(self) {
        let _ = self.commands.send(CaptureCommand::Discard);
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

/// Microphone recorder bound to the default input device.
pub struct Recorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl Recorder {
    /// Probe the default input device and its default configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| CaptureError::NoSupportedConfig)?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Start a capture session. Blocks briefly until the capture thread has
    /// opened the stream, so a device failure is reported here rather than
    /// after the caller believes recording has begun.
    pub fn start(&self, session_id: Uuid) -> Result<CaptureHandle, CaptureError> {
        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = sync_channel(1);

        std::thread::Builder::new()
            .name(format!("capture-{session_id}"))
            .spawn(move || {
                capture_thread(device, config, sample_format, session_id, command_rx, ready_tx);
            })
            .map_err(|e| CaptureError::ThreadFailed(e.to_string()))?;

        match ready_rx.recv_timeout(THREAD_REPLY_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("Capture started for session {}", session_id);
                Ok(CaptureHandle {
                    session_id,
                    commands: command_tx,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::ThreadFailed(
                "capture thread did not report readiness".to_string(),
            )),
        }
    }
}

/// Owns the CPAL stream for one session. Exits (and thereby releases the
/// device) on finalize, discard, or handle drop.
fn capture_thread(
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    session_id: Uuid,
    commands: Receiver<CaptureCommand>,
    ready: SyncSender<Result<(), CaptureError>>,
) {
    let segments: Arc<Mutex<Vec<Vec<i16>>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match build_stream(&device, &config, sample_format, segments.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(CaptureError::StreamCreationFailed(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }

    let _ = ready.send(Ok(()));

    match commands.recv() {
        Ok(CaptureCommand::Finalize { reply }) => {
            // Dropping the stream stops the callback before the buffer is
            // drained, so the segment list is complete and stable here.
            drop(stream);
            let segments = match segments.lock() {
                Ok(mut guard) => std::mem::take(&mut *guard),
                Err(_) => {
                    let _ = reply.send(Err(CaptureError::ThreadFailed(
                        "segment buffer poisoned".to_string(),
                    )));
                    return;
                }
            };
            let _ = reply.send(encode_asset(session_id, &config, &segments));
        }
        Ok(CaptureCommand::Discard) | Err(_) => {
            drop(stream);
            log::debug!("Capture for session {} discarded", session_id);
        }
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    segments: Arc<Mutex<Vec<Vec<i16>>>>,
) -> Result<Stream, CaptureError> {
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, segments, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, segments, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, segments, err_fn),
        _ => Err(CaptureError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    segments: Arc<Mutex<Vec<Vec<i16>>>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // One callback delivery = one buffered segment.
                let segment: Vec<i16> = data.iter().map(|&sample| sample_to_i16(sample)).collect();
                if let Ok(mut guard) = segments.lock() {
                    guard.push(segment);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Concatenate the buffered segments into a single WAV-encoded asset.
fn encode_asset(
    session_id: Uuid,
    config: &StreamConfig,
    segments: &[Vec<i16>],
) -> Result<AudioAsset, CaptureError> {
    let spec = WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate.0,
        bits_per_sample: 16, // Always write as 16-bit
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;
        for segment in segments {
            for &sample in segment {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;
            }
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;
    }

    let asset = AudioAsset::new(session_id, cursor.into_inner());
    log::info!(
        "Capture finalized for session {}: {} segments, {} bytes",
        session_id,
        segments.len(),
        asset.bytes.len()
    );
    Ok(asset)
}

/// Convert any sample type to i16 for WAV encoding.
fn sample_to_i16<T>(sample: T) -> i16
where
    T: Sample,
    f32: FromSample<T>,
{
    let f32_sample = f32::from_sample(sample);
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StreamConfig {
        StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(16_000),
            buffer_size: cpal::BufferSize::Default,
        }
    }

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Clamping
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn encode_concatenates_segments_into_one_wav() {
        let session_id = Uuid::new_v4();
        let segments = vec![vec![0i16, 100, -100], vec![200, -200]];

        let asset = encode_asset(session_id, &test_config(), &segments).unwrap();
        assert_eq!(asset.content_type, "audio/wav");
        assert!(asset.file_name.contains(&session_id.to_string()));

        let mut reader = hound::WavReader::new(std::io::Cursor::new(asset.bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 100, -100, 200, -200]);
    }

    #[test]
    fn encode_of_empty_capture_yields_valid_empty_wav() {
        let asset = encode_asset(Uuid::new_v4(), &test_config(), &[]).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(asset.bytes)).unwrap();
        assert_eq!(reader.len(), 0);
    }
}
