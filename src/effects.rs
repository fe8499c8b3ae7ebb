//! Effect runner for the recognition session loop.
//!
//! Executes the effects produced by the state machine: real microphone
//! capture, submission to the recognition endpoint, history/notification
//! bookkeeping. Completion events are fed back to the state loop over the
//! event channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::audio::{AudioAsset, CaptureHandle, Recorder};
use crate::auth::AuthService;
use crate::history::ResultHistory;
use crate::notify::{NotificationCenter, NotificationKind};
use crate::recognition;
use crate::session::{Effect, Event, NoticeLevel};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Real effect runner: CPAL capture, HTTP submission, history and
/// notification bookkeeping.
pub struct SessionEffectRunner {
    recorder: Arc<Mutex<Option<Recorder>>>,
    active_captures: Arc<Mutex<HashMap<Uuid, CaptureHandle>>>,
    endpoint_url: String,
    history: Arc<Mutex<ResultHistory>>,
    notifier: Arc<NotificationCenter>,
    auth: Arc<AuthService>,
}

impl SessionEffectRunner {
    /// Create a new runner. Returns Ok even if the audio device isn't
    /// available - errors happen at record time.
    pub fn new(
        endpoint_url: String,
        history: Arc<Mutex<ResultHistory>>,
        notifier: Arc<NotificationCenter>,
        auth: Arc<AuthService>,
    ) -> Arc<Self> {
        // Try to create the recorder now, but don't fail if we can't
        let recorder = match Recorder::new() {
            Ok(r) => {
                log::info!("Recorder initialized successfully");
                Some(r)
            }
            Err(e) => {
                log::warn!("Recorder init failed (will retry on record): {}", e);
                None
            }
        };

        Arc::new(Self {
            recorder: Arc::new(Mutex::new(recorder)),
            active_captures: Arc::new(Mutex::new(HashMap::new())),
            endpoint_url,
            history,
            notifier,
            auth,
        })
    }

    /// Release any capture still running. Called at teardown so the
    /// microphone never outlives the session loop.
    pub async fn shutdown(&self) {
        let mut active = self.active_captures.lock().await;
        for (id, handle) in active.drain() {
            log::info!("Discarding active capture {} at shutdown", id);
            handle.discard();
        }
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        println!("{message}");
        match level {
            NoticeLevel::Info => log::info!("{}", message),
            NoticeLevel::Error => {
                log::error!("{}", message);
                if let Some(user) = self.auth.current_user() {
                    self.notifier.push(
                        user.id,
                        NotificationKind::System,
                        "Something went wrong",
                        message,
                    );
                }
            }
        }
    }
}

impl EffectRunner for SessionEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => {
                let recorder = self.recorder.clone();
                let active = self.active_captures.clone();

                tokio::spawn(async move {
                    // Get or create the recorder, then start capturing, all
                    // while holding the lock; the result is handled after the
                    // guard is dropped so no await happens under the mutex.
                    let start_result = {
                        let mut recorder_guard = recorder.lock().await;
                        if recorder_guard.is_none() {
                            match Recorder::new() {
                                Ok(r) => {
                                    *recorder_guard = Some(r);
                                    Ok(())
                                }
                                Err(e) => {
                                    log::error!("Failed to initialize audio recorder: {}", e);
                                    Err(e.to_string())
                                }
                            }
                        } else {
                            Ok(())
                        }
                        .and_then(|_| match recorder_guard.as_ref() {
                            Some(rec) => rec.start(id).map_err(|e| e.to_string()),
                            None => Err("Audio recorder unavailable".to_string()),
                        })
                    };

                    match start_result {
                        Ok(handle) => {
                            let mut active_guard = active.lock().await;
                            active_guard.insert(id, handle);
                            drop(active_guard);

                            let _ = tx.send(Event::CaptureStarted { id }).await;
                        }
                        Err(err) => {
                            log::error!("Failed to start capture: {}", err);
                            let _ = tx.send(Event::CaptureStartFailed { id, err }).await;
                        }
                    }
                });
            }

            Effect::FinalizeCapture { id } => {
                let active = self.active_captures.clone();

                tokio::spawn(async move {
                    let handle = { active.lock().await.remove(&id) };

                    let Some(handle) = handle else {
                        log::warn!("FinalizeCapture: no active capture for id={}", id);
                        let _ = tx
                            .send(Event::CaptureFailed {
                                id,
                                err: "No active capture to finalize".to_string(),
                            })
                            .await;
                        return;
                    };

                    // finalize() blocks on the capture thread handshake
                    let finalized = tokio::task::spawn_blocking(move || handle.finalize()).await;

                    match finalized {
                        Ok(Ok(asset)) => {
                            let _ = tx.send(Event::CaptureFinalized { id, asset }).await;
                        }
                        Ok(Err(e)) => {
                            log::error!("Failed to finalize capture: {}", e);
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                        Err(e) => {
                            log::error!("Finalize task failed: {}", e);
                            let _ = tx
                                .send(Event::CaptureFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::DiscardCapture { id } => {
                let active = self.active_captures.clone();
                tokio::spawn(async move {
                    if let Some(handle) = active.lock().await.remove(&id) {
                        handle.discard();
                        log::info!("Capture {} discarded", id);
                    }
                });
            }

            Effect::Submit { id, asset } => {
                let endpoint_url = self.endpoint_url.clone();

                tokio::spawn(async move {
                    match recognition::submit(&endpoint_url, asset).await {
                        Ok(result) => {
                            let _ = tx.send(Event::SubmitSucceeded { id, result }).await;
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Event::SubmitFailed {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::RecordResult { result } => {
                let history = self.history.clone();
                let notifier = self.notifier.clone();
                let auth = self.auth.clone();

                tokio::spawn(async move {
                    let summary = result.summary();
                    println!("{summary}");
                    println!("  \"{}\"", result.transcript);
                    log::info!("{}", summary);

                    if let Some(user) = auth.current_user() {
                        notifier.push(user.id, NotificationKind::Dialect, "Dialect detected", &summary);
                    }

                    history.lock().await.append(result);
                });
            }

            Effect::Notify { level, message } => {
                self.notice(level, &message);
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active_captures.clone();
                tokio::spawn(async move {
                    // Send tick events every second while the capture is active
                    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
                    loop {
                        interval.tick().await;
                        let is_active = {
                            let guard = active.lock().await;
                            guard.contains_key(&id)
                        };
                        if !is_active {
                            log::debug!("Recording tick stopping - capture {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            log::debug!("Recording tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::EmitStatus => {
                // Handled in the main loop, not here
                unreachable!("EmitStatus should be handled in run_state_loop");
            }
        }
    }
}

/// Stub effect runner for exercising the state loop without a device or an
/// endpoint.
pub struct StubEffectRunner {
    history: Arc<Mutex<ResultHistory>>,
}

impl StubEffectRunner {
    pub fn new(history: Arc<Mutex<ResultHistory>>) -> Arc<Self> {
        Arc::new(Self { history })
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => {
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    log::info!("Stub: capture started");
                    let _ = tx.send(Event::CaptureStarted { id }).await;
                });
            }

            Effect::FinalizeCapture { id } => {
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    log::info!("Stub: capture finalized");
                    let asset = AudioAsset::new(id, vec![0u8; 32]);
                    let _ = tx.send(Event::CaptureFinalized { id, asset }).await;
                });
            }

            Effect::DiscardCapture { id } => {
                log::info!("Stub: capture {} discarded", id);
            }

            Effect::Submit { id, asset } => {
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    log::info!("Stub: submission of {} complete", asset.file_name);
                    let result = crate::recognition::RecognitionResult {
                        dialect: crate::recognition::Dialect::Mandarin,
                        confidence: 0.9,
                        transcript: "[stub transcript]".to_string(),
                        timestamp: chrono::Utc::now(),
                    };
                    let _ = tx.send(Event::SubmitSucceeded { id, result }).await;
                });
            }

            Effect::RecordResult { result } => {
                let history = self.history.clone();
                tokio::spawn(async move {
                    history.lock().await.append(result);
                });
            }

            Effect::Notify { level, message } => {
                log::info!("Stub notice ({:?}): {}", level, message);
            }

            Effect::StartRecordingTick { id } => {
                tokio::spawn(async move {
                    // Stub: tick for up to 60 seconds
                    for _ in 0..60 {
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::EmitStatus => {
                unreachable!("EmitStatus should be handled in run_state_loop");
            }
        }
    }
}
