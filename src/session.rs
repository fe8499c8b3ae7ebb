//! Recognition session state machine.
//!
//! Implements the capture → finalize → submit workflow as a single-writer
//! state machine. All transitions go through the `reduce()` function, which
//! returns a new state and a list of effects to execute.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::audio::AudioAsset;
use crate::recognition::RecognitionResult;

/// Sessions are force-finalized after this long to prevent runaway captures.
const MAX_SESSION_DURATION: Duration = Duration::from_secs(120);

/// Internal state of the recognition workflow.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Waiting for the microphone grant / device start.
    Arming { session_id: Uuid },
    Recording {
        session_id: Uuid,
        started_at: Instant,
    },
    /// Capture stopped; buffered segments are being concatenated.
    Finalizing { session_id: Uuid },
    /// Asset handed off; waiting on the recognition endpoint.
    Submitting { session_id: Uuid },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that can trigger state transitions.
/// Sent from the command surface and from effect completion tasks.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start a recording session.
    StartRequested,
    /// User asked to stop the current recording.
    StopRequested,
    /// User requested cancel (abort without submitting).
    Cancel,
    /// Application exit requested; handled at the loop edge.
    Exit,
    /// Tick event while recording (includes id to prevent stale ticks).
    RecordingTick { id: Uuid },

    // Capture events
    CaptureStarted { id: Uuid },
    CaptureStartFailed { id: Uuid, err: String },
    CaptureFinalized { id: Uuid, asset: AudioAsset },
    CaptureFailed { id: Uuid, err: String },

    // Submission events
    SubmitSucceeded {
        id: Uuid,
        result: RecognitionResult,
    },
    SubmitFailed { id: Uuid, err: String },
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    StartCapture { id: Uuid },
    /// Stop the device and concatenate buffered segments into an asset.
    FinalizeCapture { id: Uuid },
    /// Stop the device and drop the buffered audio.
    DiscardCapture { id: Uuid },
    Submit { id: Uuid, asset: AudioAsset },
    /// Append to the result history and notify the user.
    RecordResult { result: RecognitionResult },
    /// Transient user-facing notice (toast equivalent).
    Notify {
        level: NoticeLevel,
        message: String,
    },
    /// Start sending RecordingTick events every second while recording
    StartRecordingTick { id: Uuid },
    /// Signal to re-render the session status line.
    EmitStatus,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale session IDs
/// - At most one session exists at a time; `StartRequested` while busy is
///   rejected with a notice rather than silently racing
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    // Helper: extract current session_id (if any)
    let current_id: Option<Uuid> = match state {
        Idle => None,
        Arming { session_id } => Some(*session_id),
        Recording { session_id, .. } => Some(*session_id),
        Finalizing { session_id } => Some(*session_id),
        Submitting { session_id } => Some(*session_id),
    };

    // Helper: check if event's ID is stale (doesn't match current workflow)
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRequested) => {
            let id = Uuid::new_v4();
            (
                Arming { session_id: id },
                vec![StartCapture { id }, EmitStatus],
            )
        }
        // Stop with nothing in flight is a no-op: no asset, no submission.
        (Idle, StopRequested) => (Idle, vec![]),
        (Idle, Cancel) => (Idle, vec![]),

        // -----------------
        // Single-flight guard: a busy session rejects a second start with a
        // clear notice instead of spawning an overlapping capture.
        // -----------------
        (Arming { .. } | Recording { .. } | Finalizing { .. }, StartRequested) => (
            state.clone(),
            vec![Notify {
                level: NoticeLevel::Error,
                message: "Recording already in progress".to_string(),
            }],
        ),
        (Submitting { .. }, StartRequested) => (
            state.clone(),
            vec![Notify {
                level: NoticeLevel::Error,
                message: "Submission in progress, wait for the result".to_string(),
            }],
        ),

        // -----------------
        // Arming
        // -----------------
        (Arming { session_id }, CaptureStarted { id }) if *session_id == id => (
            Recording {
                session_id: *session_id,
                started_at: Instant::now(),
            },
            vec![
                StartRecordingTick { id },
                Notify {
                    level: NoticeLevel::Info,
                    message: "Recording started".to_string(),
                },
                EmitStatus,
            ],
        ),
        (Arming { session_id }, CaptureStartFailed { id, err }) if *session_id == id => (
            Idle,
            vec![
                Notify {
                    level: NoticeLevel::Error,
                    message: format!(
                        "Failed to start recording. Please check microphone permissions. ({err})"
                    ),
                },
                EmitStatus,
            ],
        ),
        // The device may not have started yet; both stop and cancel abort.
        (Arming { session_id }, StopRequested | Cancel) => (
            Idle,
            vec![DiscardCapture { id: *session_id }, EmitStatus],
        ),

        // -----------------
        // Recording
        // -----------------
        (Recording { session_id, .. }, StopRequested) => (
            Finalizing {
                session_id: *session_id,
            },
            vec![FinalizeCapture { id: *session_id }, EmitStatus],
        ),
        // Cancel during recording aborts without submission
        (Recording { session_id, .. }, Cancel) => (
            Idle,
            vec![
                DiscardCapture { id: *session_id },
                Notify {
                    level: NoticeLevel::Info,
                    message: "Recording cancelled".to_string(),
                },
                EmitStatus,
            ],
        ),
        (
            Recording {
                session_id,
                started_at,
            },
            RecordingTick { id },
        ) if *session_id == id => {
            let elapsed = started_at.elapsed();

            if elapsed >= MAX_SESSION_DURATION {
                log::warn!(
                    "Session {} auto-stopped after {:?} (max duration reached)",
                    session_id,
                    elapsed
                );
                (
                    Finalizing {
                        session_id: *session_id,
                    },
                    vec![
                        FinalizeCapture { id: *session_id },
                        Notify {
                            level: NoticeLevel::Info,
                            message: "Maximum recording length reached, stopping".to_string(),
                        },
                        EmitStatus,
                    ],
                )
            } else {
                // Normal tick - just refresh the status line
                (state.clone(), vec![EmitStatus])
            }
        }

        // -----------------
        // Finalizing
        // -----------------
        (Finalizing { session_id }, CaptureFinalized { id, asset }) if *session_id == id => (
            Submitting {
                session_id: *session_id,
            },
            vec![
                Submit {
                    id: *session_id,
                    asset,
                },
                EmitStatus,
            ],
        ),
        (Finalizing { session_id }, CaptureFailed { id, err }) if *session_id == id => (
            Idle,
            vec![
                Notify {
                    level: NoticeLevel::Error,
                    message: format!("Failed to finalize recording: {err}"),
                },
                EmitStatus,
            ],
        ),

        // -----------------
        // Submitting
        // -----------------
        (Submitting { session_id }, SubmitSucceeded { id, result }) if *session_id == id => (
            Idle,
            vec![RecordResult { result }, EmitStatus],
        ),
        (Submitting { session_id }, SubmitFailed { id, err }) if *session_id == id => (
            Idle,
            vec![
                Notify {
                    level: NoticeLevel::Error,
                    message: format!("Failed to process audio for dialect recognition: {err}"),
                },
                EmitStatus,
            ],
        ),
        // An in-flight submission cannot be cancelled; let it resolve.
        (Submitting { .. }, Cancel) => (
            state.clone(),
            vec![Notify {
                level: NoticeLevel::Error,
                message: "Submission already in flight, cannot cancel".to_string(),
            }],
        ),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, CaptureStarted { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStartFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFinalized { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, SubmitSucceeded { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, SubmitFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::recognition::Dialect;

    fn sample_asset(id: Uuid) -> AudioAsset {
        AudioAsset::new(id, vec![0u8; 16])
    }

    fn sample_result() -> RecognitionResult {
        RecognitionResult {
            dialect: Dialect::Cantonese,
            confidence: 0.88,
            transcript: "test transcript".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn has_notice(effects: &[Effect], level: NoticeLevel, needle: &str) -> bool {
        effects.iter().any(|e| {
            matches!(e, Effect::Notify { level: l, message } if *l == level && message.contains(needle))
        })
    }

    #[test]
    fn idle_start_transitions_to_arming() {
        let (next, effects) = reduce(&State::Idle, Event::StartRequested);
        assert!(matches!(next, State::Arming { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartCapture { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::EmitStatus)));
    }

    #[test]
    fn stop_in_idle_is_a_noop() {
        let (next, effects) = reduce(&State::Idle, Event::StopRequested);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn start_while_recording_is_rejected_with_notice() {
        let id = Uuid::new_v4();
        let state = State::Recording {
            session_id: id,
            started_at: Instant::now(),
        };
        let (next, effects) = reduce(&state, Event::StartRequested);

        // Same session keeps running; no second capture is spawned.
        assert!(matches!(next, State::Recording { session_id, .. } if session_id == id));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::StartCapture { .. })));
        assert!(has_notice(&effects, NoticeLevel::Error, "already in progress"));
    }

    #[test]
    fn start_while_submitting_is_rejected_with_notice() {
        let state = State::Submitting {
            session_id: Uuid::new_v4(),
        };
        let (next, effects) = reduce(&state, Event::StartRequested);
        assert!(matches!(next, State::Submitting { .. }));
        assert!(has_notice(&effects, NoticeLevel::Error, "Submission in progress"));
    }

    #[test]
    fn arming_capture_ok_transitions_to_recording() {
        let id = Uuid::new_v4();
        let state = State::Arming { session_id: id };
        let (next, effects) = reduce(&state, Event::CaptureStarted { id });
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartRecordingTick { .. })));
    }

    #[test]
    fn arming_capture_failure_reverts_to_idle_with_notice() {
        let id = Uuid::new_v4();
        let state = State::Arming { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::CaptureStartFailed {
                id,
                err: "No audio input device found".to_string(),
            },
        );
        assert!(matches!(next, State::Idle));
        assert!(has_notice(&effects, NoticeLevel::Error, "microphone"));
    }

    #[test]
    fn stale_event_is_ignored() {
        let id = Uuid::new_v4();
        let stale_id = Uuid::new_v4();
        let state = State::Arming { session_id: id };
        let (next, effects) = reduce(&state, Event::CaptureStarted { id: stale_id });
        // Should stay in Arming, no effects
        assert!(matches!(next, State::Arming { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_during_recording_finalizes() {
        let id = Uuid::new_v4();
        let state = State::Recording {
            session_id: id,
            started_at: Instant::now(),
        };
        let (next, effects) = reduce(&state, Event::StopRequested);

        assert!(matches!(next, State::Finalizing { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FinalizeCapture { .. })));
    }

    #[test]
    fn cancel_during_recording_aborts_without_submission() {
        let id = Uuid::new_v4();
        let state = State::Recording {
            session_id: id,
            started_at: Instant::now(),
        };
        let (next, effects) = reduce(&state, Event::Cancel);

        assert!(matches!(next, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::DiscardCapture { .. })));
        // Should NOT finalize or submit
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::FinalizeCapture { .. })));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Submit { .. })));
    }

    #[test]
    fn stop_during_arming_discards_the_pending_capture() {
        let id = Uuid::new_v4();
        let state = State::Arming { session_id: id };
        let (next, effects) = reduce(&state, Event::StopRequested);

        assert!(matches!(next, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::DiscardCapture { .. })));
    }

    #[test]
    fn finalized_asset_is_submitted() {
        let id = Uuid::new_v4();
        let state = State::Finalizing { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::CaptureFinalized {
                id,
                asset: sample_asset(id),
            },
        );

        assert!(matches!(next, State::Submitting { .. }));
        assert!(effects.iter().any(|e| matches!(e, Effect::Submit { .. })));
    }

    #[test]
    fn submit_success_records_result_and_returns_to_idle() {
        let id = Uuid::new_v4();
        let state = State::Submitting { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::SubmitSucceeded {
                id,
                result: sample_result(),
            },
        );

        assert!(matches!(next, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RecordResult { .. })));
    }

    #[test]
    fn submit_failure_notifies_without_recording() {
        let id = Uuid::new_v4();
        let state = State::Submitting { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::SubmitFailed {
                id,
                err: "connection refused".to_string(),
            },
        );

        assert!(matches!(next, State::Idle));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::RecordResult { .. })));
        assert!(has_notice(&effects, NoticeLevel::Error, "connection refused"));
    }

    #[test]
    fn tick_past_max_duration_forces_finalize() {
        let id = Uuid::new_v4();
        let state = State::Recording {
            session_id: id,
            started_at: Instant::now() - Duration::from_secs(121),
        };
        let (next, effects) = reduce(&state, Event::RecordingTick { id });

        assert!(matches!(next, State::Finalizing { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FinalizeCapture { .. })));
    }

    #[test]
    fn tick_before_max_duration_only_refreshes_status() {
        let id = Uuid::new_v4();
        let state = State::Recording {
            session_id: id,
            started_at: Instant::now(),
        };
        let (next, effects) = reduce(&state, Event::RecordingTick { id });

        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.iter().all(|e| matches!(e, Effect::EmitStatus)));
    }

    // One completed session walks start → stop → finalize → submit and
    // produces exactly one Submit effect along the way.
    #[test]
    fn completed_session_submits_exactly_once() {
        let mut state = State::default();
        let mut submits = 0usize;

        let mut step = |state: &State, event: Event| {
            let (next, effects) = reduce(state, event);
            for effect in &effects {
                if matches!(effect, Effect::Submit { .. }) {
                    submits += 1;
                }
            }
            (next, effects)
        };

        let (next, _) = step(&state, Event::StartRequested);
        state = next;
        let id = match state {
            State::Arming { session_id } => session_id,
            _ => panic!("expected Arming"),
        };

        let (next, _) = step(&state, Event::CaptureStarted { id });
        state = next;
        let (next, _) = step(&state, Event::StopRequested);
        state = next;
        let (next, _) = step(
            &state,
            Event::CaptureFinalized {
                id,
                asset: sample_asset(id),
            },
        );
        state = next;
        let (next, _) = step(
            &state,
            Event::SubmitSucceeded {
                id,
                result: sample_result(),
            },
        );
        state = next;

        assert!(matches!(state, State::Idle));
        assert_eq!(submits, 1);
    }
}
