//! Interview state machine
//!
//! All transitions go through the `reduce()` function, which returns a new
//! state and a list of effects to execute. The reducer never touches the
//! network or the audio device; the controller executes effects and feeds
//! resulting events back in.
//!
//! Recording attempts are tagged with a Uuid so events from a torn-down
//! attempt (late ticks, late transcripts) are dropped instead of
//! corrupting the current one.

use std::time::{Duration, Instant};
use uuid::Uuid;

use super::questions::{IDENTITY_QUESTION_INDEX, QUESTION_SEQUENCE};

/// Hard ceiling on a single recording. The capture callback enforces the
/// same limit independently in case ticks stop arriving.
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(180);

/// Interview control state. This is the authoritative state; the
/// controller holds exactly one and mutates it only via `reduce()`.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Question (and, for the first question, the intro) is being spoken
    Speaking { question_index: usize },
    /// Waiting for the user to start recording an answer
    ReadyToRecord {
        question_index: usize,
        follow_up: bool,
    },
    /// Capture requested, device not confirmed yet
    Arming {
        attempt_id: Uuid,
        question_index: usize,
        follow_up: bool,
    },
    Recording {
        attempt_id: Uuid,
        question_index: usize,
        follow_up: bool,
        started_at: Instant,
    },
    /// Stop requested, waiting for device teardown
    Stopping {
        attempt_id: Uuid,
        question_index: usize,
        follow_up: bool,
    },
    /// Transcription and analysis in flight
    Processing {
        attempt_id: Uuid,
        question_index: usize,
        follow_up: bool,
        transcript: Option<String>,
    },
    /// Answer handled; user chooses follow-up or next question
    AwaitingNext {
        question_index: usize,
        follow_up_used: bool,
    },
    Completed,
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that drive transitions. Sent by user commands, the capture
/// pipeline, the transcription strategy, and the analysis task.
#[derive(Debug, Clone)]
pub enum Event {
    /// User started the interview (idempotent once underway)
    StartSession,
    /// Question/intro playback finished
    PlaybackDone,
    /// User pressed record
    BeginRecording,
    /// User pressed stop
    StopRecording,
    /// User asked for one follow-up round on the current answer
    StartFollowUp,
    /// User advanced to the next question
    NextQuestion,
    /// User ended the interview early
    EndSession,
    /// Once-a-second timer while recording
    RecordingTick { id: Uuid },

    // Capture events
    CaptureStarted { id: Uuid },
    CaptureStartFailed { id: Uuid, err: String },
    CaptureStopped { id: Uuid },

    // Transcription events
    TranscriptReady { id: Uuid, text: String },
    NoSpeechDetected { id: Uuid, message: String },
    TranscribeFailed { id: Uuid, err: String },

    // Analysis events
    AnalysisReady {
        id: Uuid,
        analysis: String,
        tts_path: Option<String>,
    },
    AnalysisFailed { id: Uuid, err: String },
}

/// Effects the controller executes after a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    SpeakIntro,
    SpeakQuestion { index: usize },
    /// Templated identity acknowledgment, synthesized locally
    SpeakAcknowledgment { name: String },
    /// Speak the analysis, preferring a pre-rendered audio artifact
    PlayAnalysis {
        analysis: String,
        tts_path: Option<String>,
    },
    SpeakOutro,
    StartCapture { id: Uuid },
    StopCapture { id: Uuid },
    StartRecordingTick { id: Uuid },
    /// Produce a transcript for the attempt (streaming aggregate or batch)
    Transcribe { id: Uuid },
    Analyze {
        id: Uuid,
        question_index: usize,
        transcript: String,
        follow_up: bool,
    },
    SaveDisplayName { name: String },
    SaveResponse {
        question_index: usize,
        transcript: String,
        analysis: Option<String>,
        follow_up: bool,
    },
    NotifyNoSpeech { message: String },
    NotifyError { message: String },
    /// Mark the session ended and kick off profile recomputation
    FinalizeSession,
    EmitUi,
}

/// Reducer: (state, event) -> (next_state, effects)
///
/// Rules:
/// - never mutate state in place
/// - drop events carrying a stale attempt id
/// - finalization effects are emitted only on the transition into
///   `Completed`, so the session ends exactly once
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id: Option<Uuid> = match state {
        Arming { attempt_id, .. }
        | Recording { attempt_id, .. }
        | Stopping { attempt_id, .. }
        | Processing { attempt_id, .. } => Some(*attempt_id),
        _ => None,
    };

    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartSession) => (
            Speaking { question_index: 0 },
            vec![SpeakIntro, SpeakQuestion { index: 0 }, EmitUi],
        ),
        // Starting an already-started session is a no-op
        (_, StartSession) => (state.clone(), vec![]),

        // -----------------
        // Speaking
        // -----------------
        // Conversational flow: listening starts as soon as the question
        // finishes playing. ReadyToRecord is only entered on recoverable
        // failures and follow-up requests, where the user re-arms manually.
        (Speaking { question_index }, PlaybackDone) => {
            let id = Uuid::new_v4();
            (
                Arming {
                    attempt_id: id,
                    question_index: *question_index,
                    follow_up: false,
                },
                vec![StartCapture { id }, EmitUi],
            )
        }

        // -----------------
        // ReadyToRecord
        // -----------------
        (
            ReadyToRecord {
                question_index,
                follow_up,
            },
            BeginRecording,
        ) => {
            let id = Uuid::new_v4();
            (
                Arming {
                    attempt_id: id,
                    question_index: *question_index,
                    follow_up: *follow_up,
                },
                vec![StartCapture { id }, EmitUi],
            )
        }

        // -----------------
        // Arming
        // -----------------
        (
            Arming {
                attempt_id,
                question_index,
                follow_up,
            },
            CaptureStarted { id },
        ) if *attempt_id == id => (
            Recording {
                attempt_id: id,
                question_index: *question_index,
                follow_up: *follow_up,
                started_at: Instant::now(),
            },
            vec![StartRecordingTick { id }, EmitUi],
        ),
        // Microphone failure is user-facing but recoverable: back to
        // ReadyToRecord so the user can retry
        (
            Arming {
                attempt_id,
                question_index,
                follow_up,
            },
            CaptureStartFailed { id, err },
        ) if *attempt_id == id => (
            ReadyToRecord {
                question_index: *question_index,
                follow_up: *follow_up,
            },
            vec![NotifyError { message: err }, EmitUi],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                attempt_id,
                question_index,
                follow_up,
                ..
            },
            StopRecording,
        ) => (
            Stopping {
                attempt_id: *attempt_id,
                question_index: *question_index,
                follow_up: *follow_up,
            },
            vec![StopCapture { id: *attempt_id }, EmitUi],
        ),
        (
            Recording {
                attempt_id,
                question_index,
                follow_up,
                started_at,
            },
            RecordingTick { id },
        ) if *attempt_id == id => {
            let elapsed = started_at.elapsed();
            if elapsed >= MAX_RECORDING_DURATION {
                log::warn!(
                    "Recording {} auto-stopped after {:?} (max duration reached)",
                    attempt_id,
                    elapsed
                );
                (
                    Stopping {
                        attempt_id: *attempt_id,
                        question_index: *question_index,
                        follow_up: *follow_up,
                    },
                    vec![StopCapture { id: *attempt_id }, EmitUi],
                )
            } else {
                (state.clone(), vec![EmitUi])
            }
        }

        // -----------------
        // Stopping
        // -----------------
        (
            Stopping {
                attempt_id,
                question_index,
                follow_up,
            },
            CaptureStopped { id },
        ) if *attempt_id == id => (
            Processing {
                attempt_id: id,
                question_index: *question_index,
                follow_up: *follow_up,
                transcript: None,
            },
            vec![Transcribe { id }, EmitUi],
        ),

        // -----------------
        // Processing
        // -----------------
        // Identity question: store the name, speak a templated
        // acknowledgment, skip analysis. Follow-up is not offered.
        (
            Processing {
                attempt_id,
                question_index,
                follow_up: false,
                ..
            },
            TranscriptReady { id, text },
        ) if *attempt_id == id && *question_index == IDENTITY_QUESTION_INDEX => {
            let name = super::questions::extract_display_name(&text)
                .unwrap_or_else(|| text.trim().to_string());
            (
                AwaitingNext {
                    question_index: *question_index,
                    follow_up_used: true,
                },
                vec![
                    SaveDisplayName { name: name.clone() },
                    SpeakAcknowledgment { name },
                    SaveResponse {
                        question_index: *question_index,
                        transcript: text,
                        analysis: None,
                        follow_up: false,
                    },
                    EmitUi,
                ],
            )
        }
        (
            Processing {
                attempt_id,
                question_index,
                follow_up,
                ..
            },
            TranscriptReady { id, text },
        ) if *attempt_id == id => (
            Processing {
                attempt_id: id,
                question_index: *question_index,
                follow_up: *follow_up,
                transcript: Some(text.clone()),
            },
            vec![
                Analyze {
                    id,
                    question_index: *question_index,
                    transcript: text,
                    follow_up: *follow_up,
                },
                EmitUi,
            ],
        ),
        // No speech: no Response is created; back to ReadyToRecord for a
        // retry of the same question (or follow-up round)
        (
            Processing {
                attempt_id,
                question_index,
                follow_up,
                ..
            },
            NoSpeechDetected { id, message },
        ) if *attempt_id == id => (
            ReadyToRecord {
                question_index: *question_index,
                follow_up: *follow_up,
            },
            vec![NotifyNoSpeech { message }, EmitUi],
        ),
        // Transcription failure (network, bad clip): recoverable, the
        // user can retry the same question
        (
            Processing {
                attempt_id,
                question_index,
                follow_up,
                ..
            },
            TranscribeFailed { id, err },
        ) if *attempt_id == id => (
            ReadyToRecord {
                question_index: *question_index,
                follow_up: *follow_up,
            },
            vec![NotifyError { message: err }, EmitUi],
        ),
        (
            Processing {
                attempt_id,
                question_index,
                follow_up,
                transcript,
            },
            AnalysisReady {
                id,
                analysis,
                tts_path,
            },
        ) if *attempt_id == id => (
            AwaitingNext {
                question_index: *question_index,
                follow_up_used: *follow_up,
            },
            vec![
                SaveResponse {
                    question_index: *question_index,
                    transcript: transcript.clone().unwrap_or_default(),
                    analysis: Some(analysis.clone()),
                    follow_up: *follow_up,
                },
                PlayAnalysis { analysis, tts_path },
                EmitUi,
            ],
        ),
        // Analysis failure degrades gracefully: the answer is persisted
        // without analysis and the interview moves on
        (
            Processing {
                attempt_id,
                question_index,
                follow_up,
                transcript,
            },
            AnalysisFailed { id, err },
        ) if *attempt_id == id => (
            AwaitingNext {
                question_index: *question_index,
                follow_up_used: *follow_up,
            },
            vec![
                SaveResponse {
                    question_index: *question_index,
                    transcript: transcript.clone().unwrap_or_default(),
                    analysis: None,
                    follow_up: *follow_up,
                },
                NotifyError { message: err },
                EmitUi,
            ],
        ),

        // -----------------
        // AwaitingNext
        // -----------------
        (
            AwaitingNext {
                question_index,
                follow_up_used: false,
            },
            StartFollowUp,
        ) => (
            ReadyToRecord {
                question_index: *question_index,
                follow_up: true,
            },
            vec![EmitUi],
        ),
        // A second follow-up on the same Response is ignored
        (AwaitingNext { follow_up_used: true, .. }, StartFollowUp) => (state.clone(), vec![]),
        (AwaitingNext { question_index, .. }, NextQuestion) => {
            let next = question_index + 1;
            if next < QUESTION_SEQUENCE.len() {
                (
                    Speaking {
                        question_index: next,
                    },
                    vec![SpeakQuestion { index: next }, EmitUi],
                )
            } else {
                (Completed, vec![SpeakOutro, FinalizeSession, EmitUi])
            }
        }

        // -----------------
        // EndSession (early exit)
        // -----------------
        (Completed, EndSession) => (state.clone(), vec![]),
        (Arming { attempt_id, .. }, EndSession)
        | (Recording { attempt_id, .. }, EndSession)
        | (Stopping { attempt_id, .. }, EndSession) => (
            Completed,
            vec![
                StopCapture { id: *attempt_id },
                FinalizeSession,
                EmitUi,
            ],
        ),
        // Nothing started, nothing to finalize; still terminal so the
        // controller loop can wind down
        (Idle, EndSession) => (Completed, vec![EmitUi]),
        (_, EndSession) => (Completed, vec![FinalizeSession, EmitUi]),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStarted { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStartFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStopped { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscriptReady { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, NoSpeechDetected { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscribeFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AnalysisReady { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AnalysisFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
