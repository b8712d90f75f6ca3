//! Scripted end-to-end drives of the interview state machine.
//!
//! These tests play the controller's role by hand: feed an event, inspect
//! the effects, answer the async ones with the events a real device and
//! backend would send. No audio or network involved.

use uuid::Uuid;

use life_review::session::{reduce, Effect, Event, State, QUESTION_SEQUENCE};

/// Drive one event and return the new state plus effects.
fn step(state: &State, event: Event) -> (State, Vec<Effect>) {
    reduce(state, event)
}

/// Pull the attempt id out of a StartCapture effect.
fn capture_id(effects: &[Effect]) -> Uuid {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::StartCapture { id } => Some(*id),
            _ => None,
        })
        .expect("expected a StartCapture effect")
}

/// Finish question playback. Listening arms automatically; returns the
/// armed state and the new attempt id.
fn playback_done(state: &State) -> (State, Uuid) {
    let (state, effects) = step(state, Event::PlaybackDone);
    assert!(matches!(state, State::Arming { .. }));
    let id = capture_id(&effects);
    (state, id)
}

/// Record an answer through transcription, starting from an armed
/// capture. Returns the state after TranscriptReady and its effects.
fn answer(state: State, id: Uuid, text: &str) -> (State, Vec<Effect>) {
    let (state, _) = step(&state, Event::CaptureStarted { id });
    assert!(matches!(state, State::Recording { .. }));

    let (state, effects) = step(&state, Event::StopRecording);
    assert!(matches!(state, State::Stopping { .. }));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::StopCapture { id: got } if *got == id)));

    let (state, effects) = step(&state, Event::CaptureStopped { id });
    assert!(matches!(state, State::Processing { .. }));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::Transcribe { id: got } if *got == id)));

    step(
        &state,
        Event::TranscriptReady {
            id,
            text: text.to_string(),
        },
    )
}

/// Complete the analysis round for a non-identity answer.
fn finish_analysis(state: State, effects: &[Effect]) -> State {
    let id = effects
        .iter()
        .find_map(|e| match e {
            Effect::Analyze { id, .. } => Some(*id),
            _ => None,
        })
        .expect("expected an Analyze effect");

    let (state, effects) = step(
        &state,
        Event::AnalysisReady {
            id,
            analysis: "What a vivid memory.".to_string(),
            tts_path: None,
        },
    );
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::SaveResponse { analysis: Some(_), .. })));
    state
}

#[test]
fn full_session_reaches_completed_with_one_finalize() {
    let (mut state, effects) = step(&State::Idle, Event::StartSession);
    assert!(matches!(state, State::Speaking { question_index: 0 }));
    assert!(effects.iter().any(|e| matches!(e, Effect::SpeakIntro)));

    let mut finalize_count = 0;
    let mut save_count = 0;

    for index in 0..QUESTION_SEQUENCE.len() {
        assert!(
            matches!(state, State::Speaking { question_index } if question_index == index),
            "question {} should be speaking, got {:?}",
            index,
            state
        );

        // Capture arms as soon as the question finishes playing
        let (armed, id) = playback_done(&state);

        let (next, effects) = answer(armed, id, "I remember it well.");
        state = next;

        if index == 0 {
            // Identity question: saved directly, no analysis round
            assert!(matches!(state, State::AwaitingNext { .. }));
            assert!(!effects.iter().any(|e| matches!(e, Effect::Analyze { .. })));
            save_count += effects
                .iter()
                .filter(|e| matches!(e, Effect::SaveResponse { .. }))
                .count();
        } else {
            // SaveResponse arrives with AnalysisReady for analyzed answers
            state = finish_analysis(state, &effects);
            save_count += 1;
        }

        let (next, effects) = step(&state, Event::NextQuestion);
        state = next;
        finalize_count += effects
            .iter()
            .filter(|e| matches!(e, Effect::FinalizeSession))
            .count();
    }

    assert!(matches!(state, State::Completed));
    assert_eq!(finalize_count, 1, "finalization must happen exactly once");
    assert_eq!(save_count, QUESTION_SEQUENCE.len());

    // Everything after completion is a no-op
    let (state, effects) = step(&state, Event::EndSession);
    assert!(matches!(state, State::Completed));
    assert!(effects.is_empty());
}

#[test]
fn identity_answer_captures_display_name() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, id) = playback_done(&state);

    let (state, effects) = answer(state, id, "Well, my name is Eleanor.");

    assert!(matches!(
        state,
        State::AwaitingNext {
            question_index: 0,
            follow_up_used: true
        }
    ));
    let name = effects
        .iter()
        .find_map(|e| match e {
            Effect::SaveDisplayName { name } => Some(name.clone()),
            _ => None,
        })
        .expect("expected a SaveDisplayName effect");
    assert_eq!(name, "Eleanor");

    // The identity answer uses up the follow-up slot
    let (state, effects) = step(&state, Event::StartFollowUp);
    assert!(matches!(state, State::AwaitingNext { .. }));
    assert!(effects.is_empty());
}

#[test]
fn follow_up_is_offered_once_per_question() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, id) = playback_done(&state);
    let (state, _) = answer(state, id, "Call me Sam");
    let (state, _) = step(&state, Event::NextQuestion);
    let (state, id) = playback_done(&state);

    let (state, effects) = answer(state, id, "Honestly, a little nervous.");
    let state = finish_analysis(state, &effects);
    assert!(matches!(
        state,
        State::AwaitingNext {
            question_index: 1,
            follow_up_used: false
        }
    ));

    // A follow-up round stays on the same question; the user re-arms
    // recording manually
    let (state, _) = step(&state, Event::StartFollowUp);
    assert!(matches!(
        state,
        State::ReadyToRecord {
            question_index: 1,
            follow_up: true
        }
    ));
    let (state, effects) = step(&state, Event::BeginRecording);
    assert!(matches!(state, State::Arming { follow_up: true, .. }));
    let id = capture_id(&effects);

    let (state, effects) = answer(state, id, "Actually, mostly excited.");
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::Analyze { follow_up: true, .. })));
    let state = finish_analysis(state, &effects);
    assert!(matches!(
        state,
        State::AwaitingNext {
            question_index: 1,
            follow_up_used: true
        }
    ));

    // Second request is ignored
    let (state, effects) = step(&state, Event::StartFollowUp);
    assert!(matches!(state, State::AwaitingNext { .. }));
    assert!(effects.is_empty());
}

#[test]
fn no_speech_returns_to_ready_without_saving() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, id) = playback_done(&state);

    let (state, _) = step(&state, Event::CaptureStarted { id });
    let (state, _) = step(&state, Event::StopRecording);
    let (state, _) = step(&state, Event::CaptureStopped { id });

    let (state, effects) = step(
        &state,
        Event::NoSpeechDetected {
            id,
            message: "no speech detected".to_string(),
        },
    );
    assert!(matches!(
        state,
        State::ReadyToRecord {
            question_index: 0,
            follow_up: false
        }
    ));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::NotifyNoSpeech { .. })));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::SaveResponse { .. })));

    // The user can immediately try again
    let (state, _) = step(&state, Event::BeginRecording);
    assert!(matches!(state, State::Arming { .. }));
}

#[test]
fn analysis_failure_saves_answer_and_proceeds() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, id) = playback_done(&state);
    let (state, _) = answer(state, id, "I go by June");
    let (state, _) = step(&state, Event::NextQuestion);
    let (state, id) = playback_done(&state);

    let (state, effects) = answer(state, id, "The house by the orchard.");
    let id = effects
        .iter()
        .find_map(|e| match e {
            Effect::Analyze { id, .. } => Some(*id),
            _ => None,
        })
        .expect("expected an Analyze effect");

    let (state, effects) = step(
        &state,
        Event::AnalysisFailed {
            id,
            err: "backend unavailable".to_string(),
        },
    );
    assert!(matches!(
        state,
        State::AwaitingNext {
            question_index: 1,
            follow_up_used: false
        }
    ));
    // The answer is kept even though analysis failed
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::SaveResponse {
            analysis: None,
            transcript,
            ..
        } if transcript == "The house by the orchard."
    )));
}

#[test]
fn ending_mid_recording_stops_capture_and_finalizes() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, id) = playback_done(&state);
    let (state, _) = step(&state, Event::CaptureStarted { id });

    let (state, effects) = step(&state, Event::EndSession);
    assert!(matches!(state, State::Completed));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::StopCapture { id: got } if *got == id)));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::FinalizeSession)));
}

#[test]
fn stale_attempt_events_are_dropped() {
    let (state, _) = step(&State::Idle, Event::StartSession);
    let (state, _) = playback_done(&state);

    let stale = Uuid::new_v4();
    let (after, effects) = step(&state, Event::CaptureStarted { id: stale });
    assert!(matches!(after, State::Arming { .. }));
    assert!(effects.is_empty());

    let (after, effects) = step(
        &state,
        Event::TranscriptReady {
            id: stale,
            text: "ghost".to_string(),
        },
    );
    assert!(matches!(after, State::Arming { .. }));
    assert!(effects.is_empty());
}
