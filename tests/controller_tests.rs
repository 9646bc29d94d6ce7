//! Conversation controller tests
//!
//! These drive a real controller thread through scripted capture devices and
//! mock backend/voice, observing it only through the shared state.

mod common;

use common::{fast_controller, Harness, MockSynth, WAIT};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use voiceflow::capture::{CaptureError, RecognitionMode, ScriptedMicrophone};
use voiceflow::config::{CapturePath, RecognizerConfig};
use voiceflow::files::EditOperation;
use voiceflow::llm::{BackendReply, Utterance};
use voiceflow::messages::LogKind;
use voiceflow::speech::{SegmentingRecognizer, Transcriber};
use voiceflow::{InteractionState, VoiceFlowError};

fn red_button() -> EditOperation {
    EditOperation::create(
        "button.html",
        "<button style=\"background: red\">Click</button>",
        "Added the button.",
    )
}

#[test]
fn test_text_command_creates_file_and_returns_to_idle() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_edits(vec![red_button()]);

    harness.handle.submit_text("create a red button").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    let snapshot = harness.state().snapshot();

    assert!(snapshot.files.contains("button.html"));
    assert!(snapshot.files.contains("index.html"));
    assert_eq!(snapshot.selected_path.as_deref(), Some("button.html"));
    assert_eq!(
        snapshot.files.get("button.html").map(|f| f.language.as_str()),
        Some("html")
    );

    let kinds: Vec<LogKind> = snapshot.logs.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![LogKind::User, LogKind::System]);
    assert_eq!(snapshot.logs[0].message, "create a red button");
    assert_eq!(snapshot.logs[1].message, "Added the button.");

    assert_eq!(harness.synth.spoken(), vec!["Added the button.".to_string()]);

    let requests = harness.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].utterance, Utterance::Text("create a red button".into()));
    assert_eq!(requests[0].current_path.as_deref(), Some("index.html"));
    assert!(requests[0].files.contains_key("index.html"));
}

#[test]
fn test_backend_failure_enters_error_then_recovers() {
    let harness = Harness::start(fast_controller());
    harness
        .backend
        .push_reply(Err(VoiceFlowError::Backend("connection refused".into())));

    harness.handle.submit_text("make it blue").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_error()));
    assert!(harness.state().logs().iter().any(|e| e.kind == LogKind::Error));

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_idle()));
    assert_eq!(
        harness.synth.spoken(),
        vec![fast_controller().error_apology]
    );
    // nothing was applied
    assert_eq!(harness.state().snapshot().files.len(), 1);
}

#[test]
fn test_new_turn_allowed_from_error() {
    let harness = Harness::start(fast_controller().with_error_cooldown_ms(5_000));
    harness
        .backend
        .push_reply(Err(VoiceFlowError::Backend("timeout".into())));
    harness.handle.submit_text("first").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_error()));
    assert!(harness.wait_for(WAIT, || harness.synth.spoken().len() == 1));

    harness.backend.push_edits(vec![red_button()]);
    harness.handle.submit_text("second").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 2 && s.interaction.is_idle()));
    assert!(harness.state().snapshot().files.contains("button.html"));
}

#[test]
fn test_malformed_reply_apologises_without_error_state() {
    let harness = Harness::start(fast_controller());
    harness
        .backend
        .push_reply(Err(VoiceFlowError::BackendMalformed("not json".into())));

    harness.handle.submit_text("do something").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    let logs = harness.state().logs();
    assert_eq!(logs.last().map(|e| e.kind), Some(LogKind::Error));
    assert_eq!(harness.synth.spoken(), vec![fast_controller().malformed_apology]);
}

#[test]
fn test_empty_reply_speaks_clarification() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_reply(Ok(BackendReply::default()));

    harness.handle.submit_text("hmm").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    assert_eq!(harness.synth.spoken(), vec![fast_controller().not_understood]);
    assert_eq!(harness.state().snapshot().files.len(), 1);
}

#[test]
fn test_reply_field_takes_precedence_over_summary() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_reply(Ok(BackendReply {
        operations: vec![red_button()],
        reply: Some("Here is your red button.".into()),
    }));

    harness.handle.submit_text("create a red button").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    assert_eq!(harness.synth.spoken(), vec!["Here is your red button.".to_string()]);
    assert_eq!(
        harness.state().snapshot().last_reply.as_deref(),
        Some("Here is your red button.")
    );
}

#[test]
fn test_response_file_does_not_steal_selection() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_edits(vec![EditOperation::create(
        "response.md",
        "An answer",
        "Answered.",
    )]);

    harness.handle.submit_text("what is flexbox").unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    let snapshot = harness.state().snapshot();
    assert!(snapshot.files.contains("response.md"));
    assert_eq!(snapshot.selected_path.as_deref(), Some("index.html"));
}

#[test]
fn test_repeated_activation_is_idempotent() {
    let harness = Harness::start(fast_controller());

    harness.handle.start_listening().unwrap();
    harness.handle.start_listening().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.mic.acquisitions(), 1);

    // nothing was said: back to idle with a note, no backend call
    harness.handle.stop_listening().unwrap();
    harness.handle.stop_listening().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_idle()));
    thread::sleep(Duration::from_millis(50));

    assert!(!harness.mic.is_acquired());
    assert!(harness.backend.requests().is_empty());
    assert_eq!(harness.state().log_len(), 1);
}

#[test]
fn test_manual_recording_sends_audio() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_edits(vec![red_button()]);

    harness.handle.toggle_microphone().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    assert!(harness.mic.push(&[0.2; 1600]));
    thread::sleep(Duration::from_millis(30));
    harness.handle.toggle_microphone().unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    assert!(!harness.mic.is_acquired());

    let requests = harness.backend.requests();
    match &requests[0].utterance {
        Utterance::Audio { mime_type, base64 } => {
            assert_eq!(mime_type, "audio/wav");
            assert!(!base64.is_empty());
        }
        other => panic!("expected audio, got {:?}", other),
    }
}

#[test]
fn test_wake_phrase_ignored_while_processing() {
    let harness = Harness::start(fast_controller().with_hands_free(true));
    assert!(harness.wait_for(WAIT, || harness.wake.begins() == 1));

    harness.backend.hold(true);
    harness.backend.push_edits(vec![red_button()]);
    harness.handle.submit_text("create a red button").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_processing()));
    assert!(!harness.wake.is_active());

    harness.wake.emit_result("voice flow", true, 0.95);
    thread::sleep(Duration::from_millis(80));

    let snapshot = harness.state().snapshot();
    assert!(snapshot.interaction.is_processing());
    assert_eq!(snapshot.turn, 1);
    assert!(harness.synth.spoken().is_empty());
    assert!(!snapshot.logs.iter().any(|e| e.message.starts_with("Heard")));

    harness.backend.hold(false);
    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_listening()));
}

#[test]
fn test_wake_phrase_starts_hands_free_loop() {
    let harness = Harness::start(fast_controller().with_hands_free(true));
    assert!(harness.wait_for(WAIT, || harness.wake.is_active()));

    // confident interim hypothesis with a misheard variant
    harness.wake.emit_result("hey Voice Floe", false, 0.8);

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    assert_eq!(harness.synth.spoken(), vec!["Yes?".to_string()]);
    assert!(!harness.wake.is_active());
    assert!(harness.mic.is_acquired());

    harness.backend.push_edits(vec![red_button()]);
    harness.speak_into_mic();

    // silence auto-stop, reply, then listening again without user input
    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_listening()));
    assert_eq!(harness.mic.acquisitions(), 2);
    assert!(harness.backend.requests()[0].utterance.is_audio());
    assert!(harness.state().snapshot().files.contains("button.html"));
}

#[test]
fn test_low_confidence_interim_does_not_wake() {
    let harness = Harness::start(fast_controller().with_hands_free(true));
    assert!(harness.wait_for(WAIT, || harness.wake.is_active()));

    harness.wake.emit_result("voice flow", false, 0.2);
    harness.wake.emit_result("open the file", true, 0.9);
    thread::sleep(Duration::from_millis(80));

    assert!(harness.state().interaction().is_idle());
    assert!(harness.wake.is_active());
    assert!(harness.synth.spoken().is_empty());
}

#[test]
fn test_wake_listener_restarts_after_cycle_end() {
    let harness = Harness::start(fast_controller().with_hands_free(true));
    assert!(harness.wait_for(WAIT, || harness.wake.begins() == 1));

    harness.wake.emit_end();
    assert!(harness.wait_for(WAIT, || harness.wake.begins() == 2));
    assert!(harness.state().interaction().is_idle());
}

#[test]
fn test_permission_denied_disarms_hands_free() {
    let harness = Harness::start(fast_controller());
    harness.wake.deny_permission(true);

    harness.handle.set_hands_free(true).unwrap();

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_error()));
    let snapshot = harness.state().snapshot();
    assert!(!snapshot.hands_free);
    assert!(snapshot
        .logs
        .iter()
        .any(|e| e.kind == LogKind::Error && e.message.contains("denied")));

    // self-heals to idle and does not retry the microphone
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_idle()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.wake.begins(), 0);
}

#[test]
fn test_recorder_permission_denied() {
    let harness = Harness::start(fast_controller());
    harness.mic.deny_permission(true);

    harness.handle.start_listening().unwrap();

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_error()));
    assert!(!harness.mic.is_acquired());
}

#[test]
fn test_activation_during_speech_is_queued() {
    let synth = MockSynth::with_delay(Duration::from_millis(300));
    let harness = Harness::start_with(fast_controller(), synth);
    harness.backend.push_edits(vec![red_button()]);

    harness.handle.submit_text("create a red button").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_speaking()));

    harness.handle.start_listening().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(harness.state().interaction().is_speaking());
    assert_eq!(harness.mic.acquisitions(), 0);

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    assert_eq!(harness.mic.acquisitions(), 1);
}

#[test]
fn test_transcript_path_uses_final_text() {
    let controller = fast_controller().with_capture_path(CapturePath::Transcript);
    let harness = Harness::start(controller);
    harness.backend.push_edits(vec![red_button()]);

    harness.handle.start_listening().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    assert_eq!(harness.transcript.mode(), Some(RecognitionMode::SingleShot));

    harness.transcript.set_final_on_stop("add a red button");
    harness.handle.stop_listening().unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    assert_eq!(
        harness.backend.requests()[0].utterance,
        Utterance::Text("add a red button".into())
    );
    assert_eq!(harness.transcript.stops(), 1);
    assert_eq!(harness.mic.acquisitions(), 0);
}

#[test]
fn test_transcript_without_result_returns_to_idle() {
    let controller = fast_controller().with_capture_path(CapturePath::Transcript);
    let harness = Harness::start(controller);

    harness.handle.start_listening().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    harness
        .transcript
        .emit_error(CaptureError::Transient(voiceflow::capture::TransientKind::NoSpeech));

    assert!(harness.wait_until(WAIT, |s| s.interaction.is_idle()));
    assert!(harness.backend.requests().is_empty());
    assert_eq!(harness.state().snapshot().turn, 0);
}

#[test]
fn test_hands_free_toggle_arms_and_disarms_wake() {
    let harness = Harness::start(fast_controller());
    assert!(!harness.wake.is_active());

    harness.handle.set_hands_free(true).unwrap();
    assert!(harness.wait_for(WAIT, || harness.wake.is_active()));
    assert!(harness.state().hands_free());

    harness.handle.set_hands_free(false).unwrap();
    assert!(harness.wait_for(WAIT, || !harness.wake.is_active()));
    assert!(harness.state().interaction().is_idle());
}

#[test]
fn test_select_file() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_edits(vec![red_button()]);
    harness.handle.submit_text("create a red button").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));

    harness.handle.select_file("index.html").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.selected_path.as_deref() == Some("index.html")));

    harness.handle.select_file("missing.css").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.state().selected_path().as_deref(), Some("index.html"));
}

#[test]
fn test_deleting_selected_file_selects_remaining_one() {
    let harness = Harness::start(fast_controller());
    harness.backend.push_edits(vec![
        EditOperation::create("about.html", "<h1>About</h1>", "Added an about page."),
        EditOperation::create("style.css", "h1 { color: red; }", "Added styles."),
    ]);
    harness.handle.submit_text("add an about page").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));

    harness.handle.select_file("index.html").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.selected_path.as_deref() == Some("index.html")));

    harness
        .backend
        .push_edits(vec![EditOperation::delete("index.html", "Removed the home page.")]);
    harness.handle.submit_text("delete the home page").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.turn == 2 && s.interaction.is_idle()));

    let snapshot = harness.state().snapshot();
    assert!(!snapshot.files.contains("index.html"));
    assert_eq!(snapshot.selected_path.as_deref(), Some("about.html"));
}

/// Transcriber that takes a while, like a network round trip
struct SlowTranscriber {
    delay: Duration,
    text: &'static str,
}

impl Transcriber for SlowTranscriber {
    fn transcribe(&self, _samples: &[f32]) -> voiceflow::Result<String> {
        thread::sleep(self.delay);
        Ok(self.text.to_string())
    }
}

#[test]
fn test_stopped_transcript_waits_for_slow_final_result() {
    let (microphone, mic) = ScriptedMicrophone::new(16000);
    let recognizer = SegmentingRecognizer::new(
        Box::new(microphone),
        Arc::new(SlowTranscriber {
            delay: Duration::from_millis(700),
            text: "make the title blue",
        }),
        RecognizerConfig::default(),
    );
    let controller = fast_controller().with_capture_path(CapturePath::Transcript);
    let harness = Harness::start_with_recognizer(controller, Box::new(recognizer));
    harness.backend.push_edits(vec![red_button()]);

    harness.handle.start_listening().unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_listening()));
    assert!(mic.push(&vec![0.3; 1600]));
    thread::sleep(Duration::from_millis(100));
    harness.handle.stop_listening().unwrap();

    assert!(harness.wait_until(WAIT, |s| s.turn == 1 && s.interaction.is_idle()));
    let requests = harness.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].utterance,
        Utterance::Text("make the title blue".into())
    );
    assert!(!harness
        .state()
        .logs()
        .iter()
        .any(|e| e.message == "Didn't catch that"));
}

#[test]
fn test_stuck_apology_does_not_hold_error() {
    let synth = MockSynth::with_delay(Duration::from_secs(8));
    let harness = Harness::start_with(fast_controller().with_playback_timeout_ms(300), synth);
    harness
        .backend
        .push_reply(Err(VoiceFlowError::Backend("connection refused".into())));

    harness.handle.submit_text("make it blue").unwrap();
    assert!(harness.wait_until(WAIT, |s| s.interaction.is_error()));

    assert!(harness.wait_until(Duration::from_millis(1500), |s| s.interaction.is_idle()));
    assert_eq!(harness.synth.spoken().len(), 1);
}

#[test]
fn test_shutdown_emits_event() {
    let harness = Harness::start(fast_controller());
    harness.handle.shutdown().unwrap();

    let mut saw_shutdown = false;
    while let Some(event) = harness.handle.recv_event_timeout(WAIT) {
        if matches!(event, voiceflow::AppEvent::Shutdown) {
            saw_shutdown = true;
            break;
        }
    }
    assert!(saw_shutdown);
    assert_eq!(harness.state().interaction(), InteractionState::Idle);
}
