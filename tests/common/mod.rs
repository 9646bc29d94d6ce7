//! Shared fixtures for controller integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use voiceflow::capture::scripted::{MicrophoneProbe, RecognizerProbe};
use voiceflow::capture::{ScriptedMicrophone, ScriptedRecognizer, SpeechRecognizer};
use voiceflow::config::{ControllerConfig, RecorderConfig};
use voiceflow::files::EditOperation;
use voiceflow::llm::{BackendReply, BackendRequest, CodingBackend};
use voiceflow::speech::SpeechSynthesizer;
use voiceflow::state::AppStateSnapshot;
use voiceflow::{CaptureDevices, Controller, ControllerHandle, Result, SharedAppState, VoiceFlowConfig};

/// Backend answering from a queue of canned replies
#[derive(Clone, Default)]
pub struct MockBackend {
    replies: Arc<Mutex<VecDeque<Result<BackendReply>>>>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
    hold: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn push_reply(&self, reply: Result<BackendReply>) {
        self.replies.lock().push_back(reply);
    }

    pub fn push_edits(&self, operations: Vec<EditOperation>) {
        self.push_reply(Ok(BackendReply {
            operations,
            reply: None,
        }));
    }

    /// While held, calls stay in flight
    pub fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CodingBackend for MockBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply> {
        self.requests.lock().push(request);
        while self.hold.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.replies.lock().pop_front().unwrap_or_else(|| Ok(BackendReply::default()))
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Clone, Default)]
pub struct MockSynth {
    spoken: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl MockSynth {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynth {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Controller settings with short delays
pub fn fast_controller() -> ControllerConfig {
    ControllerConfig::default()
        .with_error_cooldown_ms(200)
        .with_rearm_delay_ms(20)
        .with_settle_delay_ms(100)
}

/// A running controller wired to scripted devices and mocks
pub struct Harness {
    pub handle: ControllerHandle,
    pub backend: MockBackend,
    pub synth: MockSynth,
    pub wake: RecognizerProbe,
    pub transcript: RecognizerProbe,
    pub mic: MicrophoneProbe,
    threads: Vec<JoinHandle<()>>,
}

impl Harness {
    pub fn start(controller: ControllerConfig) -> Self {
        Self::start_with(controller, MockSynth::default())
    }

    pub fn start_with(controller: ControllerConfig, synth: MockSynth) -> Self {
        Self::launch(controller, synth, None)
    }

    /// Start with a real recognizer on the transcript path
    pub fn start_with_recognizer(
        controller: ControllerConfig,
        recognizer: Box<dyn SpeechRecognizer>,
    ) -> Self {
        Self::launch(controller, MockSynth::default(), Some(recognizer))
    }

    fn launch(
        controller: ControllerConfig,
        synth: MockSynth,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
    ) -> Self {
        let (wake_recognizer, wake) = ScriptedRecognizer::new();
        let (scripted_transcript, transcript) = ScriptedRecognizer::new();
        let transcript_recognizer: Box<dyn SpeechRecognizer> = match recognizer {
            Some(recognizer) => recognizer,
            None => Box::new(scripted_transcript),
        };
        let (microphone, mic) = ScriptedMicrophone::new(16000);

        let config = VoiceFlowConfig::default()
            .with_controller(controller)
            .with_recorder(RecorderConfig::default().with_silence_duration_ms(150));
        let backend = MockBackend::default();

        let devices = CaptureDevices {
            wake_recognizer: Box::new(wake_recognizer),
            transcript_recognizer,
            microphone: Box::new(microphone),
        };
        let (controller, handle) = Controller::new(
            config,
            devices,
            Arc::new(backend.clone()),
            Arc::new(synth.clone()),
        );
        let threads = controller.start().expect("controller starts");

        Self {
            handle,
            backend,
            synth,
            wake,
            transcript,
            mic,
            threads,
        }
    }

    pub fn state(&self) -> &SharedAppState {
        self.handle.state()
    }

    /// Poll the shared state until `check` holds or `timeout` passes
    pub fn wait_until<F>(&self, timeout: Duration, check: F) -> bool
    where
        F: Fn(&AppStateSnapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check(&self.state().snapshot()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check(&self.state().snapshot())
    }

    /// Poll an arbitrary condition
    pub fn wait_for<F: Fn() -> bool>(&self, timeout: Duration, check: F) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    /// Speak into the scripted microphone, then go quiet
    pub fn speak_into_mic(&self) {
        let mut seed: u32 = 0x2545_f491;
        let loud: Vec<f32> = (0..1024)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * 0.6
            })
            .collect();
        assert!(self.mic.push(&loud), "microphone should be acquired");
        thread::sleep(Duration::from_millis(60));
        for _ in 0..4 {
            self.mic.push(&[0.0; 256]);
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

pub const WAIT: Duration = Duration::from_secs(3);
