//! Scripted capture devices
//!
//! Stand-ins for a real recognizer and microphone. A probe handle lets the
//! owner inject results and frames and inspect how the device was driven.
//! Used by the headless build and by tests.

use super::{
    CaptureError, Microphone, RecognitionMode, RecognitionResult, RecognizerEvent,
    RecognizerSignal, SpeechRecognizer,
};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct RecognizerScript {
    sender: Option<Sender<RecognizerEvent>>,
    cycle: u64,
    mode: Option<RecognitionMode>,
    active: bool,
    begins: usize,
    aborts: usize,
    stops: usize,
    deny: bool,
    final_on_stop: Option<String>,
}

/// Recognizer driven entirely through its [`RecognizerProbe`]
pub struct ScriptedRecognizer {
    script: Arc<Mutex<RecognizerScript>>,
}

/// Control and inspection handle for a [`ScriptedRecognizer`]
#[derive(Clone)]
pub struct RecognizerProbe {
    script: Arc<Mutex<RecognizerScript>>,
}

impl ScriptedRecognizer {
    pub fn new() -> (Self, RecognizerProbe) {
        let script = Arc::new(Mutex::new(RecognizerScript::default()));
        (
            Self {
                script: Arc::clone(&script),
            },
            RecognizerProbe { script },
        )
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn begin(
        &mut self,
        cycle: u64,
        mode: RecognitionMode,
        events: Sender<RecognizerEvent>,
    ) -> Result<(), CaptureError> {
        let mut script = self.script.lock();
        if script.deny {
            return Err(CaptureError::PermissionDenied);
        }
        script.sender = Some(events);
        script.cycle = cycle;
        script.mode = Some(mode);
        script.active = true;
        script.begins += 1;
        Ok(())
    }

    fn abort(&mut self) {
        let mut script = self.script.lock();
        script.aborts += 1;
        if !script.active {
            return;
        }
        script.active = false;
        let cycle = script.cycle;
        if let Some(tx) = &script.sender {
            let _ = tx.send(RecognizerEvent::new(cycle, RecognizerSignal::Error(CaptureError::Aborted)));
            let _ = tx.send(RecognizerEvent::new(cycle, RecognizerSignal::End));
        }
    }

    fn stop(&mut self) {
        let mut script = self.script.lock();
        script.stops += 1;
        if !script.active {
            return;
        }
        script.active = false;
        let cycle = script.cycle;
        let pending = script.final_on_stop.take();
        if let Some(tx) = &script.sender {
            if let Some(text) = pending {
                let _ = tx.send(RecognizerEvent::new(
                    cycle,
                    RecognizerSignal::Result(RecognitionResult::final_result(text, 0.9)),
                ));
            }
            let _ = tx.send(RecognizerEvent::new(cycle, RecognizerSignal::End));
        }
    }
}

impl RecognizerProbe {
    fn send(&self, signal: RecognizerSignal) {
        let script = self.script.lock();
        if let Some(tx) = &script.sender {
            let _ = tx.send(RecognizerEvent::new(script.cycle, signal));
        }
    }

    /// Deliver a hypothesis for the latest cycle
    pub fn emit_result(&self, transcript: &str, is_final: bool, confidence: f32) {
        self.send(RecognizerSignal::Result(RecognitionResult {
            transcript: transcript.to_string(),
            is_final,
            confidence,
        }));
    }

    /// End the latest cycle the way a recognizer does on its own
    pub fn emit_end(&self) {
        self.script.lock().active = false;
        self.send(RecognizerSignal::End);
    }

    pub fn emit_error(&self, error: CaptureError) {
        self.send(RecognizerSignal::Error(error));
    }

    /// Deliver a signal tagged with an arbitrary cycle
    pub fn emit_for_cycle(&self, cycle: u64, signal: RecognizerSignal) {
        let script = self.script.lock();
        if let Some(tx) = &script.sender {
            let _ = tx.send(RecognizerEvent::new(cycle, signal));
        }
    }

    /// Refuse every following `begin` with a permission error
    pub fn deny_permission(&self, deny: bool) {
        self.script.lock().deny = deny;
    }

    /// Final transcript delivered when the next graceful stop happens
    pub fn set_final_on_stop(&self, transcript: &str) {
        self.script.lock().final_on_stop = Some(transcript.to_string());
    }

    pub fn is_active(&self) -> bool {
        self.script.lock().active
    }

    pub fn cycle(&self) -> u64 {
        self.script.lock().cycle
    }

    pub fn mode(&self) -> Option<RecognitionMode> {
        self.script.lock().mode
    }

    pub fn begins(&self) -> usize {
        self.script.lock().begins
    }

    pub fn aborts(&self) -> usize {
        self.script.lock().aborts
    }

    pub fn stops(&self) -> usize {
        self.script.lock().stops
    }
}

#[derive(Default)]
struct MicrophoneScript {
    sender: Option<Sender<Vec<f32>>>,
    acquisitions: usize,
    releases: usize,
    deny: bool,
}

/// Microphone whose frames come from its [`MicrophoneProbe`]
pub struct ScriptedMicrophone {
    script: Arc<Mutex<MicrophoneScript>>,
    sample_rate: u32,
}

/// Control and inspection handle for a [`ScriptedMicrophone`]
#[derive(Clone)]
pub struct MicrophoneProbe {
    script: Arc<Mutex<MicrophoneScript>>,
}

impl ScriptedMicrophone {
    pub fn new(sample_rate: u32) -> (Self, MicrophoneProbe) {
        let script = Arc::new(Mutex::new(MicrophoneScript::default()));
        (
            Self {
                script: Arc::clone(&script),
                sample_rate,
            },
            MicrophoneProbe { script },
        )
    }
}

impl Microphone for ScriptedMicrophone {
    fn acquire(&mut self, frames: Sender<Vec<f32>>) -> Result<(), CaptureError> {
        let mut script = self.script.lock();
        if script.deny {
            return Err(CaptureError::PermissionDenied);
        }
        script.sender = Some(frames);
        script.acquisitions += 1;
        Ok(())
    }

    fn release(&mut self) {
        let mut script = self.script.lock();
        if script.sender.take().is_some() {
            script.releases += 1;
        }
    }

    fn is_acquired(&self) -> bool {
        self.script.lock().sender.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl MicrophoneProbe {
    /// Feed frames; returns false when the microphone is not acquired
    pub fn push(&self, frames: &[f32]) -> bool {
        match &self.script.lock().sender {
            Some(tx) => tx.send(frames.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn deny_permission(&self, deny: bool) {
        self.script.lock().deny = deny;
    }

    pub fn is_acquired(&self) -> bool {
        self.script.lock().sender.is_some()
    }

    pub fn acquisitions(&self) -> usize {
        self.script.lock().acquisitions
    }

    pub fn releases(&self) -> usize {
        self.script.lock().releases
    }
}
