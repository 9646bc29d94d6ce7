//! Wake phrase listener
//!
//! Runs a continuous recognizer while armed and scans every hypothesis for
//! one of the accepted phrase variants. The armed flag alone decides whether
//! a cycle end restarts recognition; `capturing` only tracks whether the
//! recognizer currently holds the microphone.

use super::{
    CaptureError, CaptureSession, RecognitionMode, RecognitionResult, RecognizerEvent,
    RecognizerSignal, SpeechRecognizer,
};
use crate::config::WakeConfig;
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

/// What a recognizer event meant for the listener
#[derive(Clone, Debug, PartialEq)]
pub enum WakeOutcome {
    /// Nothing the controller needs to act on
    Ignored,
    /// The wake phrase was heard; the listener has disarmed itself
    Detected { transcript: String },
    /// A cycle ended while armed and a new one began
    Restarted,
    /// A cycle ended while disarmed
    Stopped,
    /// The listener disarmed itself because of a fatal fault
    Failed(CaptureError),
}

pub struct WakeWordListener {
    recognizer: Box<dyn SpeechRecognizer>,
    phrases: Vec<String>,
    confidence_threshold: f32,
    events: Sender<RecognizerEvent>,
    armed: bool,
    capturing: bool,
    cycle: u64,
    fired: bool,
}

impl WakeWordListener {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        config: &WakeConfig,
        events: Sender<RecognizerEvent>,
    ) -> Self {
        let phrases = config
            .phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            recognizer,
            phrases,
            confidence_threshold: config.confidence_threshold,
            events,
            armed: false,
            capturing: false,
            cycle: 0,
            fired: false,
        }
    }

    /// Arm and begin listening; a no-op when already armed
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.armed {
            return Ok(());
        }
        self.armed = true;
        info!("Wake listener armed");
        self.begin_cycle()
    }

    /// Disarm and hard-abort any running cycle; safe when already stopped
    pub fn stop(&mut self) {
        if !self.armed && !self.capturing {
            return;
        }
        self.armed = false;
        if self.capturing {
            self.capturing = false;
            self.recognizer.abort();
        }
        info!("Wake listener disarmed");
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn begin_cycle(&mut self) -> Result<(), CaptureError> {
        self.cycle += 1;
        self.fired = false;
        match self
            .recognizer
            .begin(self.cycle, RecognitionMode::Continuous, self.events.clone())
        {
            Ok(()) => {
                self.capturing = true;
                debug!("Wake cycle {} started", self.cycle);
                Ok(())
            }
            Err(e) => {
                warn!("Wake cycle {} failed to start: {}", self.cycle, e);
                self.armed = false;
                self.capturing = false;
                Err(e)
            }
        }
    }

    /// Whether a hypothesis counts as the wake phrase
    pub fn matches(&self, result: &RecognitionResult) -> bool {
        let heard = result.transcript.trim().to_lowercase();
        let phrase_present = self.phrases.iter().any(|p| heard.contains(p.as_str()));
        phrase_present && (result.is_final || result.confidence > self.confidence_threshold)
    }

    /// Interpret one recognizer event
    pub fn handle_event(&mut self, event: RecognizerEvent) -> WakeOutcome {
        if event.cycle != self.cycle {
            return WakeOutcome::Ignored;
        }

        match event.signal {
            RecognizerSignal::Result(result) => {
                if self.fired || !self.armed || !self.matches(&result) {
                    return WakeOutcome::Ignored;
                }
                self.fired = true;
                self.armed = false;
                self.capturing = false;
                self.recognizer.abort();
                info!("Wake phrase detected: {:?}", result.transcript);
                WakeOutcome::Detected {
                    transcript: result.transcript,
                }
            }
            RecognizerSignal::End => {
                self.capturing = false;
                if !self.armed {
                    return WakeOutcome::Stopped;
                }
                match self.begin_cycle() {
                    Ok(()) => WakeOutcome::Restarted,
                    Err(e) => WakeOutcome::Failed(e),
                }
            }
            RecognizerSignal::Error(CaptureError::Aborted) => WakeOutcome::Ignored,
            RecognizerSignal::Error(e) if e.is_fatal() => {
                warn!("Wake listener fault: {}", e);
                self.armed = false;
                if self.capturing {
                    self.capturing = false;
                    self.recognizer.abort();
                }
                WakeOutcome::Failed(e)
            }
            RecognizerSignal::Error(e) => {
                debug!("Tolerating wake recognizer error: {}", e);
                WakeOutcome::Ignored
            }
        }
    }
}

impl CaptureSession for WakeWordListener {
    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn release(&mut self) {
        self.stop();
    }
}
