//! Audio capture components
//!
//! Three components can hold the microphone: the wake-word listener, the
//! push-to-talk recorder and the transcript listener. They never share it;
//! the controller stops every other holder before starting one.
//!
//! Recognizers and microphones are traits so the controller can run against
//! real devices or the scripted doubles in [`scripted`].

pub mod mime;
pub mod recorder;
pub mod scripted;
pub mod transcript;
pub mod wake;

pub use mime::{select_mime_type, PREFERRED_MIME_TYPES};
pub use recorder::{EncodedClip, PushToTalkRecorder, SilenceDetected, SilenceDetector};
pub use scripted::{ScriptedMicrophone, ScriptedRecognizer};
pub use transcript::{TranscriptListener, TranscriptOutcome};
pub use wake::{WakeOutcome, WakeWordListener};

use crossbeam_channel::Sender;
use thiserror::Error;

/// Non-fatal recognizer faults
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransientKind {
    /// No speech was heard before the recognizer gave up
    NoSpeech,
    /// Transcription service unreachable
    Network,
    Other(String),
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientKind::NoSpeech => write!(f, "no speech"),
            TransientKind::Network => write!(f, "network"),
            TransientKind::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Capture fault taxonomy
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or platform refused microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The capture was deliberately aborted; never surfaced to the user
    #[error("capture aborted")]
    Aborted,

    /// Recoverable recognizer fault
    #[error("transient recognizer error: {0}")]
    Transient(TransientKind),

    /// No usable input device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl CaptureError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied)
    }

    /// Faults that end the session's use of the microphone
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied | CaptureError::DeviceUnavailable(_)
        )
    }
}

impl From<CaptureError> for crate::VoiceFlowError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::DeviceUnavailable(msg) => crate::VoiceFlowError::AudioDevice(msg),
            other => crate::VoiceFlowError::Capture(other.to_string()),
        }
    }
}

/// How a recognizer cycle behaves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Keep listening with interim results until aborted or the cycle ends
    Continuous,
    /// One utterance, final results only
    SingleShot,
}

/// A single recognition hypothesis
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
    /// Recognizer confidence in 0..=1
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn interim(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
            confidence,
        }
    }

    pub fn final_result(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
            confidence,
        }
    }
}

/// What a recognizer reports during a cycle
#[derive(Clone, Debug, PartialEq)]
pub enum RecognizerSignal {
    Result(RecognitionResult),
    /// The cycle ended, naturally or after stop/abort
    End,
    Error(CaptureError),
}

/// A recognizer signal tagged with the cycle that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct RecognizerEvent {
    pub cycle: u64,
    pub signal: RecognizerSignal,
}

impl RecognizerEvent {
    pub fn new(cycle: u64, signal: RecognizerSignal) -> Self {
        Self { cycle, signal }
    }
}

/// A platform speech recognizer
///
/// Every cycle started with `begin` must eventually deliver exactly one
/// `RecognizerSignal::End` for that cycle, after stop, abort or on its own.
pub trait SpeechRecognizer: Send {
    fn begin(
        &mut self,
        cycle: u64,
        mode: RecognitionMode,
        events: Sender<RecognizerEvent>,
    ) -> Result<(), CaptureError>;

    /// Hard stop, pending results are discarded
    fn abort(&mut self);

    /// Graceful stop, a final result may still be delivered before End
    fn stop(&mut self);
}

/// A raw microphone stream of mono frames
pub trait Microphone: Send {
    /// Start streaming frames into `frames`
    fn acquire(&mut self, frames: Sender<Vec<f32>>) -> Result<(), CaptureError>;

    /// Stop streaming; the frame sender given to `acquire` must be dropped
    fn release(&mut self);

    fn is_acquired(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

/// Shared view of a capture component for microphone ownership checks
pub trait CaptureSession {
    /// Whether the component currently holds the microphone
    fn is_capturing(&self) -> bool;

    /// Give up the microphone, discarding anything in flight
    fn release(&mut self);
}
