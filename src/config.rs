//! Configuration for all Voiceflow components
//!
//! Every section has sensible defaults so an absent or partial TOML file is
//! valid. The backend credential is read from the environment, never from
//! the file.

use crate::{Result, VoiceFlowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Wake phrase detection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Accepted activation phrases, including common mishearings
    pub phrases: Vec<String>,
    /// Minimum confidence for accepting a non-final result
    pub confidence_threshold: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: [
                "voice flow",
                "voiceflow",
                "voice flo",
                "boys flow",
                "choice flow",
                "voice slow",
                "voice floe",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            confidence_threshold: 0.45,
        }
    }
}

/// Push-to-talk recorder and silence auto-stop settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Mean spectrum magnitude (0-255) that counts as speech
    pub speech_threshold: f32,
    /// Mean spectrum magnitude (0-255) below which input counts as silence
    pub silence_threshold: f32,
    /// Trailing silence required before auto-stop fires
    pub silence_duration_ms: u64,
    /// Energy monitor tick interval
    pub tick_ms: u64,
    /// FFT window used by the spectrum analyser
    pub fft_size: usize,
    /// Clip container preference, first supported wins
    pub preferred_mime_types: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 30.0,
            silence_threshold: 15.0,
            silence_duration_ms: 1800,
            tick_ms: 16,
            fft_size: 256,
            preferred_mime_types: crate::capture::mime::PREFERRED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl RecorderConfig {
    /// Set the hysteresis thresholds
    pub fn with_thresholds(mut self, speech: f32, silence: f32) -> Self {
        self.speech_threshold = speech;
        self.silence_threshold = silence;
        self
    }

    /// Set the trailing silence window
    pub fn with_silence_duration_ms(mut self, ms: u64) -> Self {
        self.silence_duration_ms = ms;
        self
    }

    /// Validate threshold ordering
    pub fn validate(&self) -> Result<()> {
        if self.speech_threshold <= self.silence_threshold {
            return Err(VoiceFlowError::Config(format!(
                "speech threshold {} must exceed silence threshold {}",
                self.speech_threshold, self.silence_threshold
            )));
        }
        if !self.fft_size.is_power_of_two() {
            return Err(VoiceFlowError::Config(format!(
                "fft size {} must be a power of two",
                self.fft_size
            )));
        }
        Ok(())
    }
}

/// Which component captures the utterance after activation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePath {
    /// Record raw audio and send it to the backend
    #[default]
    Audio,
    /// Transcribe locally and send text
    Transcript,
}

/// Conversation controller settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Start with hands-free mode enabled
    pub hands_free: bool,
    /// Capture component used after activation
    pub capture_path: CapturePath,
    /// Time spent in Error before returning to Idle
    pub error_cooldown_ms: u64,
    /// Pause between the end of a reply and re-opening capture
    pub rearm_delay_ms: u64,
    /// Wait after a manual transcript stop for the final result
    pub settle_delay_ms: u64,
    /// Longest wait for a stopped recognizer that is still transcribing
    pub settle_timeout_ms: u64,
    /// Playback that runs longer than this is treated as finished
    pub playback_timeout_ms: u64,
    /// Spoken after the wake phrase is heard
    pub acknowledgement: String,
    /// Spoken when the backend reply contains no edits
    pub not_understood: String,
    /// Spoken when the backend reply cannot be parsed
    pub malformed_apology: String,
    /// Spoken when the backend call fails
    pub error_apology: String,
    /// Whether the failure apology is spoken at all
    pub speak_error_apology: bool,
    /// File present at session start
    pub bootstrap_path: String,
    /// Reserved answer-only file that never takes the selection
    pub response_path: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hands_free: false,
            capture_path: CapturePath::Audio,
            error_cooldown_ms: 3000,
            rearm_delay_ms: 500,
            settle_delay_ms: 400,
            settle_timeout_ms: 15_000,
            playback_timeout_ms: 120_000,
            acknowledgement: "Yes?".to_string(),
            not_understood: "Sorry, I didn't understand what to change.".to_string(),
            malformed_apology: "Sorry, I couldn't make sense of that answer.".to_string(),
            error_apology: "Sorry, something went wrong.".to_string(),
            speak_error_apology: true,
            bootstrap_path: "index.html".to_string(),
            response_path: "response.md".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Enable or disable hands-free mode at start
    pub fn with_hands_free(mut self, enabled: bool) -> Self {
        self.hands_free = enabled;
        self
    }

    /// Select the capture path
    pub fn with_capture_path(mut self, path: CapturePath) -> Self {
        self.capture_path = path;
        self
    }

    /// Set the error cool-down
    pub fn with_error_cooldown_ms(mut self, ms: u64) -> Self {
        self.error_cooldown_ms = ms;
        self
    }

    /// Set the hands-free re-arm delay
    pub fn with_rearm_delay_ms(mut self, ms: u64) -> Self {
        self.rearm_delay_ms = ms;
        self
    }

    /// Set the transcript settle delay
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Set the upper bound on waiting for a stopped recognizer
    pub fn with_settle_timeout_ms(mut self, ms: u64) -> Self {
        self.settle_timeout_ms = ms;
        self
    }

    /// Set the cap on a single playback
    pub fn with_playback_timeout_ms(mut self, ms: u64) -> Self {
        self.playback_timeout_ms = ms;
        self
    }
}

/// AI backend settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Generative model identifier
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
            temperature: 0.4,
        }
    }
}

impl BackendConfig {
    /// Read the API key from the environment
    ///
    /// Absence is tolerated: a warning is logged and `None` returned.
    pub fn api_key(&self) -> Option<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                warn!(
                    "{} is not set; backend calls will fail until it is provided",
                    self.api_key_env
                );
                None
            }
        }
    }
}

/// Speech synthesis settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether replies are spoken at all
    pub enabled: bool,
    /// Cloud TTS model
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// Sample rate of the PCM returned by the TTS model
    pub sample_rate: u32,
    /// Narrator program override for the fallback path
    pub narrator_command: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Kore".to_string(),
            sample_rate: 24000,
            narrator_command: None,
        }
    }
}

/// Native speech recognizer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// RMS level that counts as voiced input
    pub energy_threshold: f32,
    /// Trailing silence that ends an utterance
    pub end_silence_ms: u64,
    /// A continuous cycle ends on its own after this long
    pub max_cycle_secs: u64,
    /// A single-shot cycle gives up after this long without speech
    pub no_speech_timeout_secs: u64,
    /// Interval between interim transcriptions while speech continues
    pub interim_interval_ms: u64,
    /// Whisper model file (local transcription only)
    pub whisper_model_path: PathBuf,
    /// Transcription language
    pub language: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.015,
            end_silence_ms: 700,
            max_cycle_secs: 30,
            no_speech_timeout_secs: 8,
            interim_interval_ms: 1200,
            whisper_model_path: PathBuf::from("models/ggml-base.en.bin"),
            language: "en".to_string(),
        }
    }
}

/// Configuration for the complete assistant
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceFlowConfig {
    pub wake: WakeConfig,
    pub recorder: RecorderConfig,
    pub controller: ControllerConfig,
    pub backend: BackendConfig,
    pub speech: SpeechConfig,
    pub recognizer: RecognizerConfig,
}

impl VoiceFlowConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voiceflow").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoiceFlowError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            VoiceFlowError::Config(msg) => {
                VoiceFlowError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, else from the default location if it
    /// exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.is_file() => Self::load(default),
            _ => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: VoiceFlowConfig =
            toml::from_str(content).map_err(|e| VoiceFlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.recorder.validate()?;
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(VoiceFlowError::Config("at least one wake phrase is required".into()));
        }
        if !(0.0..=1.0).contains(&self.wake.confidence_threshold) {
            return Err(VoiceFlowError::Config(format!(
                "wake confidence threshold {} outside 0..=1",
                self.wake.confidence_threshold
            )));
        }
        Ok(())
    }

    /// Set the controller section
    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }

    /// Set the recorder section
    pub fn with_recorder(mut self, recorder: RecorderConfig) -> Self {
        self.recorder = recorder;
        self
    }
}
