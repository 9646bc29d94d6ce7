//! Error types for the Voiceflow assistant
//!
//! Capture faults have their own taxonomy in [`crate::capture::CaptureError`];
//! this type covers everything that crosses a component boundary as a `Result`.

use thiserror::Error;

/// Voiceflow application errors
#[derive(Error, Debug, Clone)]
pub enum VoiceFlowError {
    /// Audio device initialization or operation error
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Microphone capture could not be started or finalized
    #[error("Capture error: {0}")]
    Capture(String),

    /// The AI backend could not be reached or refused the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// The AI backend answered with something that is not an edit list
    #[error("Malformed backend reply: {0}")]
    BackendMalformed(String),

    /// Speech synthesis or playback error
    #[error("Speech error: {0}")]
    Speech(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    Channel(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// Archive export error
    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<std::io::Error> for VoiceFlowError {
    fn from(e: std::io::Error) -> Self {
        VoiceFlowError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for VoiceFlowError {
    fn from(e: serde_json::Error) -> Self {
        VoiceFlowError::BackendMalformed(e.to_string())
    }
}

impl From<zip::result::ZipError> for VoiceFlowError {
    fn from(e: zip::result::ZipError) -> Self {
        VoiceFlowError::Archive(e.to_string())
    }
}

impl VoiceFlowError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors end the current turn but leave the session usable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            VoiceFlowError::AudioDevice(_) => false,
            VoiceFlowError::Capture(_) => true,
            // Backend failures end the turn, the next one may succeed
            VoiceFlowError::Backend(_) => true,
            VoiceFlowError::BackendMalformed(_) => true,
            VoiceFlowError::Speech(_) => true,
            VoiceFlowError::Config(_) => false,
            // Channel errors indicate internal issues
            VoiceFlowError::Channel(_) => false,
            VoiceFlowError::Io(_) => false,
            VoiceFlowError::Archive(_) => true,
        }
    }

    /// Get a user-friendly description of the error
    pub fn user_message(&self) -> String {
        match self {
            VoiceFlowError::AudioDevice(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            VoiceFlowError::Capture(_) => "Could not capture audio. Please try again.".to_string(),
            VoiceFlowError::Backend(_) => {
                "The assistant could not be reached. Please try again.".to_string()
            }
            VoiceFlowError::BackendMalformed(_) => {
                "The assistant's answer could not be understood.".to_string()
            }
            VoiceFlowError::Speech(_) => {
                "Text-to-speech failed. The reply is shown as text.".to_string()
            }
            VoiceFlowError::Config(_) => "Configuration error. Please check settings.".to_string(),
            VoiceFlowError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            VoiceFlowError::Io(_) => "File system error occurred.".to_string(),
            VoiceFlowError::Archive(_) => "Could not write the project archive.".to_string(),
        }
    }
}

/// Result type alias for Voiceflow operations
pub type Result<T> = std::result::Result<T, VoiceFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_recoverable() {
        assert!(VoiceFlowError::Backend("timeout".into()).is_recoverable());
        assert!(VoiceFlowError::BackendMalformed("not json".into()).is_recoverable());
        assert!(!VoiceFlowError::Channel("closed".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VoiceFlowError = io.into();
        assert!(matches!(err, VoiceFlowError::Io(_)));
        assert_eq!(err.user_message(), "File system error occurred.");
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: VoiceFlowError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, VoiceFlowError::BackendMalformed(_)));
    }
}
