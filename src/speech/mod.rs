//! Speech synthesis and recognition backends

pub mod narrator;
pub mod stt;
pub mod tts;

pub use narrator::SystemNarrator;
pub use stt::{GeminiTranscriber, SegmentingRecognizer, Transcriber};
#[cfg(feature = "whisper")]
pub use stt::WhisperTranscriber;
pub use tts::{clean_for_speech, GeminiSpeech};

use crate::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Turns text into audible speech
///
/// `speak` resolves when playback has finished, or immediately when there
/// is nothing to play.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Synthesizer used when speech output is disabled
pub struct Muted;

#[async_trait]
impl SpeechSynthesizer for Muted {
    async fn speak(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "muted"
    }
}

/// Primary synthesizer with a fallback narrator
///
/// Never fails: when both paths fail the call still resolves so the turn
/// can complete.
pub struct NarratorChain {
    primary: Option<Box<dyn SpeechSynthesizer>>,
    fallback: Box<dyn SpeechSynthesizer>,
}

impl NarratorChain {
    pub fn new(
        primary: Option<Box<dyn SpeechSynthesizer>>,
        fallback: Box<dyn SpeechSynthesizer>,
    ) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SpeechSynthesizer for NarratorChain {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = clean_for_speech(text);
        if text.is_empty() {
            return Ok(());
        }

        if let Some(primary) = &self.primary {
            match primary.speak(&text).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("{} failed, falling back: {}", primary.name(), e),
            }
        }

        if let Err(e) = self.fallback.speak(&text).await {
            warn!("{} failed, reply stays text only: {}", self.fallback.name(), e);
        } else {
            info!("Spoke reply with {}", self.fallback.name());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "chain"
    }
}
