//! Cloud speech synthesis

use super::SpeechSynthesizer;
use crate::audio::pcm16_le_to_f32;
use crate::config::{BackendConfig, SpeechConfig};
use crate::llm::gemini::{GeminiClient, GenerateRequest, Part};
use crate::{Result, VoiceFlowError};
use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, info};

/// Gemini TTS voice played through the default output device
pub struct GeminiSpeech {
    client: GeminiClient,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl GeminiSpeech {
    pub fn new(backend: &BackendConfig, speech: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(backend)?,
            model: speech.model.clone(),
            voice: speech.voice.clone(),
            sample_rate: speech.sample_rate,
        })
    }

    fn build_request(&self, text: &str) -> GenerateRequest {
        GenerateRequest::user(vec![Part::text(text)]).with_generation_config(serde_json::json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": self.voice }
                }
            }
        }))
    }

    /// Fetch PCM for `text`; empty when the service returned no audio
    pub async fn synthesize(&self, text: &str) -> Result<Vec<f32>> {
        let parts = self.client.generate(&self.model, &self.build_request(text)).await?;
        let Some(audio) = parts.iter().find_map(|p| p.inline_data.as_ref()) else {
            debug!("No audio in TTS response");
            return Ok(Vec::new());
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(audio.data.as_bytes())
            .map_err(|e| VoiceFlowError::Speech(format!("Invalid audio payload: {}", e)))?;
        Ok(pcm16_le_to_f32(&bytes))
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        let samples = self.synthesize(text).await?;
        if samples.is_empty() {
            return Ok(());
        }
        info!("Synthesized {} samples", samples.len());
        play(samples, self.sample_rate).await
    }

    fn name(&self) -> &str {
        "cloud voice"
    }
}

#[cfg(feature = "audio-io")]
async fn play(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
    tokio::task::spawn_blocking(move || crate::audio::play_blocking(samples, sample_rate))
        .await
        .map_err(|e| VoiceFlowError::Speech(format!("Playback task failed: {}", e)))?
}

#[cfg(not(feature = "audio-io"))]
async fn play(_samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
    Err(VoiceFlowError::Speech("built without audio output".into()))
}

/// Strip markup that reads badly aloud and collapse whitespace
pub fn clean_for_speech(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_code = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        let line = line.trim_start_matches(|c: char| c == '#' || c == '>' || c == '-' || c.is_whitespace());
        result.push_str(line);
        result.push(' ');
    }

    let result: String = result
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect();
    result
        .replace('&', " and ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
