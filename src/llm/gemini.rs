//! Gemini `generateContent` client
//!
//! One HTTP client is shared by the coding backend, cloud transcription and
//! cloud speech; each builds its own request body.

use super::prompts::{build_user_prompt, SYSTEM_PROMPT};
use super::{parse_reply, BackendReply, BackendRequest, CodingBackend, Utterance};
use crate::config::BackendConfig;
use crate::{Result, VoiceFlowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<serde_json::Value>,
}

impl GenerateRequest {
    /// Single user turn built from `parts`
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            system_instruction: None,
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: None,
        }
    }

    pub fn with_system(mut self, text: &str) -> Self {
        self.system_instruction = Some(Content {
            role: None,
            parts: vec![Part::text(text)],
        });
        self
    }

    pub fn with_generation_config(mut self, config: serde_json::Value) -> Self {
        self.generation_config = Some(config);
        self
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn into_parts(self) -> Vec<Part> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Build the client; a missing key only warns, calls then fail
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceFlowError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// POST a request to `model` and return the first candidate's parts
    pub async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<Vec<Part>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VoiceFlowError::Backend("API key is not configured".into()))?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceFlowError::Backend("request timed out".into())
                } else {
                    VoiceFlowError::Backend(format!("connection failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Backend returned {}: {}", status, body);
            return Err(VoiceFlowError::Backend(format!("server error ({})", status)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VoiceFlowError::BackendMalformed(format!("bad response body: {}", e)))?;
        Ok(parsed.into_parts())
    }

    /// Concatenated text of a response
    pub fn joined_text(parts: &[Part]) -> String {
        parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Coding backend on top of Gemini JSON mode
pub struct GeminiBackend {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(config)?,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn client(&self) -> &GeminiClient {
        &self.client
    }

    fn build_request(&self, request: &BackendRequest) -> GenerateRequest {
        let instruction = match &request.utterance {
            Utterance::Text(text) => Some(text.as_str()),
            Utterance::Audio { .. } => None,
        };
        let mut parts = vec![Part::text(build_user_prompt(
            &request.files,
            request.current_path.as_deref(),
            instruction,
        ))];
        if let Utterance::Audio { base64, mime_type } = &request.utterance {
            parts.push(Part::inline(mime_type.clone(), base64.clone()));
        }

        GenerateRequest::user(parts)
            .with_system(SYSTEM_PROMPT)
            .with_generation_config(serde_json::json!({
                "temperature": self.temperature,
                "responseMimeType": "application/json",
            }))
    }
}

#[async_trait]
impl CodingBackend for GeminiBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply> {
        let body = self.build_request(&request);
        info!(
            "Requesting edits ({} files, {} utterance)",
            request.files.len(),
            if request.utterance.is_audio() { "audio" } else { "text" }
        );

        let parts = self.client.generate(&self.model, &body).await?;
        let text = GeminiClient::joined_text(&parts);
        let reply = parse_reply(&text)?;
        info!("Backend returned {} operations", reply.operations.len());
        Ok(reply)
    }
}
