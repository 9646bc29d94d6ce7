//! AI backend adapter
//!
//! The controller talks to a [`CodingBackend`]: given an utterance and a file
//! snapshot it returns edit operations plus an optional conversational reply.

pub mod gemini;
pub mod parse;
pub mod prompts;

pub use gemini::{GeminiBackend, GeminiClient};
pub use parse::parse_reply;

use crate::files::{EditOperation, FileSnapshot};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// What the user said or typed for one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Utterance {
    Text(String),
    Audio { base64: String, mime_type: String },
}

impl Utterance {
    pub fn is_audio(&self) -> bool {
        matches!(self, Utterance::Audio { .. })
    }

    /// Short form for the user log
    pub fn describe(&self) -> String {
        match self {
            Utterance::Text(text) => text.clone(),
            Utterance::Audio { mime_type, base64 } => {
                format!("(voice message, {} bytes {})", base64.len() * 3 / 4, mime_type)
            }
        }
    }
}

/// One backend call
#[derive(Clone, Debug)]
pub struct BackendRequest {
    pub utterance: Utterance,
    pub files: BTreeMap<String, FileSnapshot>,
    pub current_path: Option<String>,
}

/// Parsed backend answer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendReply {
    pub operations: Vec<EditOperation>,
    /// Dedicated conversational reply; takes precedence over operation summaries
    pub reply: Option<String>,
}

impl BackendReply {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[async_trait]
pub trait CodingBackend: Send + Sync {
    /// Produce edits for an utterance
    ///
    /// Transport failures are `VoiceFlowError::Backend`; unparseable answers
    /// are `VoiceFlowError::BackendMalformed`.
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply>;
}
