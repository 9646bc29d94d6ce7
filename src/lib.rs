//! Voiceflow: a voice-driven coding assistant
//!
//! Speech is captured through a wake phrase or push-to-talk, sent to an AI
//! backend together with a snapshot of an in-memory project, and the
//! returned edits are applied and summarised aloud.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod files;
pub mod llm;
pub mod messages;
pub mod processor;
pub mod speech;
pub mod state;

pub use config::VoiceFlowConfig;
pub use error::{Result, VoiceFlowError};
pub use processor::{CaptureDevices, Controller, ControllerHandle};
pub use state::{AppCommand, AppEvent, InteractionState, SharedAppState};
