//! Platform narrator fallback
//!
//! Speaks through whatever text-to-speech program the OS provides and waits
//! for it to exit, so completion is observable like any other playback.

use super::SpeechSynthesizer;
use crate::{Result, VoiceFlowError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A narrator program and the arguments placed before the text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarratorProgram {
    pub program: String,
    pub args: Vec<String>,
}

impl NarratorProgram {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub struct SystemNarrator {
    candidates: Vec<NarratorProgram>,
}

impl SystemNarrator {
    /// Use `command` if given (split on whitespace), else the platform defaults
    pub fn new(command: Option<&str>) -> Self {
        let candidates = match command.map(str::split_whitespace) {
            Some(mut parts) => match parts.next() {
                Some(program) => vec![NarratorProgram {
                    program: program.to_string(),
                    args: parts.map(str::to_string).collect(),
                }],
                None => Self::platform_defaults(),
            },
            None => Self::platform_defaults(),
        };
        Self { candidates }
    }

    pub fn candidates(&self) -> &[NarratorProgram] {
        &self.candidates
    }

    fn platform_defaults() -> Vec<NarratorProgram> {
        if cfg!(target_os = "macos") {
            vec![NarratorProgram::new("say", &[])]
        } else if cfg!(target_os = "windows") {
            vec![NarratorProgram::new(
                "powershell",
                &[
                    "-NoProfile",
                    "-Command",
                    "Add-Type -AssemblyName System.Speech; (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak($args[0])",
                ],
            )]
        } else {
            vec![
                NarratorProgram::new("espeak-ng", &[]),
                NarratorProgram::new("espeak", &[]),
                NarratorProgram::new("spd-say", &["--wait"]),
            ]
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for SystemNarrator {
    async fn speak(&self, text: &str) -> Result<()> {
        for candidate in &self.candidates {
            let status = Command::new(&candidate.program)
                .args(&candidate.args)
                .arg(text)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await;

            match status {
                Ok(status) if status.success() => return Ok(()),
                Ok(status) => {
                    return Err(VoiceFlowError::Speech(format!(
                        "{} exited with {}",
                        candidate.program, status
                    )))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Narrator {} not installed", candidate.program);
                }
                Err(e) => {
                    return Err(VoiceFlowError::Speech(format!(
                        "Failed to run {}: {}",
                        candidate.program, e
                    )))
                }
            }
        }
        Err(VoiceFlowError::Speech("no narrator program available".into()))
    }

    fn name(&self) -> &str {
        "system narrator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_override() {
        let narrator = SystemNarrator::new(Some("festival --tts"));
        assert_eq!(
            narrator.candidates(),
            &[NarratorProgram::new("festival", &["--tts"])]
        );
    }

    #[test]
    fn test_blank_override_uses_defaults() {
        assert!(!SystemNarrator::new(Some("  ")).candidates().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let narrator = SystemNarrator::new(Some("voiceflow-no-such-narrator-binary"));
        assert!(matches!(
            narrator.speak("hello").await,
            Err(VoiceFlowError::Speech(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_waits_for_completion() {
        let narrator = SystemNarrator::new(Some("true"));
        assert!(narrator.speak("hello").await.is_ok());
    }
}
