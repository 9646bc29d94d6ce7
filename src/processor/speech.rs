//! Speech worker
//!
//! Plays one utterance at a time and reports completion by id. A job is
//! finished when playback has resolved, whether or not any audio came out.

use crate::speech::SpeechSynthesizer;
use crate::{Result, VoiceFlowError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeechJob {
    pub id: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechCommand {
    Speak(SpeechJob),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Playback for this job id resolved
    Finished { id: u64 },
    Shutdown,
}

pub struct SpeechHandle {
    pub command_tx: Sender<SpeechCommand>,
    pub event_rx: Receiver<SpeechEvent>,
    pub worker_handle: Option<JoinHandle<()>>,
}

pub struct SpeechRunner {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    capacity: usize,
    playback_timeout: Duration,
}

impl SpeechRunner {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        capacity: usize,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            capacity,
            playback_timeout,
        }
    }

    pub fn start_worker(self) -> Result<SpeechHandle> {
        let (command_tx, command_rx) = bounded::<SpeechCommand>(self.capacity);
        let (event_tx, event_rx) = bounded::<SpeechEvent>(self.capacity);
        let synthesizer = self.synthesizer;
        let playback_timeout = self.playback_timeout;

        let worker_handle = std::thread::Builder::new()
            .name("voiceflow-speech".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create speech runtime: {}", e);
                        let _ = event_tx.send(SpeechEvent::Shutdown);
                        return;
                    }
                };
                runtime.block_on(worker_loop(synthesizer, playback_timeout, command_rx, event_tx));
            })
            .map_err(|e| VoiceFlowError::Speech(format!("Failed to spawn speech worker: {}", e)))?;

        Ok(SpeechHandle {
            command_tx,
            event_rx,
            worker_handle: Some(worker_handle),
        })
    }
}

async fn worker_loop(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback_timeout: Duration,
    command_rx: Receiver<SpeechCommand>,
    event_tx: Sender<SpeechEvent>,
) {
    info!("Speech worker started ({})", synthesizer.name());

    while let Ok(command) = command_rx.recv() {
        match command {
            SpeechCommand::Speak(job) => {
                debug!("Speaking #{}: {:?}", job.id, job.text);
                match tokio::time::timeout(playback_timeout, synthesizer.speak(&job.text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Speech #{} failed: {}", job.id, e),
                    Err(_) => warn!(
                        "Speech #{} still playing after {:?}, giving up",
                        job.id, playback_timeout
                    ),
                }
                if event_tx.send(SpeechEvent::Finished { id: job.id }).is_err() {
                    break;
                }
            }
            SpeechCommand::Shutdown => {
                let _ = event_tx.send(SpeechEvent::Shutdown);
                break;
            }
        }
    }

    info!("Speech worker stopped");
}
