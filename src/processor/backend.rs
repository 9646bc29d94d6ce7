//! Backend worker
//!
//! Runs the coding backend on its own thread with a tokio runtime. Every job
//! carries the turn it belongs to so the controller can drop answers for a
//! turn it has already moved past.

use crate::llm::{BackendReply, BackendRequest, CodingBackend};
use crate::{Result, VoiceFlowError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// One backend call for a turn
#[derive(Debug)]
pub struct BackendJob {
    pub turn: u64,
    pub request: BackendRequest,
}

/// Result of a [`BackendJob`]
#[derive(Debug)]
pub struct BackendOutcome {
    pub turn: u64,
    pub result: Result<BackendReply>,
}

#[derive(Debug)]
pub enum BackendCommand {
    Generate(BackendJob),
    Shutdown,
}

#[derive(Debug)]
pub enum BackendEvent {
    Finished(BackendOutcome),
    Shutdown,
}

/// Handle to a running backend worker
pub struct BackendHandle {
    pub command_tx: Sender<BackendCommand>,
    pub event_rx: Receiver<BackendEvent>,
    pub worker_handle: Option<JoinHandle<()>>,
}

pub struct BackendRunner {
    backend: Arc<dyn CodingBackend>,
    capacity: usize,
}

impl BackendRunner {
    pub fn new(backend: Arc<dyn CodingBackend>, capacity: usize) -> Self {
        Self { backend, capacity }
    }

    /// Start the worker thread
    pub fn start_worker(self) -> Result<BackendHandle> {
        let (command_tx, command_rx) = bounded::<BackendCommand>(self.capacity);
        let (event_tx, event_rx) = bounded::<BackendEvent>(self.capacity);
        let backend = self.backend;

        let worker_handle = std::thread::Builder::new()
            .name("voiceflow-backend".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create backend runtime: {}", e);
                        let _ = event_tx.send(BackendEvent::Shutdown);
                        return;
                    }
                };
                runtime.block_on(worker_loop(backend, command_rx, event_tx));
            })
            .map_err(|e| VoiceFlowError::Backend(format!("Failed to spawn backend worker: {}", e)))?;

        Ok(BackendHandle {
            command_tx,
            event_rx,
            worker_handle: Some(worker_handle),
        })
    }
}

async fn worker_loop(
    backend: Arc<dyn CodingBackend>,
    command_rx: Receiver<BackendCommand>,
    event_tx: Sender<BackendEvent>,
) {
    info!("Backend worker started");

    loop {
        let command = match command_rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => {
                info!("Backend command channel closed, shutting down");
                break;
            }
        };

        match command {
            BackendCommand::Generate(job) => {
                debug!("Backend job for turn {}", job.turn);
                let result = backend.generate(job.request).await;
                if let Err(e) = &result {
                    debug!("Backend job for turn {} failed: {}", job.turn, e);
                }
                let outcome = BackendOutcome {
                    turn: job.turn,
                    result,
                };
                if event_tx.send(BackendEvent::Finished(outcome)).is_err() {
                    break;
                }
            }
            BackendCommand::Shutdown => {
                let _ = event_tx.send(BackendEvent::Shutdown);
                break;
            }
        }
    }

    info!("Backend worker stopped");
}
