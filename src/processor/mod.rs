//! Concurrent processing
//!
//! The controller thread runs the interaction state machine. The backend and
//! speech workers each own a tokio runtime and talk to it over crossbeam
//! channels.

pub mod backend;
pub mod controller;
pub mod speech;

pub use backend::{BackendJob, BackendOutcome, BackendRunner};
pub use controller::{CaptureDevices, Controller, ControllerHandle};
pub use speech::{SpeechJob, SpeechRunner};

use std::time::Duration;

pub(crate) const CHANNEL_CAPACITY: usize = 100;

/// How long shutdown waits for workers to confirm
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Controller timer resolution
pub(crate) const TICK: Duration = Duration::from_millis(10);
