//! Shared application state for the Voiceflow assistant
//!
//! The controller is the only writer. The UI and tests read it through
//! `SharedAppState` and drive the system with `AppCommand`s; `AppEvent`s
//! only tell them when to look again.

use crate::files::FileModel;
use crate::messages::{LogBook, LogEntry};
use parking_lot::RwLock;
use std::sync::Arc;

/// The interaction state machine position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionState {
    /// Waiting for activation (wake phrase armed when hands-free)
    #[default]
    Idle,
    /// A capture component holds the microphone
    Listening,
    /// Waiting for the AI backend
    Processing,
    /// A reply or acknowledgement is being spoken
    Speaking,
    /// A failure occurred; returns to Idle after a cool-down
    Error,
}

impl InteractionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, InteractionState::Listening)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, InteractionState::Processing)
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self, InteractionState::Speaking)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InteractionState::Error)
    }
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "Idle"),
            InteractionState::Listening => write!(f, "Listening"),
            InteractionState::Processing => write!(f, "Processing"),
            InteractionState::Speaking => write!(f, "Speaking"),
            InteractionState::Error => write!(f, "Error"),
        }
    }
}

/// Unified application state
#[derive(Clone, Debug)]
pub struct AppState {
    pub interaction: InteractionState,
    pub hands_free: bool,
    pub files: FileModel,
    /// File currently shown in the editor
    pub selected_path: Option<String>,
    pub logs: LogBook,
    /// Turn counter, bumped whenever a new utterance cycle begins
    pub turn: u64,
    /// Most recent assistant reply text
    pub last_reply: Option<String>,
}

impl AppState {
    /// Create a state holding only the bootstrap file
    pub fn new(bootstrap_path: &str, hands_free: bool) -> Self {
        Self {
            interaction: InteractionState::Idle,
            hands_free,
            files: FileModel::with_bootstrap(bootstrap_path),
            selected_path: Some(bootstrap_path.to_string()),
            logs: LogBook::new(),
            turn: 0,
            last_reply: None,
        }
    }

    pub fn snapshot(&self) -> AppStateSnapshot {
        AppStateSnapshot {
            interaction: self.interaction,
            hands_free: self.hands_free,
            files: self.files.clone(),
            selected_path: self.selected_path.clone(),
            logs: self.logs.entries().to_vec(),
            turn: self.turn,
            last_reply: self.last_reply.clone(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new("index.html", false)
    }
}

/// Immutable snapshot of application state: the `{state, files, logs}` model
#[derive(Clone, Debug)]
pub struct AppStateSnapshot {
    pub interaction: InteractionState,
    pub hands_free: bool,
    pub files: FileModel,
    pub selected_path: Option<String>,
    pub logs: Vec<LogEntry>,
    pub turn: u64,
    pub last_reply: Option<String>,
}

/// Thread-safe shared application state
#[derive(Clone)]
pub struct SharedAppState {
    inner: Arc<RwLock<AppState>>,
}

impl Default for SharedAppState {
    fn default() -> Self {
        Self::from_state(AppState::default())
    }
}

impl SharedAppState {
    pub fn new(bootstrap_path: &str, hands_free: bool) -> Self {
        Self::from_state(AppState::new(bootstrap_path, hands_free))
    }

    pub fn from_state(state: AppState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, AppState> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, AppState> {
        self.inner.write()
    }

    /// Snapshot with no lock held after return
    pub fn snapshot(&self) -> AppStateSnapshot {
        self.inner.read().snapshot()
    }

    pub fn interaction(&self) -> InteractionState {
        self.inner.read().interaction
    }

    pub fn hands_free(&self) -> bool {
        self.inner.read().hands_free
    }

    pub fn selected_path(&self) -> Option<String> {
        self.inner.read().selected_path.clone()
    }

    pub fn file_content(&self, path: &str) -> Option<String> {
        self.inner.read().files.get(path).map(|f| f.content.clone())
    }

    pub fn log_len(&self) -> usize {
        self.inner.read().logs.len()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.read().logs.entries().to_vec()
    }
}

/// Requests to the controller
#[derive(Clone, Debug)]
pub enum AppCommand {
    /// Manual microphone activation
    StartListening,
    /// Manual microphone deactivation
    StopListening,
    /// Activation when not listening, deactivation when listening
    ToggleMicrophone,
    /// Typed command, bypasses audio capture
    SubmitText(String),
    /// Turn hands-free mode on or off
    SetHandsFree(bool),
    /// Change the file shown in the editor
    SelectFile(String),
    /// Stop every capture and worker
    Shutdown,
}

/// Notifications for UI repaint and logging
#[derive(Clone, Debug)]
pub enum AppEvent {
    StateChanged(InteractionState),
    Log(LogEntry),
    FilesChanged,
    SelectionChanged(Option<String>),
    HandsFreeChanged(bool),
    Shutdown,
}
