//! Conversation controller
//!
//! The controller thread owns the interaction state machine and the three
//! capture components. It is the only writer of [`SharedAppState`] and the
//! only place the microphone changes hands: every capture start first
//! releases whichever other component still holds it.
//!
//! Results from workers and recognizers are tagged (turn, speech id,
//! recognizer cycle, recording session) and re-checked against the current
//! state before they are acted on.

use super::backend::{BackendCommand, BackendEvent, BackendJob, BackendOutcome, BackendRunner};
use super::speech::{SpeechCommand, SpeechEvent, SpeechJob, SpeechRunner};
use super::{CHANNEL_CAPACITY, SHUTDOWN_TIMEOUT, TICK};
use crate::capture::{
    CaptureError, CaptureSession, Microphone, PushToTalkRecorder, RecognizerEvent,
    SilenceDetected, SpeechRecognizer, TranscriptListener, TranscriptOutcome, WakeOutcome,
    WakeWordListener,
};
use crate::config::{CapturePath, ControllerConfig, VoiceFlowConfig};
use crate::files::apply_operations;
use crate::llm::{BackendReply, BackendRequest, CodingBackend, Utterance};
use crate::messages::{LogEntry, LogKind};
use crate::speech::SpeechSynthesizer;
use crate::state::{AppCommand, AppEvent, AppState, InteractionState, SharedAppState};
use crate::{Result, VoiceFlowError};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Hardware seams handed to the controller
pub struct CaptureDevices {
    /// Continuous recognizer used for the wake phrase
    pub wake_recognizer: Box<dyn SpeechRecognizer>,
    /// Single-shot recognizer for the transcript capture path
    pub transcript_recognizer: Box<dyn SpeechRecognizer>,
    /// Raw input for push-to-talk recording
    pub microphone: Box<dyn Microphone>,
}

/// Handle for driving a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: Sender<AppCommand>,
    event_rx: Receiver<AppEvent>,
    state: SharedAppState,
}

impl ControllerHandle {
    pub fn send_command(&self, command: AppCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| VoiceFlowError::Channel(format!("Failed to send command: {}", e)))
    }

    pub fn start_listening(&self) -> Result<()> {
        self.send_command(AppCommand::StartListening)
    }

    pub fn stop_listening(&self) -> Result<()> {
        self.send_command(AppCommand::StopListening)
    }

    pub fn toggle_microphone(&self) -> Result<()> {
        self.send_command(AppCommand::ToggleMicrophone)
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(AppCommand::SubmitText(text.into()))
    }

    pub fn set_hands_free(&self, enabled: bool) -> Result<()> {
        self.send_command(AppCommand::SetHandsFree(enabled))
    }

    pub fn select_file(&self, path: impl Into<String>) -> Result<()> {
        self.send_command(AppCommand::SelectFile(path.into()))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(AppCommand::Shutdown)
    }

    /// Next pending notification, if any
    pub fn try_recv_event(&self) -> Option<AppEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until the next notification; `None` once the controller is gone
    pub fn recv_event(&self) -> Option<AppEvent> {
        self.event_rx.recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<AppEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn state(&self) -> &SharedAppState {
        &self.state
    }
}

/// The conversation controller before it is started
pub struct Controller {
    config: VoiceFlowConfig,
    state: SharedAppState,
    command_rx: Receiver<AppCommand>,
    event_tx: Sender<AppEvent>,
    devices: CaptureDevices,
    backend: Arc<dyn CodingBackend>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Controller {
    /// Create a controller with fresh state holding the bootstrap file
    pub fn new(
        config: VoiceFlowConfig,
        devices: CaptureDevices,
        backend: Arc<dyn CodingBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> (Self, ControllerHandle) {
        let state = SharedAppState::from_state(AppState::new(
            &config.controller.bootstrap_path,
            config.controller.hands_free,
        ));
        Self::with_state(config, state, devices, backend, synthesizer)
    }

    /// Create a controller around existing state
    pub fn with_state(
        config: VoiceFlowConfig,
        state: SharedAppState,
        devices: CaptureDevices,
        backend: Arc<dyn CodingBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = bounded(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded(CHANNEL_CAPACITY);

        let handle = ControllerHandle {
            command_tx,
            event_rx,
            state: state.clone(),
        };

        let controller = Self {
            config,
            state,
            command_rx,
            event_tx,
            devices,
            backend,
            synthesizer,
        };

        (controller, handle)
    }

    /// Start the workers and the controller loop
    ///
    /// Returns join handles for every spawned thread.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>> {
        let Controller {
            config,
            state,
            command_rx,
            event_tx,
            devices,
            backend,
            synthesizer,
        } = self;

        let mut handles = Vec::new();

        let mut backend = BackendRunner::new(backend, CHANNEL_CAPACITY).start_worker()?;
        handles.extend(backend.worker_handle.take());
        info!("Backend worker started");

        let mut speech = SpeechRunner::new(
            synthesizer,
            CHANNEL_CAPACITY,
            Duration::from_millis(config.controller.playback_timeout_ms),
        )
        .start_worker()?;
        handles.extend(speech.worker_handle.take());
        info!("Speech worker started");

        let (wake_tx, wake_rx) = unbounded();
        let (transcript_tx, transcript_rx) = unbounded();
        let (silence_tx, silence_rx) = unbounded();

        let core = Conversation {
            wake: WakeWordListener::new(devices.wake_recognizer, &config.wake, wake_tx),
            transcript: TranscriptListener::new(devices.transcript_recognizer, transcript_tx),
            recorder: PushToTalkRecorder::new(devices.microphone, config.recorder.clone()),
            config: config.controller,
            state,
            event_tx,
            silence_tx,
            backend_tx: backend.command_tx,
            speech_tx: speech.command_tx,
            awaiting_turn: None,
            speech: None,
            next_speech_id: 0,
            queued: None,
            timers: Vec::new(),
            error_epoch: 0,
            settle_attempt: 0,
            settle_deadline: None,
        };

        let channels = Channels {
            command_rx,
            wake_rx,
            transcript_rx,
            silence_rx,
            backend_rx: backend.event_rx,
            speech_rx: speech.event_rx,
        };

        let controller_handle = std::thread::Builder::new()
            .name("voiceflow-controller".into())
            .spawn(move || core.run(channels))
            .map_err(|e| VoiceFlowError::Channel(format!("Failed to spawn controller: {}", e)))?;
        handles.push(controller_handle);
        info!("Controller loop started");

        Ok(handles)
    }
}

struct Channels {
    command_rx: Receiver<AppCommand>,
    wake_rx: Receiver<RecognizerEvent>,
    transcript_rx: Receiver<RecognizerEvent>,
    silence_rx: Receiver<SilenceDetected>,
    backend_rx: Receiver<BackendEvent>,
    speech_rx: Receiver<SpeechEvent>,
}

/// What happens once a piece of speech has been played
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AfterSpeech {
    /// Wake acknowledgement: open capture with auto-stop
    OpenCapture,
    /// Turn reply: loop back to listening or go idle
    FinishTurn,
    /// Error apology; the cool-down timer decides what comes next
    Apology,
    /// The cool-down elapsed during the apology
    ResetToIdle,
}

#[derive(Debug)]
struct PendingSpeech {
    id: u64,
    after: AfterSpeech,
}

/// Input that arrived while playback was still running
#[derive(Clone, Debug, PartialEq, Eq)]
enum Queued {
    Activation,
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerKind {
    /// Re-open capture after a hands-free turn
    Rearm { turn: u64 },
    /// Check on a manually stopped transcript attempt
    Settle { attempt: u64 },
    /// Leave the Error state
    ErrorReset { epoch: u64 },
}

struct Timer {
    due: Instant,
    kind: TimerKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Holder {
    Wake,
    Recorder,
    Transcript,
}

/// State owned by the controller thread
struct Conversation {
    config: ControllerConfig,
    state: SharedAppState,
    event_tx: Sender<AppEvent>,

    wake: WakeWordListener,
    transcript: TranscriptListener,
    recorder: PushToTalkRecorder,
    silence_tx: Sender<SilenceDetected>,

    backend_tx: Sender<BackendCommand>,
    speech_tx: Sender<SpeechCommand>,

    awaiting_turn: Option<u64>,
    speech: Option<PendingSpeech>,
    next_speech_id: u64,
    queued: Option<Queued>,
    timers: Vec<Timer>,
    error_epoch: u64,
    settle_attempt: u64,
    settle_deadline: Option<Instant>,
}

impl Conversation {
    fn run(mut self, channels: Channels) {
        info!("Controller main loop starting");
        self.arm_wake();

        loop {
            select! {
                recv(channels.command_rx) -> command => {
                    match command {
                        Ok(AppCommand::Shutdown) => {
                            self.shutdown(&channels);
                            return;
                        }
                        Ok(command) => self.handle_command(command),
                        Err(_) => {
                            info!("Command channel closed");
                            self.shutdown(&channels);
                            return;
                        }
                    }
                }

                recv(channels.wake_rx) -> event => {
                    if let Ok(event) = event {
                        self.on_wake_event(event);
                    }
                }

                recv(channels.transcript_rx) -> event => {
                    if let Ok(event) = event {
                        self.on_transcript_event(event);
                    }
                }

                recv(channels.silence_rx) -> event => {
                    if let Ok(event) = event {
                        self.on_silence(event);
                    }
                }

                recv(channels.backend_rx) -> event => {
                    match event {
                        Ok(BackendEvent::Finished(outcome)) => self.on_backend_outcome(outcome),
                        Ok(BackendEvent::Shutdown) | Err(_) => {
                            error!("Backend worker stopped unexpectedly");
                            self.shutdown(&channels);
                            return;
                        }
                    }
                }

                recv(channels.speech_rx) -> event => {
                    match event {
                        Ok(SpeechEvent::Finished { id }) => self.on_speech_finished(id),
                        Ok(SpeechEvent::Shutdown) | Err(_) => {
                            error!("Speech worker stopped unexpectedly");
                            self.shutdown(&channels);
                            return;
                        }
                    }
                }

                default(TICK) => {}
            }

            self.fire_due_timers();
        }
    }

    // ---- commands ----

    fn handle_command(&mut self, command: AppCommand) {
        debug!("Command: {:?}", command);
        match command {
            AppCommand::StartListening => self.activate(),
            AppCommand::StopListening => self.deactivate(),
            AppCommand::ToggleMicrophone => {
                if self.interaction().is_listening() {
                    self.deactivate();
                } else {
                    self.activate();
                }
            }
            AppCommand::SubmitText(text) => self.submit_text(text),
            AppCommand::SetHandsFree(enabled) => self.set_hands_free(enabled),
            AppCommand::SelectFile(path) => self.select_file(path),
            AppCommand::Shutdown => {}
        }
    }

    /// Manual microphone activation
    fn activate(&mut self) {
        match self.interaction() {
            InteractionState::Listening => debug!("Already listening"),
            InteractionState::Processing => warn!("Cannot start listening while a request is in flight"),
            _ if self.speech.is_some() => {
                debug!("Activation queued until playback finishes");
                self.queued = Some(Queued::Activation);
            }
            _ => {
                let auto_stop = self.hands_free();
                self.open_capture(auto_stop);
            }
        }
    }

    /// Manual microphone deactivation
    fn deactivate(&mut self) {
        if !self.interaction().is_listening() {
            debug!("Not listening, nothing to stop");
            return;
        }

        match self.config.capture_path {
            CapturePath::Audio => self.finish_recording(),
            CapturePath::Transcript => {
                self.transcript.stop();
                self.settle_attempt += 1;
                self.settle_deadline =
                    Some(Instant::now() + Duration::from_millis(self.config.settle_timeout_ms));
                let attempt = self.settle_attempt;
                self.schedule(self.config.settle_delay_ms, TimerKind::Settle { attempt });
            }
        }
    }

    fn submit_text(&mut self, text: String) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match self.interaction() {
            InteractionState::Listening | InteractionState::Processing => {
                warn!("Busy ({}), ignoring text command", self.interaction());
            }
            _ if self.speech.is_some() => {
                debug!("Text command queued until playback finishes");
                self.queued = Some(Queued::Text(text.to_string()));
            }
            _ => self.begin_turn(Utterance::Text(text.to_string())),
        }
    }

    fn set_hands_free(&mut self, enabled: bool) {
        if self.hands_free() == enabled {
            return;
        }
        self.state.write().hands_free = enabled;
        self.emit(AppEvent::HandsFreeChanged(enabled));
        self.log(LogEntry::system(if enabled {
            "Hands-free mode on"
        } else {
            "Hands-free mode off"
        }));

        if enabled {
            self.arm_wake();
        } else {
            self.wake.stop();
        }
    }

    fn select_file(&mut self, path: String) {
        let known = {
            let mut state = self.state.write();
            if state.files.contains(&path) {
                state.selected_path = Some(path.clone());
                true
            } else {
                false
            }
        };

        if known {
            self.emit(AppEvent::SelectionChanged(Some(path)));
        } else {
            warn!("Cannot select unknown file {}", path);
        }
    }

    // ---- capture ----

    /// Stop every capture component except `keep`
    fn release_capture(&mut self, keep: Option<Holder>) {
        let sessions: [(Holder, &mut dyn CaptureSession); 3] = [
            (Holder::Wake, &mut self.wake),
            (Holder::Recorder, &mut self.recorder),
            (Holder::Transcript, &mut self.transcript),
        ];
        for (holder, session) in sessions {
            if Some(holder) != keep && session.is_capturing() {
                debug!("Releasing microphone from {:?}", holder);
                session.release();
            }
        }
    }

    fn open_capture(&mut self, auto_stop: bool) {
        let started = match self.config.capture_path {
            CapturePath::Audio => {
                self.release_capture(Some(Holder::Recorder));
                let silence = auto_stop.then(|| self.silence_tx.clone());
                self.recorder.start(silence)
            }
            CapturePath::Transcript => {
                self.release_capture(Some(Holder::Transcript));
                // settle checks from an earlier attempt no longer apply
                self.settle_attempt += 1;
                self.settle_deadline = None;
                self.transcript.start()
            }
        };

        match started {
            Ok(()) => self.set_interaction(InteractionState::Listening),
            Err(e) => self.on_capture_fault(e),
        }
    }

    /// Arm wake listening when hands-free and idle
    fn arm_wake(&mut self) {
        if !self.hands_free() || !self.interaction().is_idle() {
            return;
        }
        self.release_capture(Some(Holder::Wake));
        if let Err(e) = self.wake.start() {
            self.on_capture_fault(e);
        }
    }

    fn finish_recording(&mut self) {
        match self.recorder.stop() {
            Ok(Some(clip)) => self.begin_turn(Utterance::Audio {
                base64: clip.base64,
                mime_type: clip.mime_type,
            }),
            Ok(None) => {
                self.log(LogEntry::system("No audio was captured"));
                self.enter_idle();
            }
            Err(e) => self.enter_error(format!("Could not finish the recording: {}", e), false),
        }
    }

    fn on_silence(&mut self, event: SilenceDetected) {
        if event.session != self.recorder.session()
            || !self.recorder.is_recording()
            || !self.interaction().is_listening()
        {
            debug!("Ignoring stale silence for session {}", event.session);
            return;
        }
        info!("Silence detected, stopping recording");
        self.finish_recording();
    }

    fn on_wake_event(&mut self, event: RecognizerEvent) {
        match self.wake.handle_event(event) {
            WakeOutcome::Detected { transcript } => self.on_wake_detected(transcript),
            WakeOutcome::Failed(e) => self.on_capture_fault(e),
            WakeOutcome::Restarted => debug!("Wake cycle {} running", self.wake.cycle()),
            WakeOutcome::Ignored | WakeOutcome::Stopped => {}
        }
    }

    fn on_wake_detected(&mut self, transcript: String) {
        let current = self.interaction();
        if !current.is_idle() || !self.hands_free() {
            info!("Ignoring wake phrase while {}", current);
            return;
        }

        self.log(LogEntry::system(format!("Heard \"{}\"", transcript.trim())));
        self.set_interaction(InteractionState::Speaking);
        let acknowledgement = self.config.acknowledgement.clone();
        self.speak(acknowledgement, AfterSpeech::OpenCapture);
    }

    fn on_transcript_event(&mut self, event: RecognizerEvent) {
        match self.transcript.handle_event(event) {
            TranscriptOutcome::Transcript(text) => {
                if self.interaction().is_listening() {
                    self.begin_turn(Utterance::Text(text));
                } else {
                    debug!("Dropping transcript outside Listening");
                }
            }
            TranscriptOutcome::Ended => {
                if self.interaction().is_listening() {
                    self.log(LogEntry::system("Didn't catch that"));
                    self.enter_idle();
                }
            }
            TranscriptOutcome::Failed(e) => self.on_capture_fault(e),
            TranscriptOutcome::Ignored => {}
        }
    }

    fn on_capture_fault(&mut self, e: CaptureError) {
        if e == CaptureError::Aborted {
            return;
        }

        if e.is_fatal() {
            if self.hands_free() {
                self.state.write().hands_free = false;
                self.emit(AppEvent::HandsFreeChanged(false));
                info!("Hands-free disarmed after microphone fault");
            }
            let message = if e.is_permission_denied() {
                "Microphone access was denied. Allow it and try again.".to_string()
            } else {
                format!("Microphone unavailable: {}", e)
            };
            self.enter_error(message, false);
            return;
        }

        debug!("Tolerating capture fault: {}", e);
        if self.interaction().is_listening() {
            self.release_capture(None);
            self.log(LogEntry::system("Didn't catch that"));
            self.enter_idle();
        }
    }

    // ---- turn pipeline ----

    fn begin_turn(&mut self, utterance: Utterance) {
        self.release_capture(None);
        self.queued = None;

        self.log(LogEntry::user(utterance.describe()));
        self.set_interaction(InteractionState::Processing);

        let (turn, request) = {
            let mut state = self.state.write();
            state.turn += 1;
            let request = BackendRequest {
                utterance,
                files: state.files.snapshot(),
                current_path: state.selected_path.clone(),
            };
            (state.turn, request)
        };
        self.awaiting_turn = Some(turn);
        info!("Turn {} sent to backend", turn);

        if self
            .backend_tx
            .send(BackendCommand::Generate(BackendJob { turn, request }))
            .is_err()
        {
            self.awaiting_turn = None;
            self.enter_error("The assistant backend is not running".to_string(), false);
        }
    }

    fn on_backend_outcome(&mut self, outcome: BackendOutcome) {
        if self.awaiting_turn != Some(outcome.turn) || !self.interaction().is_processing() {
            debug!("Dropping stale backend outcome for turn {}", outcome.turn);
            return;
        }
        self.awaiting_turn = None;

        match outcome.result {
            Ok(reply) if reply.is_empty() => {
                let text = reply
                    .reply
                    .unwrap_or_else(|| self.config.not_understood.clone());
                self.reply_with(text);
            }
            Ok(reply) => self.apply_reply(reply),
            Err(VoiceFlowError::BackendMalformed(detail)) => {
                self.log(LogEntry::error(format!(
                    "Could not read the assistant's answer: {}",
                    detail
                )));
                self.set_interaction(InteractionState::Speaking);
                let apology = self.config.malformed_apology.clone();
                self.speak(apology, AfterSpeech::FinishTurn);
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Turn {} failed: {}", outcome.turn, e);
                } else {
                    error!("Turn {} failed and needs attention: {}", outcome.turn, e);
                }
                let message = format!("{} ({})", e.user_message(), e);
                self.enter_error(message, self.config.speak_error_apology);
            }
        }
    }

    fn apply_reply(&mut self, reply: BackendReply) {
        let (report, selection) = {
            let mut state = self.state.write();
            let report = apply_operations(&mut state.files, &reply.operations, &self.config.response_path);
            if let Some(path) = &report.selected_path {
                state.selected_path = Some(path.clone());
            }
            let selection_gone = state
                .selected_path
                .as_deref()
                .map_or(false, |path| !state.files.contains(path));
            if selection_gone {
                let first = state.files.paths().next().map(str::to_string);
                state.selected_path = first;
            }
            (report, state.selected_path.clone())
        };

        for change in &report.changes {
            info!("{}", change.describe());
        }
        self.emit(AppEvent::FilesChanged);
        self.emit(AppEvent::SelectionChanged(selection));

        let text = reply.reply.or(report.summary).unwrap_or_else(|| {
            report
                .changes
                .iter()
                .map(|c| c.describe())
                .collect::<Vec<_>>()
                .join(". ")
        });
        self.reply_with(text);
    }

    /// Log, record and speak a turn's reply
    fn reply_with(&mut self, text: String) {
        self.state.write().last_reply = Some(text.clone());
        self.log(LogEntry::system(text.clone()));
        self.set_interaction(InteractionState::Speaking);
        self.speak(text, AfterSpeech::FinishTurn);
    }

    fn finish_turn(&mut self) {
        if !self.interaction().is_speaking() {
            return;
        }
        if self.hands_free() {
            let turn = self.state.read().turn;
            self.schedule(self.config.rearm_delay_ms, TimerKind::Rearm { turn });
        } else {
            self.enter_idle();
        }
    }

    // ---- speech ----

    fn speak(&mut self, text: String, after: AfterSpeech) {
        self.next_speech_id += 1;
        let id = self.next_speech_id;
        if let Some(previous) = self.speech.replace(PendingSpeech { id, after }) {
            debug!("Speech #{} superseded by #{}", previous.id, id);
        }

        if self
            .speech_tx
            .send(SpeechCommand::Speak(SpeechJob { id, text }))
            .is_err()
        {
            warn!("Speech worker unavailable, skipping playback");
            self.on_speech_finished(id);
        }
    }

    fn on_speech_finished(&mut self, id: u64) {
        if self.speech.as_ref().map(|s| s.id) != Some(id) {
            debug!("Ignoring completion of superseded speech #{}", id);
            return;
        }
        let Some(finished) = self.speech.take() else {
            return;
        };
        debug!("Speech #{} finished", id);

        let current = self.interaction();
        if current.is_speaking() || current.is_error() {
            if let Some(queued) = self.queued.take() {
                self.run_queued(queued);
                return;
            }
        }

        match finished.after {
            AfterSpeech::OpenCapture => {
                if self.interaction().is_speaking() {
                    self.open_capture(true);
                }
            }
            AfterSpeech::FinishTurn => self.finish_turn(),
            AfterSpeech::Apology => {}
            AfterSpeech::ResetToIdle => {
                if self.interaction().is_error() {
                    self.enter_idle();
                }
            }
        }
    }

    fn run_queued(&mut self, queued: Queued) {
        debug!("Running queued {:?}", queued);
        match queued {
            Queued::Activation => {
                let auto_stop = self.hands_free();
                self.open_capture(auto_stop);
            }
            Queued::Text(text) => self.begin_turn(Utterance::Text(text)),
        }
    }

    // ---- state transitions ----

    fn enter_idle(&mut self) {
        self.set_interaction(InteractionState::Idle);
        self.arm_wake();
    }

    fn enter_error(&mut self, message: String, apology: bool) {
        self.release_capture(None);
        self.awaiting_turn = None;
        self.log(LogEntry::error(message));
        self.set_interaction(InteractionState::Error);

        self.error_epoch += 1;
        let epoch = self.error_epoch;
        self.schedule(self.config.error_cooldown_ms, TimerKind::ErrorReset { epoch });

        if apology {
            let text = self.config.error_apology.clone();
            self.speak(text, AfterSpeech::Apology);
        }
    }

    // ---- timers ----

    fn schedule(&mut self, delay_ms: u64, kind: TimerKind) {
        self.timers.push(Timer {
            due: Instant::now() + Duration::from_millis(delay_ms),
            kind,
        });
    }

    fn fire_due_timers(&mut self) {
        if self.timers.is_empty() {
            return;
        }
        let now = Instant::now();
        let (due, pending): (Vec<Timer>, Vec<Timer>) =
            std::mem::take(&mut self.timers).into_iter().partition(|t| t.due <= now);
        self.timers = pending;

        for timer in due {
            self.on_timer(timer.kind);
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Rearm { turn } => {
                let current_turn = self.state.read().turn;
                if turn != current_turn || !self.interaction().is_speaking() || self.speech.is_some() {
                    return;
                }
                if self.hands_free() {
                    self.open_capture(true);
                } else {
                    self.enter_idle();
                }
            }
            TimerKind::Settle { attempt } => {
                if attempt != self.settle_attempt
                    || !self.interaction().is_listening()
                    || self.config.capture_path != CapturePath::Transcript
                {
                    return;
                }
                // a stopped recognizer keeps its attempt open until the final result is in
                let waiting = self
                    .settle_deadline
                    .is_some_and(|deadline| Instant::now() < deadline);
                if self.transcript.is_active() && waiting {
                    debug!("Transcript attempt still settling");
                    self.schedule(self.config.settle_delay_ms, TimerKind::Settle { attempt });
                    return;
                }
                warn!("No transcript after stopping, giving up");
                self.settle_deadline = None;
                self.transcript.abort();
                self.log(LogEntry::system("Didn't catch that"));
                self.enter_idle();
            }
            TimerKind::ErrorReset { epoch } => {
                if epoch != self.error_epoch || !self.interaction().is_error() {
                    return;
                }
                match self.speech.as_mut() {
                    Some(pending) => pending.after = AfterSpeech::ResetToIdle,
                    None => self.enter_idle(),
                }
            }
        }
    }

    // ---- shared state ----

    fn interaction(&self) -> InteractionState {
        self.state.interaction()
    }

    fn hands_free(&self) -> bool {
        self.state.hands_free()
    }

    fn set_interaction(&mut self, next: InteractionState) {
        let previous = std::mem::replace(&mut self.state.write().interaction, next);
        if previous != next {
            info!("State {} -> {}", previous, next);
            self.emit(AppEvent::StateChanged(next));
        }
    }

    fn log(&self, entry: LogEntry) {
        match entry.kind {
            LogKind::Error => warn!("[{}] {}", entry.kind, entry.message),
            _ => info!("[{}] {}", entry.kind, entry.message),
        }
        let entry = self.state.write().logs.append(entry);
        self.emit(AppEvent::Log(entry));
    }

    fn emit(&self, event: AppEvent) {
        if let Err(TrySendError::Full(_)) = self.event_tx.try_send(event) {
            debug!("Event queue full, dropping notification");
        }
    }

    fn shutdown(&mut self, channels: &Channels) {
        info!("Shutdown requested");
        self.release_capture(None);
        self.timers.clear();
        self.queued = None;

        let _ = self.backend_tx.send(BackendCommand::Shutdown);
        let _ = self.speech_tx.send(SpeechCommand::Shutdown);

        let closed_backend = never();
        let closed_speech = never();
        let mut backend_done = false;
        let mut speech_done = false;
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;

        while !(backend_done && speech_done) {
            if Instant::now() > deadline {
                warn!("Shutdown timeout reached, forcing exit");
                break;
            }
            let backend_rx = if backend_done { &closed_backend } else { &channels.backend_rx };
            let speech_rx = if speech_done { &closed_speech } else { &channels.speech_rx };

            select! {
                recv(backend_rx) -> event => {
                    if matches!(event, Ok(BackendEvent::Shutdown) | Err(_)) {
                        backend_done = true;
                        debug!("Backend worker shutdown confirmed");
                    }
                }
                recv(speech_rx) -> event => {
                    if matches!(event, Ok(SpeechEvent::Shutdown) | Err(_)) {
                        speech_done = true;
                        debug!("Speech worker shutdown confirmed");
                    }
                }
                default(Duration::from_millis(50)) => {}
            }
        }

        self.emit(AppEvent::Shutdown);
        info!("Controller shutdown complete");
    }
}
