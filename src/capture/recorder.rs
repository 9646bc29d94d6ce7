//! Push-to-talk recorder with silence auto-stop
//!
//! While recording, a monitor thread drains microphone frames into the clip
//! buffer and, when a silence sender was supplied, feeds a spectrum analyser
//! every tick. The silence detector only counts trailing silence once speech
//! has been heard.

use super::mime::{locally_supported, select_mime_type};
use super::{CaptureError, CaptureSession, Microphone};
use crate::audio::{encode_wav_bytes, SpectrumAnalyser};
use crate::config::RecorderConfig;
use crate::Result;
use base64::Engine;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Hysteresis silence detector over mean spectrum levels
#[derive(Clone, Debug)]
pub struct SilenceDetector {
    speech_threshold: f32,
    silence_threshold: f32,
    silence_duration: Duration,
    has_spoken: bool,
    silence_since: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(speech_threshold: f32, silence_threshold: f32, silence_duration: Duration) -> Self {
        Self {
            speech_threshold,
            silence_threshold,
            silence_duration,
            has_spoken: false,
            silence_since: None,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(
            config.speech_threshold,
            config.silence_threshold,
            Duration::from_millis(config.silence_duration_ms),
        )
    }

    /// Feed one level sample; returns true once trailing silence is long enough
    pub fn observe(&mut self, mean: f32, now: Instant) -> bool {
        if mean > self.speech_threshold {
            self.has_spoken = true;
            self.silence_since = None;
            return false;
        }
        if !self.has_spoken {
            self.silence_since = None;
            return false;
        }
        if mean < self.silence_threshold {
            let since = *self.silence_since.get_or_insert(now);
            return now.duration_since(since) >= self.silence_duration;
        }
        false
    }
}

/// Auto-stop notification for one recording session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SilenceDetected {
    pub session: u64,
}

/// A finished recording
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedClip {
    pub base64: String,
    pub mime_type: String,
}

struct Monitor {
    cancel: Arc<AtomicBool>,
    handle: thread::JoinHandle<Receiver<Vec<f32>>>,
}

pub struct PushToTalkRecorder {
    microphone: Box<dyn Microphone>,
    config: RecorderConfig,
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
    monitor: Option<Monitor>,
    recording: bool,
    session: u64,
}

impl PushToTalkRecorder {
    pub fn new(microphone: Box<dyn Microphone>, config: RecorderConfig) -> Self {
        Self {
            microphone,
            config,
            chunks: Arc::new(Mutex::new(Vec::new())),
            monitor: None,
            recording: false,
            session: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Current session id, bumped on each successful start
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Acquire the microphone and begin capturing
    ///
    /// With a silence sender, trailing silence after speech sends one
    /// `SilenceDetected` for this session. A no-op while already recording.
    pub fn start(
        &mut self,
        silence: Option<Sender<SilenceDetected>>,
    ) -> std::result::Result<(), CaptureError> {
        if self.recording {
            debug!("Recorder already running");
            return Ok(());
        }

        let (frames_tx, frames_rx) = unbounded();
        self.microphone.acquire(frames_tx)?;

        self.session += 1;
        self.chunks.lock().clear();

        let analyser = match silence {
            Some(tx) => match SpectrumAnalyser::new(self.config.fft_size) {
                Ok(analyser) => Some((analyser, SilenceDetector::from_config(&self.config), tx)),
                Err(e) => {
                    warn!("Silence monitoring disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let session = self.session;
        let tick = Duration::from_millis(self.config.tick_ms.max(1));
        let chunks = Arc::clone(&self.chunks);
        let flag = Arc::clone(&cancel);

        let spawned = thread::Builder::new()
            .name("voiceflow-recorder".into())
            .spawn(move || monitor_loop(frames_rx, chunks, analyser, flag, tick, session));

        match spawned {
            Ok(handle) => {
                self.monitor = Some(Monitor { cancel, handle });
                self.recording = true;
                info!("Recording session {} started", session);
                Ok(())
            }
            Err(e) => {
                self.microphone.release();
                Err(CaptureError::DeviceUnavailable(format!(
                    "Failed to spawn recorder monitor: {}",
                    e
                )))
            }
        }
    }

    /// Stop capturing and return the clip, or `None` when nothing was captured
    ///
    /// The monitor is torn down before the microphone is released. Safe to
    /// call at any time.
    pub fn stop(&mut self) -> Result<Option<EncodedClip>> {
        let leftover = self.stop_monitor();
        self.microphone.release();

        let was_recording = std::mem::replace(&mut self.recording, false);
        if let Some(rx) = leftover {
            let mut chunks = self.chunks.lock();
            chunks.extend(rx.try_iter());
        }

        let samples: Vec<f32> = self.chunks.lock().drain(..).flatten().collect();
        if !was_recording || samples.is_empty() {
            debug!("Recorder stopped with no audio");
            return Ok(None);
        }

        let bytes = encode_wav_bytes(&samples, self.microphone.sample_rate())?;
        let mime_type = select_mime_type(&self.config.preferred_mime_types, locally_supported);
        info!(
            "Recording session {} finished: {} samples, {} bytes ({})",
            self.session,
            samples.len(),
            bytes.len(),
            mime_type
        );

        Ok(Some(EncodedClip {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type,
        }))
    }

    /// Stop and throw the clip away
    pub fn discard(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Discarding recording failed: {}", e);
        }
    }

    fn stop_monitor(&mut self) -> Option<Receiver<Vec<f32>>> {
        let monitor = self.monitor.take()?;
        monitor.cancel.store(true, Ordering::SeqCst);
        match monitor.handle.join() {
            Ok(rx) => Some(rx),
            Err(_) => {
                warn!("Recorder monitor panicked");
                None
            }
        }
    }
}

impl CaptureSession for PushToTalkRecorder {
    fn is_capturing(&self) -> bool {
        self.recording
    }

    fn release(&mut self) {
        self.discard();
    }
}

fn monitor_loop(
    frames: Receiver<Vec<f32>>,
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
    mut analyser: Option<(SpectrumAnalyser, SilenceDetector, Sender<SilenceDetected>)>,
    cancel: Arc<AtomicBool>,
    tick: Duration,
    session: u64,
) -> Receiver<Vec<f32>> {
    let mut next_tick = Instant::now() + tick;

    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let wait = next_tick.saturating_duration_since(Instant::now());
        match frames.recv_timeout(wait) {
            Ok(block) => {
                if let Some((spectrum, _, _)) = analyser.as_mut() {
                    spectrum.push(&block);
                }
                chunks.lock().push(block);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if now < next_tick {
            continue;
        }
        next_tick = now + tick;

        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let fired = match analyser.as_mut() {
            Some((spectrum, detector, _)) => detector.observe(spectrum.mean_level(), now),
            None => false,
        };
        if fired {
            if let Some((_, _, tx)) = analyser.take() {
                debug!("Trailing silence detected in session {}", session);
                let _ = tx.send(SilenceDetected { session });
            }
        }
    }

    frames
}
