//! Native speech recognition
//!
//! [`SegmentingRecognizer`] turns a microphone into a recognizer: it
//! end-points utterances by energy, hands each one to a [`Transcriber`] and
//! reports results the way a platform recognizer would. Continuous cycles
//! also report interim hypotheses while speech goes on and end on their own
//! after a fixed span.

use crate::audio::{encode_wav_bytes, resample_mono, rms};
use crate::capture::{
    CaptureError, Microphone, RecognitionMode, RecognitionResult, RecognizerEvent,
    RecognizerSignal, SpeechRecognizer, TransientKind,
};
use crate::config::{BackendConfig, RecognizerConfig};
use crate::llm::gemini::{GeminiClient, GenerateRequest, Part};
use crate::llm::prompts::TRANSCRIBE_PROMPT;
use crate::{Result, VoiceFlowError};
use base64::Engine;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sample rate transcribers receive
pub const TRANSCRIBE_RATE: u32 = 16000;

const POLL: Duration = Duration::from_millis(30);
const INTERIM_CONFIDENCE: f32 = 0.6;
const FINAL_CONFIDENCE: f32 = 0.9;

const RUN: u8 = 0;
const STOP: u8 = 1;
const ABORT: u8 = 2;

/// Speech to text over one complete utterance at [`TRANSCRIBE_RATE`]
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

/// Transcription through the Gemini API
pub struct GeminiTranscriber {
    client: GeminiClient,
    model: String,
    runtime: tokio::runtime::Runtime,
}

impl GeminiTranscriber {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VoiceFlowError::Backend(format!("Failed to create runtime: {}", e)))?;
        Ok(Self {
            client: GeminiClient::new(config)?,
            model: config.model.clone(),
            runtime,
        })
    }
}

impl Transcriber for GeminiTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let wav = encode_wav_bytes(samples, TRANSCRIBE_RATE)?;
        let request = GenerateRequest::user(vec![
            Part::text(TRANSCRIBE_PROMPT),
            Part::inline(
                "audio/wav",
                base64::engine::general_purpose::STANDARD.encode(wav),
            ),
        ]);
        let parts = self
            .runtime
            .block_on(self.client.generate(&self.model, &request))?;
        Ok(GeminiClient::joined_text(&parts).trim().to_string())
    }
}

/// Local transcription with whisper.cpp
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: whisper_rs::WhisperContext,
    language: String,
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let path = &config.whisper_model_path;
        info!("Loading Whisper model from: {:?}", path);
        if !path.exists() {
            return Err(VoiceFlowError::Config(format!(
                "Model file not found: {:?}",
                path
            )));
        }
        let context = whisper_rs::WhisperContext::new_with_params(
            path.to_str()
                .ok_or_else(|| VoiceFlowError::Config("Invalid model path".to_string()))?,
            whisper_rs::WhisperContextParameters::default(),
        )
        .map_err(|e| VoiceFlowError::Config(format!("Failed to load Whisper model: {:?}", e)))?;

        Ok(Self {
            context,
            language: config.language.clone(),
        })
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String> {
        use whisper_rs::{FullParams, SamplingStrategy};

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&self.language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .context
            .create_state()
            .map_err(|e| VoiceFlowError::Capture(format!("Failed to create state: {:?}", e)))?;
        state
            .full(params, samples)
            .map_err(|e| VoiceFlowError::Capture(format!("Transcription failed: {:?}", e)))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| VoiceFlowError::Capture(format!("Failed to get segments: {:?}", e)))?;
        let mut text = String::new();
        for i in 0..segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                VoiceFlowError::Capture(format!("Failed to get segment text: {:?}", e))
            })?;
            text.push_str(&segment);
        }
        Ok(text.trim().to_string())
    }
}

struct Cycle {
    control: Arc<AtomicU8>,
    handle: thread::JoinHandle<()>,
}

/// Recognizer built from a microphone and a transcriber
pub struct SegmentingRecognizer {
    microphone: Arc<Mutex<Box<dyn Microphone>>>,
    transcriber: Arc<dyn Transcriber>,
    config: RecognizerConfig,
    current: Option<Cycle>,
}

impl SegmentingRecognizer {
    pub fn new(
        microphone: Box<dyn Microphone>,
        transcriber: Arc<dyn Transcriber>,
        config: RecognizerConfig,
    ) -> Self {
        Self {
            microphone: Arc::new(Mutex::new(microphone)),
            transcriber,
            config,
            current: None,
        }
    }
}

impl SpeechRecognizer for SegmentingRecognizer {
    fn begin(
        &mut self,
        cycle: u64,
        mode: RecognitionMode,
        events: Sender<RecognizerEvent>,
    ) -> std::result::Result<(), CaptureError> {
        self.abort();

        let (frames_tx, frames_rx) = unbounded();
        let sample_rate = {
            let mut mic = self.microphone.lock();
            mic.acquire(frames_tx)?;
            mic.sample_rate()
        };

        let control = Arc::new(AtomicU8::new(RUN));
        let worker = CycleWorker {
            cycle,
            mode,
            events,
            frames: frames_rx,
            control: Arc::clone(&control),
            microphone: Arc::clone(&self.microphone),
            transcriber: Arc::clone(&self.transcriber),
            config: self.config.clone(),
            sample_rate,
        };

        let handle = thread::Builder::new()
            .name(format!("voiceflow-stt-{}", cycle))
            .spawn(move || worker.run())
            .map_err(|e| {
                self.microphone.lock().release();
                CaptureError::DeviceUnavailable(format!("Failed to spawn recognizer: {}", e))
            })?;

        self.current = Some(Cycle { control, handle });
        debug!("Recognition cycle {} started ({:?})", cycle, mode);
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(cycle) = self.current.take() {
            cycle.control.store(ABORT, Ordering::SeqCst);
            // the worker may be blocked in a transcription; free the device now
            self.microphone.lock().release();
        }
    }

    fn stop(&mut self) {
        if let Some(cycle) = &self.current {
            // the worker flushes its final transcription and ends on its own
            let _ = cycle
                .control
                .compare_exchange(RUN, STOP, Ordering::SeqCst, Ordering::SeqCst);
        }
    }
}

impl Drop for SegmentingRecognizer {
    fn drop(&mut self) {
        if let Some(cycle) = self.current.take() {
            cycle.control.store(ABORT, Ordering::SeqCst);
            self.microphone.lock().release();
            let _ = cycle.handle.join();
        }
    }
}

enum Exit {
    Ended,
    Stopped,
    Aborted,
}

struct CycleWorker {
    cycle: u64,
    mode: RecognitionMode,
    events: Sender<RecognizerEvent>,
    frames: Receiver<Vec<f32>>,
    control: Arc<AtomicU8>,
    microphone: Arc<Mutex<Box<dyn Microphone>>>,
    transcriber: Arc<dyn Transcriber>,
    config: RecognizerConfig,
    sample_rate: u32,
}

impl CycleWorker {
    fn emit(&self, signal: RecognizerSignal) {
        let _ = self.events.send(RecognizerEvent::new(self.cycle, signal));
    }

    fn aborted(&self) -> bool {
        self.control.load(Ordering::SeqCst) == ABORT
    }

    /// Transcribe and report unless the cycle was aborted meanwhile
    fn report(&self, utterance: &[f32], is_final: bool) -> Option<String> {
        let samples = match resample_mono(utterance, self.sample_rate, TRANSCRIBE_RATE) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Resampling failed: {}", e);
                return None;
            }
        };

        match self.transcriber.transcribe(&samples) {
            Ok(text) if self.aborted() || text.is_empty() => None,
            Ok(text) => {
                let confidence = if is_final { FINAL_CONFIDENCE } else { INTERIM_CONFIDENCE };
                self.emit(RecognizerSignal::Result(RecognitionResult {
                    transcript: text.clone(),
                    is_final,
                    confidence,
                }));
                Some(text)
            }
            Err(e) => {
                warn!("Transcription failed: {}", e);
                let kind = match e {
                    VoiceFlowError::Backend(_) => TransientKind::Network,
                    other => TransientKind::Other(other.to_string()),
                };
                if !self.aborted() {
                    self.emit(RecognizerSignal::Error(CaptureError::Transient(kind)));
                }
                None
            }
        }
    }

    fn run(self) {
        let started = Instant::now();
        let end_silence = Duration::from_millis(self.config.end_silence_ms);
        let interim_every = Duration::from_millis(self.config.interim_interval_ms);
        let max_cycle = Duration::from_secs(self.config.max_cycle_secs);
        let no_speech = Duration::from_secs(self.config.no_speech_timeout_secs);
        let continuous = self.mode == RecognitionMode::Continuous;

        let mut utterance: Vec<f32> = Vec::new();
        let mut last_voice: Option<Instant> = None;
        let mut last_interim = Instant::now();
        let mut heard = false;

        let exit = loop {
            match self.control.load(Ordering::SeqCst) {
                ABORT => break Exit::Aborted,
                STOP => break Exit::Stopped,
                _ => {}
            }

            match self.frames.recv_timeout(POLL) {
                Ok(block) => {
                    if rms(&block) > self.config.energy_threshold {
                        last_voice = Some(Instant::now());
                        heard = true;
                    }
                    if last_voice.is_some() {
                        utterance.extend_from_slice(&block);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break if self.aborted() { Exit::Aborted } else { Exit::Ended };
                }
            }

            let now = Instant::now();
            match last_voice {
                Some(voice_at) if now.duration_since(voice_at) >= end_silence => {
                    let text = self.report(&utterance, true);
                    utterance.clear();
                    last_voice = None;
                    if !continuous && text.is_some() {
                        break Exit::Ended;
                    }
                }
                Some(_) if continuous && now.duration_since(last_interim) >= interim_every => {
                    self.report(&utterance, false);
                    last_interim = Instant::now();
                }
                Some(_) => {}
                None if !continuous && !heard && now.duration_since(started) >= no_speech => {
                    self.emit(RecognizerSignal::Error(CaptureError::Transient(
                        TransientKind::NoSpeech,
                    )));
                    break Exit::Ended;
                }
                None => {}
            }

            if continuous && now.duration_since(started) >= max_cycle && last_voice.is_none() {
                break Exit::Ended;
            }
        };

        match exit {
            Exit::Aborted => self.emit(RecognizerSignal::Error(CaptureError::Aborted)),
            Exit::Stopped if !utterance.is_empty() => {
                self.report(&utterance, true);
            }
            Exit::Stopped | Exit::Ended => {}
        }

        {
            // an aborted cycle's device was already released by `abort` and
            // may belong to a newer cycle by now
            let mut mic = self.microphone.lock();
            if !self.aborted() {
                mic.release();
            }
        }
        self.emit(RecognizerSignal::End);
        info!("Recognition cycle {} ended", self.cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{MicrophoneProbe, ScriptedMicrophone};

    struct Fixed(&'static str);

    impl Transcriber for Fixed {
        fn transcribe(&self, _samples: &[f32]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn recognizer(text: &'static str) -> (SegmentingRecognizer, MicrophoneProbe) {
        let (mic, probe) = ScriptedMicrophone::new(TRANSCRIBE_RATE);
        let config = RecognizerConfig {
            end_silence_ms: 60,
            interim_interval_ms: 10_000,
            no_speech_timeout_secs: 1,
            ..RecognizerConfig::default()
        };
        (
            SegmentingRecognizer::new(Box::new(mic), Arc::new(Fixed(text)), config),
            probe,
        )
    }

    fn wait_for_end(rx: &Receiver<RecognizerEvent>) -> Vec<RecognizerSignal> {
        let mut signals = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(3)) {
            let end = event.signal == RecognizerSignal::End;
            signals.push(event.signal);
            if end {
                break;
            }
        }
        signals
    }

    #[test]
    fn test_single_shot_reports_final_then_ends() {
        let (mut recognizer, probe) = recognizer("make it red");
        let (tx, rx) = unbounded();
        recognizer.begin(1, RecognitionMode::SingleShot, tx).unwrap();

        probe.push(&vec![0.3; 1600]);
        let signals = wait_for_end(&rx);

        assert_eq!(
            signals,
            vec![
                RecognizerSignal::Result(RecognitionResult::final_result("make it red", FINAL_CONFIDENCE)),
                RecognizerSignal::End,
            ]
        );
        assert!(!probe.is_acquired());
    }

    #[test]
    fn test_single_shot_without_speech_times_out() {
        let (mut recognizer, probe) = recognizer("unused");
        let (tx, rx) = unbounded();
        recognizer.begin(1, RecognitionMode::SingleShot, tx).unwrap();
        probe.push(&vec![0.0; 1600]);

        assert_eq!(
            wait_for_end(&rx),
            vec![
                RecognizerSignal::Error(CaptureError::Transient(TransientKind::NoSpeech)),
                RecognizerSignal::End,
            ]
        );
    }

    #[test]
    fn test_abort_releases_microphone_immediately() {
        let (mut recognizer, probe) = recognizer("unused");
        let (tx, rx) = unbounded();
        recognizer.begin(7, RecognitionMode::Continuous, tx).unwrap();
        assert!(probe.is_acquired());

        recognizer.abort();
        assert!(!probe.is_acquired());
        assert_eq!(
            wait_for_end(&rx),
            vec![RecognizerSignal::Error(CaptureError::Aborted), RecognizerSignal::End]
        );
    }

    #[test]
    fn test_graceful_stop_flushes_utterance() {
        let (mut recognizer, probe) = recognizer("add a footer");
        let (tx, rx) = unbounded();
        recognizer.begin(2, RecognitionMode::SingleShot, tx).unwrap();
        probe.push(&vec![0.3; 160]);
        thread::sleep(Duration::from_millis(20));
        recognizer.stop();

        let signals = wait_for_end(&rx);
        assert_eq!(signals.last(), Some(&RecognizerSignal::End));
        assert!(signals.contains(&RecognizerSignal::Result(RecognitionResult::final_result(
            "add a footer",
            FINAL_CONFIDENCE
        ))));
    }

    #[test]
    fn test_denied_microphone() {
        let (mut recognizer, probe) = recognizer("unused");
        probe.deny_permission(true);
        let (tx, _rx) = unbounded();
        assert_eq!(
            recognizer.begin(1, RecognitionMode::Continuous, tx),
            Err(CaptureError::PermissionDenied)
        );
    }
}
