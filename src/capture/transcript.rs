//! Single-shot transcript listener
//!
//! One recognition attempt per `start`. There is no restart or retry here;
//! the controller decides what an ended attempt means.

use super::{
    CaptureError, CaptureSession, RecognitionMode, RecognizerEvent, RecognizerSignal,
    SpeechRecognizer,
};
use crossbeam_channel::Sender;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptOutcome {
    Ignored,
    /// A final transcript arrived; the attempt is over
    Transcript(String),
    /// The attempt ended without a transcript
    Ended,
    Failed(CaptureError),
}

pub struct TranscriptListener {
    recognizer: Box<dyn SpeechRecognizer>,
    events: Sender<RecognizerEvent>,
    active: bool,
    cycle: u64,
}

impl TranscriptListener {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, events: Sender<RecognizerEvent>) -> Self {
        Self {
            recognizer,
            events,
            active: false,
            cycle: 0,
        }
    }

    /// Begin one attempt; a no-op while one is running
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.active {
            return Ok(());
        }
        self.cycle += 1;
        self.recognizer
            .begin(self.cycle, RecognitionMode::SingleShot, self.events.clone())?;
        self.active = true;
        info!("Transcript attempt {} started", self.cycle);
        Ok(())
    }

    /// Graceful stop; a final transcript may still arrive
    pub fn stop(&mut self) {
        if self.active {
            debug!("Stopping transcript attempt {}", self.cycle);
            self.recognizer.stop();
        }
    }

    /// Hard stop; anything still pending is discarded
    pub fn abort(&mut self) {
        if self.active {
            self.active = false;
            // later events for this attempt are stale
            self.cycle += 1;
            self.recognizer.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn handle_event(&mut self, event: RecognizerEvent) -> TranscriptOutcome {
        if event.cycle != self.cycle || !self.active {
            return TranscriptOutcome::Ignored;
        }

        match event.signal {
            RecognizerSignal::Result(result) => {
                let text = result.transcript.trim();
                if !result.is_final || text.is_empty() {
                    return TranscriptOutcome::Ignored;
                }
                self.active = false;
                info!("Transcript: {:?}", text);
                TranscriptOutcome::Transcript(text.to_string())
            }
            RecognizerSignal::End => {
                self.active = false;
                TranscriptOutcome::Ended
            }
            RecognizerSignal::Error(CaptureError::Aborted) => TranscriptOutcome::Ignored,
            RecognizerSignal::Error(e) => {
                self.active = false;
                TranscriptOutcome::Failed(e)
            }
        }
    }
}

impl CaptureSession for TranscriptListener {
    fn is_capturing(&self) -> bool {
        self.active
    }

    fn release(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{RecognizerProbe, ScriptedRecognizer};
    use crate::capture::TransientKind;
    use crossbeam_channel::{unbounded, Receiver};

    fn listener() -> (TranscriptListener, RecognizerProbe, Receiver<RecognizerEvent>) {
        let (recognizer, probe) = ScriptedRecognizer::new();
        let (tx, rx) = unbounded();
        (TranscriptListener::new(Box::new(recognizer), tx), probe, rx)
    }

    fn drain(listener: &mut TranscriptListener, rx: &Receiver<RecognizerEvent>) -> Vec<TranscriptOutcome> {
        rx.try_iter().map(|ev| listener.handle_event(ev)).collect()
    }

    #[test]
    fn test_single_shot_mode_and_no_double_start() {
        let (mut listener, probe, _rx) = listener();
        listener.start().unwrap();
        listener.start().unwrap();
        assert_eq!(probe.begins(), 1);
        assert_eq!(probe.mode(), Some(RecognitionMode::SingleShot));
    }

    #[test]
    fn test_final_result_ends_attempt() {
        let (mut listener, probe, rx) = listener();
        listener.start().unwrap();
        probe.emit_result("make it blue", false, 0.9);
        probe.emit_result(" make it blue ", true, 0.9);
        probe.emit_end();

        assert_eq!(
            drain(&mut listener, &rx),
            vec![
                TranscriptOutcome::Ignored,
                TranscriptOutcome::Transcript("make it blue".into()),
                TranscriptOutcome::Ignored,
            ]
        );
        assert!(!listener.is_active());
    }

    #[test]
    fn test_no_restart_after_end() {
        let (mut listener, probe, rx) = listener();
        listener.start().unwrap();
        probe.emit_end();
        assert_eq!(drain(&mut listener, &rx), vec![TranscriptOutcome::Ended]);
        assert_eq!(probe.begins(), 1);
    }

    #[test]
    fn test_stop_only_when_active() {
        let (mut listener, probe, rx) = listener();
        listener.stop();
        assert_eq!(probe.stops(), 0);

        listener.start().unwrap();
        probe.set_final_on_stop("add a footer");
        listener.stop();
        assert_eq!(probe.stops(), 1);
        assert_eq!(
            drain(&mut listener, &rx),
            vec![
                TranscriptOutcome::Transcript("add a footer".into()),
                TranscriptOutcome::Ignored,
            ]
        );
    }

    #[test]
    fn test_errors_clear_active() {
        let (mut listener, probe, rx) = listener();
        listener.start().unwrap();
        probe.emit_error(CaptureError::Transient(TransientKind::NoSpeech));
        assert_eq!(
            drain(&mut listener, &rx),
            vec![TranscriptOutcome::Failed(CaptureError::Transient(
                TransientKind::NoSpeech
            ))]
        );
        assert!(!listener.is_active());
    }

    #[test]
    fn test_abort_discards_pending() {
        let (mut listener, probe, rx) = listener();
        listener.start().unwrap();
        probe.emit_result("too late", true, 0.9);
        listener.abort();
        assert!(drain(&mut listener, &rx)
            .iter()
            .all(|o| *o == TranscriptOutcome::Ignored));
    }
}
