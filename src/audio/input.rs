use crate::capture::{CaptureError, Microphone};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use std::thread;
use tracing::{debug, error, info, warn};

/// Default system microphone through cpal
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// builds it, reports the outcome, then parks until released. Dropping the
/// stream drops the frame sender with it.
pub struct CpalMicrophone {
    sample_rate: u32,
    channels: u16,
    stop_tx: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalMicrophone {
    /// Probe the default input device
    pub fn new() -> Result<Self, CaptureError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("No input device available".into()))?;

        let config = device
            .default_input_config()
            .map_err(|e| classify(&e.to_string()))?;

        info!(
            "Using input device: {} ({} Hz, {} ch)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            stop_tx: None,
            thread: None,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Map a platform error message onto the capture taxonomy
fn classify(message: &str) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message.to_string())
    }
}

fn run_stream(
    frames: Sender<Vec<f32>>,
    ready: Sender<Result<(), CaptureError>>,
    stop: crossbeam_channel::Receiver<()>,
) {
    let device = match cpal::default_host().default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready.send(Err(CaptureError::DeviceUnavailable(
                "No input device available".into(),
            )));
            return;
        }
    };
    let config: cpal::StreamConfig = match device.default_input_config() {
        Ok(config) => config.into(),
        Err(e) => {
            let _ = ready.send(Err(classify(&e.to_string())));
            return;
        }
    };

    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let samples = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect()
            };
            if let Err(e) = frames.try_send(samples) {
                debug!("Dropping microphone frames: {}", e);
            }
        },
        |err| error!("Audio input stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(classify(&e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(classify(&e.to_string())));
        return;
    }

    let _ = ready.send(Ok(()));
    let _ = stop.recv();
    drop(stream);
    debug!("Input stream closed");
}

impl Microphone for CpalMicrophone {
    fn acquire(&mut self, frames: Sender<Vec<f32>>) -> Result<(), CaptureError> {
        if self.is_acquired() {
            warn!("Microphone already acquired");
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("voiceflow-mic".into())
            .spawn(move || run_stream(frames, ready_tx, stop_rx))
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(handle);
                info!("Microphone acquired");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::DeviceUnavailable("input thread exited".into()))
            }
        }
    }

    fn release(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Microphone thread panicked");
            }
            info!("Microphone released");
        }
    }

    fn is_acquired(&self) -> bool {
        self.thread.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}
