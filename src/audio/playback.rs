use crate::{Result, VoiceFlowError};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::{debug, info};

/// Play mono samples on the default output device, blocking until done
///
/// The output stream is opened per call and dropped on every return path.
pub fn play_blocking(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
    if samples.is_empty() {
        debug!("Nothing to play");
        return Ok(());
    }

    let (_stream, handle) = OutputStream::try_default()
        .map_err(|e| VoiceFlowError::AudioDevice(format!("No output device: {}", e)))?;
    let sink = Sink::try_new(&handle)
        .map_err(|e| VoiceFlowError::AudioDevice(format!("Failed to open sink: {}", e)))?;

    let duration_ms = samples.len() as u64 * 1000 / sample_rate.max(1) as u64;
    info!("Playing {} ms of speech", duration_ms);

    sink.append(SamplesBuffer::new(1, sample_rate, samples));
    sink.sleep_until_end();

    debug!("Playback finished");
    Ok(())
}
