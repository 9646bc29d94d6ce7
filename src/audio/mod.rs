pub mod analyser;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod playback;
pub mod resampler;
pub mod wav;

pub use analyser::SpectrumAnalyser;
#[cfg(feature = "audio-io")]
pub use input::CpalMicrophone;
#[cfg(feature = "audio-io")]
pub use playback::play_blocking;
pub use resampler::{resample_mono, MonoResampler};
pub use wav::{encode_wav_bytes, pcm16_le_to_f32};

/// Root mean square level of a block of samples
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
