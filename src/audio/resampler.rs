use crate::{Result, VoiceFlowError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Mono sinc resampler used to bring microphone audio to the rate a
/// transcriber expects
pub struct MonoResampler {
    inner: SincFixedIn<f32>,
    ratio: f64,
    input_rate: u32,
    output_rate: u32,
}

impl MonoResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(VoiceFlowError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, 1).map_err(|e| {
            VoiceFlowError::AudioDevice(format!("Failed to create resampler: {}", e))
        })?;

        debug!("Created resampler: {} Hz -> {} Hz", input_rate, output_rate);

        Ok(Self {
            inner,
            ratio,
            input_rate,
            output_rate,
        })
    }

    /// Resample a complete clip
    ///
    /// The input is zero padded until the filter has flushed, then the
    /// filter delay is dropped from the front so the output lines up with
    /// the input and keeps its tail.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let expected = (input.len() as f64 * self.ratio).ceil() as usize;
        let delay = self.inner.output_delay();
        let mut raw = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

        for chunk in input.chunks(CHUNK_FRAMES) {
            raw.extend(self.run_chunk(chunk)?);
        }
        while raw.len() < expected + delay {
            let produced = self.run_chunk(&[])?;
            if produced.is_empty() {
                break;
            }
            raw.extend(produced);
        }

        self.inner.reset();
        Ok(raw.into_iter().skip(delay).take(expected).collect())
    }

    fn run_chunk(&mut self, chunk: &[f32]) -> Result<Vec<f32>> {
        let mut block = vec![chunk.to_vec()];
        block[0].resize(CHUNK_FRAMES, 0.0);

        let mut produced = self
            .inner
            .process(&block, None)
            .map_err(|e| VoiceFlowError::AudioDevice(format!("Resampling failed: {}", e)))?;
        Ok(produced.pop().unwrap_or_default())
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

/// Resample mono audio in one call; identical rates pass through
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }
    MonoResampler::new(input_rate, output_rate)?.process(input)
}
