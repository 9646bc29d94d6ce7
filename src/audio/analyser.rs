use crate::{Result, VoiceFlowError};
use ringbuf::{traits::*, HeapRb};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Frequency magnitude analyser over the most recent `fft_size` samples
///
/// Levels are byte-scaled: each bin's magnitude is mapped from the
/// `[-100, -30]` dB range onto `0..=255`, the same scale the recorder
/// thresholds are expressed in.
pub struct SpectrumAnalyser {
    window: HeapRb<f32>,
    fft: Arc<dyn Fft<f32>>,
    coefficients: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    fft_size: usize,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size < 32 || !fft_size.is_power_of_two() {
            return Err(VoiceFlowError::Config(format!(
                "fft size {} must be a power of two of at least 32",
                fft_size
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Blackman window
        let n = fft_size as f32;
        let coefficients = (0..fft_size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Ok(Self {
            window: HeapRb::new(fft_size),
            fft,
            coefficients,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            fft_size,
        })
    }

    /// Append samples, keeping only the newest `fft_size`
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.window.push_overwrite(sample);
        }
    }

    /// Byte-scaled magnitude per bin, `fft_size / 2` values
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let available = self.window.occupied_len();
        let offset = self.fft_size - available;

        for slot in self.buffer.iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }
        for (i, &sample) in self.window.iter().enumerate() {
            let idx = offset + i;
            self.buffer[idx] = Complex::new(sample * self.coefficients[idx], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        self.buffer[..self.fft_size / 2]
            .iter()
            .map(|c| {
                let magnitude = (c.norm() * scale).max(1e-12);
                let db = 20.0 * magnitude.log10();
                let level = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
                level.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean of the byte-scaled spectrum
    pub fn mean_level(&mut self) -> f32 {
        let bins = self.byte_frequency_data();
        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}
