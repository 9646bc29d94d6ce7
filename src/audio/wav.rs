use crate::{Result, VoiceFlowError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Encode mono f32 samples as an in-memory 16-bit PCM WAV file
pub fn encode_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceFlowError::Capture(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| VoiceFlowError::Capture(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| VoiceFlowError::Capture(format!("Failed to finalize WAV clip: {}", e)))?;
    }

    debug!("Encoded {} samples at {} Hz", samples.len(), sample_rate);
    Ok(cursor.into_inner())
}

/// Decode little-endian signed 16-bit PCM into f32 samples
///
/// A trailing odd byte is ignored.
pub fn pcm16_le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_encoded_clip_has_header_and_samples() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let bytes = encode_wav_bytes(&samples, 16000).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn test_out_of_range_samples_clamped() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }

    #[test]
    fn test_pcm16_decoding() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x01];
        let samples = pcm16_le_to_f32(&bytes);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 1.0).abs() < 1e-6);
    }
}
