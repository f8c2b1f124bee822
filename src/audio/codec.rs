//! Conversions between transport text, PCM bytes and float samples.
//!
//! The remote services exchange audio as base64 text wrapping interleaved
//! signed 16-bit little-endian PCM. Internally audio is `f32` in `[-1.0, 1.0)`.

use crate::error::{BasarError, Result};
use base64::{engine::general_purpose, Engine as _};

/// Scale between `i16` samples and normalized floats.
const PCM_SCALE: f32 = 32768.0;

/// Decoded PCM audio, one sample vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioFrame {
    /// Mono frame from a single sample vector.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.len())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Encode bytes as standard base64.
pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 back into bytes.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| BasarError::MalformedAudio(format!("Invalid base64 audio: {}", e)))
}

/// Interpret interleaved s16le bytes as normalized float samples.
pub fn decode_pcm(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<AudioFrame> {
    if channel_count == 0 {
        return Err(BasarError::MalformedAudio(
            "Channel count must be at least 1".to_string(),
        ));
    }

    let block = 2 * channel_count as usize;
    if bytes.len() % block != 0 {
        return Err(BasarError::MalformedAudio(format!(
            "{} bytes is not a multiple of {} ({} channel(s) of 16-bit samples)",
            bytes.len(),
            block,
            channel_count
        )));
    }

    let frames = bytes.len() / block;
    let mut channels = vec![Vec::with_capacity(frames); channel_count as usize];

    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        channels[i % channel_count as usize].push(sample as f32 / PCM_SCALE);
    }

    Ok(AudioFrame {
        sample_rate,
        channels,
    })
}

/// Quantize float samples to s16le bytes, clamping out-of-range input.
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let scaled = (s * PCM_SCALE).clamp(i16::MIN as f32, i16::MAX as f32);
            (scaled as i16).to_le_bytes()
        })
        .collect()
}

/// Duration of a PCM payload in seconds.
pub fn pcm_duration_secs(byte_len: usize, sample_rate: u32, channel_count: u16) -> f64 {
    if sample_rate == 0 || channel_count == 0 {
        return 0.0;
    }
    (byte_len / (2 * channel_count as usize)) as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let inputs: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![255, 0, 128],
            (0..=255).collect(),
            b"lecture audio".to_vec(),
        ];
        for input in inputs {
            assert_eq!(decode(&encode(&input)).unwrap(), input);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not base64!!"), Err(BasarError::MalformedAudio(_))));
    }

    #[test]
    fn test_decode_pcm_mono() {
        let bytes = [0x00, 0x80, 0x00, 0x00, 0xFF, 0x7F];
        let frame = decode_pcm(&bytes, 24_000, 1).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.channels[0][0], -1.0);
        assert_eq!(frame.channels[0][1], 0.0);
        assert!(frame.channels[0][2] < 1.0);
        assert!(frame.channels[0][2] > 0.999);
    }

    #[test]
    fn test_decode_pcm_deinterleaves() {
        // L=1, R=-1, L=2, R=-2
        let samples: [i16; 4] = [1, -1, 2, -2];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let frame = decode_pcm(&bytes, 16_000, 2).unwrap();

        assert_eq!(frame.channel_count(), 2);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.channels[0], vec![1.0 / 32768.0, 2.0 / 32768.0]);
        assert_eq!(frame.channels[1], vec![-1.0 / 32768.0, -2.0 / 32768.0]);
    }

    #[test]
    fn test_decode_pcm_values_in_range() {
        let bytes: Vec<u8> = (0..=u16::MAX)
            .step_by(7)
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let frame = decode_pcm(&bytes, 24_000, 1).unwrap();
        assert!(frame.channels[0].iter().all(|&s| (-1.0..1.0).contains(&s)));
    }

    #[test]
    fn test_decode_pcm_rejects_partial_blocks() {
        assert!(matches!(
            decode_pcm(&[0, 0, 0], 24_000, 1),
            Err(BasarError::MalformedAudio(_))
        ));
        assert!(matches!(
            decode_pcm(&[0, 0, 0, 0, 0, 0], 24_000, 2),
            Err(BasarError::MalformedAudio(_))
        ));
        assert!(decode_pcm(&[0, 0], 24_000, 0).is_err());
    }

    #[test]
    fn test_encode_pcm_truncates_and_clamps() {
        let bytes = encode_pcm(&[0.0, 0.5, -0.5, 1.0, -1.0, 3.0, -3.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![0, 16384, -16384, 32767, -32768, 32767, -32768]);
    }

    #[test]
    fn test_pcm_inverse_for_representable_values() {
        let original: Vec<f32> = vec![-1.0, -0.25, 0.0, 0.125, 0.5];
        let frame = decode_pcm(&encode_pcm(&original), 16_000, 1).unwrap();
        assert_eq!(frame.channels[0], original);
    }

    #[test]
    fn test_duration() {
        assert_eq!(pcm_duration_secs(48_000, 24_000, 1), 1.0);
        assert_eq!(pcm_duration_secs(0, 24_000, 1), 0.0);
        let frame = AudioFrame::mono(16_000, vec![0.0; 4096]);
        assert_eq!(frame.duration_secs(), 0.256);
    }

    #[test]
    fn test_to_mono_averages() {
        let frame = AudioFrame {
            sample_rate: 16_000,
            channels: vec![vec![1.0, 0.0], vec![0.0, 0.5]],
        };
        assert_eq!(frame.to_mono(), vec![0.5, 0.25]);
    }
}
