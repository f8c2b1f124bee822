//! WAV export of synthesized PCM payloads.

use crate::error::{BasarError, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{Cursor, Seek, Write};
use std::path::Path;

fn pcm_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn write_pcm<W: Write + Seek>(writer: W, pcm: &[u8], sample_rate: u32, channels: u16) -> Result<()> {
    if pcm.len() % 2 != 0 {
        return Err(BasarError::MalformedAudio(format!(
            "PCM payload of {} bytes is not 16-bit aligned",
            pcm.len()
        )));
    }

    let mut wav = WavWriter::new(writer, pcm_spec(sample_rate, channels))?;
    for pair in pcm.chunks_exact(2) {
        wav.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    wav.finalize()?;
    Ok(())
}

/// Wrap s16le PCM in an in-memory WAV container.
pub fn wav_bytes(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    write_pcm(&mut cursor, pcm, sample_rate, channels)?;
    Ok(cursor.into_inner())
}

/// Write s16le PCM to a WAV file, creating parent directories.
pub fn write_wav(path: &Path, pcm: &[u8], sample_rate: u32, channels: u16) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_pcm(file, pcm, sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_bytes_header_and_samples() {
        let pcm: Vec<u8> = [100i16, -100, 0, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let bytes = wav_bytes(&pcm, 24_000, 1).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(bytes.len(), 44 + pcm.len());

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 0, 32767]);
    }

    #[test]
    fn test_write_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter-1").join("topic-1.wav");
        write_wav(&path, &[0, 0, 1, 0], 24_000, 1).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_rejects_odd_length() {
        assert!(matches!(
            wav_bytes(&[0, 0, 0], 24_000, 1),
            Err(BasarError::MalformedAudio(_))
        ));
    }
}
