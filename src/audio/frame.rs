//! Constant-size capture frames.
//!
//! Audio devices deliver callback buffers of arbitrary length. The realtime
//! channel expects a steady cadence of equally sized frames, so captured
//! samples pass through a [`FrameAssembler`] first, after rubato has
//! brought them to the channel rate.

use crate::error::{BasarError, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::warn;

/// Re-chunks a stream of mono samples into frames of exactly `frame_size`.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the next complete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and return every frame they complete, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(frame);
            }
        }

        frames
    }
}

/// Average interleaved multi-channel samples into mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Input frames handed to the FFT resampler per call.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

fn fft_resampler(from_rate: u32, to_rate: u32) -> Result<FftFixedIn<f32>> {
    FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLER_CHUNK_SIZE, 1, 1)
        .map_err(|e| {
            BasarError::Resample(format!("{}Hz -> {}Hz: {}", from_rate, to_rate, e))
        })
}

/// Resampled length of `len` samples, rounded to the nearest frame.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    ((len as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate.max(1) as u64) as usize
}

/// Resample a complete mono buffer.
///
/// The result has exactly [`resampled_len`] samples with the filter delay
/// removed, so buffers scheduled back to back on the output clock stay
/// contiguous.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let expected = resampled_len(samples.len(), from_rate, to_rate);
    let mut resampler = fft_resampler(from_rate, to_rate)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + RESAMPLER_CHUNK_SIZE);
    let mut chunk = vec![0.0f32; RESAMPLER_CHUNK_SIZE];
    let mut position = 0;

    // Zero padding past the end flushes the filter tail.
    let limit = samples.len() + delay * from_rate as usize / to_rate as usize + 4 * RESAMPLER_CHUNK_SIZE;
    while output.len() < expected + delay && position < limit {
        chunk.fill(0.0);
        if position < samples.len() {
            let end = (position + RESAMPLER_CHUNK_SIZE).min(samples.len());
            chunk[..end - position].copy_from_slice(&samples[position..end]);
        }
        position += RESAMPLER_CHUNK_SIZE;

        let processed = resampler
            .process(&[&chunk[..]], None)
            .map_err(|e| BasarError::Resample(e.to_string()))?;
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

/// Streaming capture path: device-rate mono in, constant-size frames at the
/// channel rate out.
///
/// One resampler lives for the whole capture so callback buffers of any size
/// join without edge loss.
pub struct CaptureResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
    assembler: FrameAssembler,
}

impl CaptureResampler {
    pub fn new(from_rate: u32, to_rate: u32, frame_size: usize) -> Result<Self> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            Some(fft_resampler(from_rate, to_rate)?)
        };
        Ok(Self {
            resampler,
            in_buf: Vec::with_capacity(RESAMPLER_CHUNK_SIZE),
            assembler: FrameAssembler::new(frame_size),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Feed device samples and return every frame they complete, in order.
    pub fn push(&mut self, mut samples: &[f32]) -> Vec<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return self.assembler.push(samples);
        };

        let mut frames = Vec::new();
        while !samples.is_empty() {
            let take = (RESAMPLER_CHUNK_SIZE - self.in_buf.len()).min(samples.len());
            self.in_buf.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.in_buf.len() == RESAMPLER_CHUNK_SIZE {
                match resampler.process(&[&self.in_buf[..]], None) {
                    Ok(out) => frames.extend(self.assembler.push(&out[0])),
                    Err(e) => warn!("Dropping capture chunk: {}", e),
                }
                self.in_buf.clear();
            }
        }
        frames
    }
}
