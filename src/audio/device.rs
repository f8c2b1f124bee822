//! System audio devices through CPAL.
//!
//! CPAL streams are not `Send` on every platform, so each stream lives on a
//! dedicated thread and is torn down when its guard is dropped.

use super::capture::{CaptureStream, Microphone};
use super::frame::{downmix, resample, CaptureResampler};
use super::playback::{AudioOutput, SourceId};
use crate::error::{BasarError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Keeps a device thread alive; dropping it stops the stream.
struct DeviceGuard {
    _stop: std_mpsc::Sender<()>,
}

/// Run `build` on a fresh thread, keep the stream it returns playing until
/// the returned guard is dropped.
fn spawn_stream_thread<F>(name: &str, build: F) -> Result<DeviceGuard>
where
    F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(BasarError::PermissionDenied(format!(
                    "Failed to start audio stream: {}",
                    e
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // Blocks until the guard's sender is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        })?;

    ready_rx
        .recv()
        .map_err(|_| BasarError::Device("Audio thread exited during setup".to_string()))??;

    Ok(DeviceGuard { _stop: stop_tx })
}

/// Default system microphone.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

impl Microphone for CpalMicrophone {
    fn open(&self, sample_rate: u32, frame_size: usize) -> Result<CaptureStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        let guard = spawn_stream_thread("basar-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| BasarError::Device("No input device available".to_string()))?;

            let config = device.default_input_config().map_err(|e| {
                BasarError::PermissionDenied(format!("Cannot query microphone: {}", e))
            })?;
            let native_rate = config.sample_rate().0;
            let channels = config.channels() as usize;
            let format = config.sample_format();
            let stream_config: StreamConfig = config.into();

            info!(
                "Capturing from {} ({}ch/{}Hz/{:?}), sending {}Hz frames of {}",
                device.name().unwrap_or_else(|_| "unknown".to_string()),
                channels,
                native_rate,
                format,
                sample_rate,
                frame_size
            );

            let mut resampler = CaptureResampler::new(native_rate, sample_rate, frame_size)?;
            let mut deliver = move |interleaved: &[f32]| {
                let mono = downmix(interleaved, channels);
                for frame in resampler.push(&mono) {
                    let _ = tx.send(frame);
                }
            };

            let on_error = |err| error!("Microphone stream error: {}", err);

            let stream = match format {
                SampleFormat::F32 => device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| deliver(data),
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        deliver(&floats)
                    },
                    on_error,
                    None,
                ),
                other => {
                    return Err(BasarError::Device(format!(
                        "Unsupported microphone sample format: {:?}",
                        other
                    )))
                }
            };

            stream.map_err(|e| {
                BasarError::PermissionDenied(format!("Microphone unavailable: {}", e))
            })
        })?;

        Ok(CaptureStream::new(rx, Box::new(guard)))
    }
}

struct PlayingSource {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
    position: usize,
}

impl PlayingSource {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Start frames within this distance of a scheduled end are joined to it.
const SNAP_FRAMES: u64 = 2;

#[derive(Default)]
struct MixerState {
    frames_played: u64,
    sources: Vec<PlayingSource>,
    finished: Vec<SourceId>,
}

impl MixerState {
    /// Queue `samples` at `start_frame`, joining it to a source that ends
    /// within rounding distance so sequential chunks play without a gap.
    fn schedule(&mut self, id: SourceId, samples: Vec<f32>, start_frame: u64) {
        let start_frame = self
            .sources
            .iter()
            .map(PlayingSource::end_frame)
            .find(|&end| end.abs_diff(start_frame) <= SNAP_FRAMES)
            .unwrap_or(start_frame);
        self.sources.push(PlayingSource {
            id,
            samples,
            start_frame,
            position: 0,
        });
    }

    /// Fill `out` (interleaved, `channels` wide) with the mix of all sources.
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let frames = out.len() / channels.max(1);
        for i in 0..frames {
            let clock = self.frames_played + i as u64;
            let mut mixed = 0.0f32;
            for source in self.sources.iter_mut() {
                if clock >= source.start_frame && source.position < source.samples.len() {
                    mixed += source.samples[source.position];
                    source.position += 1;
                }
            }
            let mixed = mixed.clamp(-1.0, 1.0);
            for c in 0..channels {
                out[i * channels + c] = mixed;
            }
        }
        self.frames_played += frames as u64;

        let finished = &mut self.finished;
        self.sources.retain(|s| {
            let done = s.position >= s.samples.len();
            if done {
                finished.push(s.id);
            }
            !done
        });
    }
}

/// Default system speaker with a sample-accurate clock.
pub struct CpalOutput {
    state: Arc<Mutex<MixerState>>,
    sample_rate: u32,
    _guard: DeviceGuard,
}

impl CpalOutput {
    pub fn open() -> Result<Self> {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let (rate_tx, rate_rx) = std_mpsc::channel::<u32>();
        let mixer = state.clone();

        let guard = spawn_stream_thread("basar-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| BasarError::Device("No output device available".to_string()))?;
            let config = device
                .default_output_config()
                .map_err(|e| BasarError::Device(format!("Cannot query speaker: {}", e)))?;

            if config.sample_format() != SampleFormat::F32 {
                return Err(BasarError::Device(format!(
                    "Unsupported speaker sample format: {:?}",
                    config.sample_format()
                )));
            }

            let channels = config.channels() as usize;
            let _ = rate_tx.send(config.sample_rate().0);
            let stream_config: StreamConfig = config.into();

            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if let Ok(mut state) = mixer.lock() {
                            state.render(data, channels);
                        } else {
                            data.fill(0.0);
                        }
                    },
                    |err| error!("Speaker stream error: {}", err),
                    None,
                )
                .map_err(|e| BasarError::Device(format!("Speaker unavailable: {}", e)))
        })?;

        let sample_rate = rate_rx
            .recv()
            .map_err(|_| BasarError::Device("Speaker sample rate unknown".to_string()))?;
        debug!("Speaker opened at {}Hz", sample_rate);

        Ok(Self {
            state,
            sample_rate,
            _guard: guard,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MixerState> {
        // A poisoned mixer only means a render callback panicked; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.lock().frames_played as f64 / self.sample_rate as f64
    }

    fn start_source(
        &mut self,
        id: SourceId,
        samples: Vec<f32>,
        sample_rate: u32,
        start_at: f64,
    ) -> Result<()> {
        let samples = resample(&samples, sample_rate, self.sample_rate)?;
        let start_frame = (start_at * self.sample_rate as f64).round().max(0.0) as u64;
        self.lock().schedule(id, samples, start_frame);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        self.lock().sources.retain(|s| s.id != id);
    }

    fn drain_finished(&mut self) -> Vec<SourceId> {
        std::mem::take(&mut self.lock().finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_respects_start_frames() {
        let mut state = MixerState::default();
        state.sources.push(PlayingSource {
            id: 1,
            samples: vec![0.5, 0.5],
            start_frame: 2,
            position: 0,
        });

        let mut out = vec![9.0; 8];
        state.render(&mut out, 2);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(state.frames_played, 4);
        assert_eq!(state.finished, vec![1]);
        assert!(state.sources.is_empty());
    }

    #[test]
    fn test_back_to_back_chunks_play_without_gap() {
        // Two 50 ms agent chunks at 24 kHz on a 48 kHz speaker, started at the
        // times a playback cursor would give them.
        let output_rate = 48_000;
        let chunk = vec![0.1f32; 1_200];
        let mut state = MixerState::default();
        let mut start_at = 0.0;
        for id in 1..=2 {
            let samples = resample(&chunk, 24_000, output_rate).unwrap();
            let start_frame = (start_at * output_rate as f64).round() as u64;
            state.schedule(id, samples, start_frame);
            start_at += 1_200.0 / 24_000.0;
        }

        let mut out = vec![0.0; 4_800];
        state.render(&mut out, 1);
        assert!(
            out.iter().all(|s| s.abs() > 1e-4),
            "silent frame at {:?}",
            out.iter().position(|s| s.abs() <= 1e-4)
        );
        assert_eq!(state.finished, vec![1, 2]);
    }

    #[test]
    fn test_schedule_joins_rounded_start_to_previous_end() {
        let mut state = MixerState::default();
        state.schedule(1, vec![0.2; 100], 0);
        state.schedule(2, vec![0.2; 100], 99);
        state.schedule(3, vec![0.2; 10], 500);

        assert_eq!(state.sources[1].start_frame, 100);
        assert_eq!(state.sources[2].start_frame, 500);
    }
}
