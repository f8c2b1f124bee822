//! Audio processing for Basar.
//!
//! - `codec` converts between base64 transport text, s16le PCM and floats
//! - `frame` assembles constant-size capture frames
//! - `playback` schedules chunks gaplessly on an output clock
//! - `capture` abstracts the microphone
//! - `wav` exports PCM payloads
//! - `device` (feature `device-audio`) binds the above to the system devices

pub mod capture;
pub mod codec;
#[cfg(feature = "device-audio")]
pub mod device;
pub mod frame;
pub mod playback;
pub mod wav;

pub use capture::{CaptureStream, Microphone};
pub use codec::{decode, decode_pcm, encode, encode_pcm, pcm_duration_secs, AudioFrame};
pub use frame::FrameAssembler;
pub use playback::{AudioOutput, PlaybackQueue, SilentOutput, SourceId};
pub use wav::{wav_bytes, write_wav};

/// Sample rate of speech produced by the remote services.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Open the system speaker when built with device support, otherwise a
/// silent timeline.
pub fn default_output() -> Box<dyn AudioOutput> {
    #[cfg(feature = "device-audio")]
    {
        match device::CpalOutput::open() {
            Ok(output) => return Box::new(output),
            Err(e) => tracing::warn!("Falling back to silent output: {}", e),
        }
    }
    Box::new(SilentOutput::new())
}

/// The system microphone, when built with device support.
pub fn default_microphone() -> Option<std::sync::Arc<dyn Microphone>> {
    #[cfg(feature = "device-audio")]
    {
        return Some(std::sync::Arc::new(device::CpalMicrophone::new()));
    }
    #[allow(unreachable_code)]
    None
}
