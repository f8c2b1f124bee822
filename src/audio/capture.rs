//! Microphone capture abstraction.

use crate::error::Result;
use tokio::sync::mpsc;

/// A live microphone subscription.
///
/// Yields constant-size mono frames in capture order. Dropping the stream
/// releases the device.
pub struct CaptureStream {
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    _device: Option<Box<dyn Send>>,
}

impl CaptureStream {
    /// Stream fed by `frames`, keeping `device` alive until dropped.
    pub fn new(frames: mpsc::UnboundedReceiver<Vec<f32>>, device: Box<dyn Send>) -> Self {
        Self {
            frames,
            _device: Some(device),
        }
    }

    /// Stream with no device attached (the sender side owns the source).
    pub fn from_receiver(frames: mpsc::UnboundedReceiver<Vec<f32>>) -> Self {
        Self {
            frames,
            _device: None,
        }
    }

    /// Next captured frame, or `None` once the device stops.
    pub async fn next_frame(&mut self) -> Option<Vec<f32>> {
        self.frames.recv().await
    }
}

/// Source of microphone audio.
pub trait Microphone: Send + Sync {
    /// Open the microphone at `sample_rate`, delivering frames of exactly
    /// `frame_size` samples.
    ///
    /// Fails with `PermissionDenied` when the user or OS refuses access.
    fn open(&self, sample_rate: u32, frame_size: usize) -> Result<CaptureStream>;
}
