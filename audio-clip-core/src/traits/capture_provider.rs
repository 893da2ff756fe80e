use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::audio_models::{AudioDevice, DeviceFlow, WaveFormat};
use crate::models::error::ClipError;

/// How a stream reads from its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirection {
    /// Record what an input endpoint hears.
    Input,
    /// Record what is being played to an output endpoint.
    Loopback,
}

impl From<DeviceFlow> for CaptureDirection {
    fn from(flow: DeviceFlow) -> Self {
        match flow {
            DeviceFlow::Capture => Self::Input,
            DeviceFlow::Render => Self::Loopback,
        }
    }
}

/// Receiver of raw frames pushed by a capture stream.
///
/// Called on the platform audio thread: implementations must not block,
/// do disk I/O, or panic.
pub trait CaptureSink: Send + Sync {
    /// Interleaved frames in the stream's [`WaveFormat`].
    fn on_frames(&self, data: &[u8], timestamp: DateTime<Utc>);

    /// The stream stopped delivering frames and will not recover by itself.
    fn on_stream_failed(&self, error: ClipError);
}

/// An opened, not yet started, OS capture handle.
pub trait CaptureStream: Send {
    /// Format of the frames this stream delivers.
    fn format(&self) -> WaveFormat;

    /// Start pushing frames into `sink`. Calling while started is an error.
    fn start(&mut self, sink: Arc<dyn CaptureSink>) -> Result<(), ClipError>;

    /// Stop delivering frames and release the OS handle. Once this returns
    /// the sink is never called again.
    fn stop(&mut self) -> Result<(), ClipError>;
}

/// Interface for platform-specific capture backends.
///
/// Implemented by `WasapiCaptureProvider` on Windows.
pub trait CaptureProvider: Send + Sync {
    /// Open a capture stream against `device`.
    ///
    /// Fails with `DeviceUnavailable` or `PermissionDenied` when the OS
    /// refuses the endpoint.
    fn open(
        &self,
        device: &AudioDevice,
        direction: CaptureDirection,
    ) -> Result<Box<dyn CaptureStream>, ClipError>;
}
