use std::path::PathBuf;
use std::sync::Arc;

use crate::models::error::ClipError;

/// One file to play on one output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub path: PathBuf,
    pub device_id: String,
    /// Linear volume, 0.0-1.0.
    pub volume: f32,
}

/// A clip that is playing, or has finished playing.
pub trait PlaybackHandle: Send + Sync {
    /// Stop output. Idempotent.
    fn stop(&self);

    /// Block until the clip finished or was stopped.
    fn wait(&self);

    fn is_finished(&self) -> bool;
}

/// Device output used by the playback engine.
pub trait PlaybackOutput: Send + Sync {
    /// Start playing `request` and return immediately.
    fn play(&self, request: &PlaybackRequest) -> Result<Arc<dyn PlaybackHandle>, ClipError>;
}
