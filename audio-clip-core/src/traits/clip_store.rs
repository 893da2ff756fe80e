use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::audio_models::WaveFormat;
use crate::models::error::ClipError;

/// Storage behind a device buffer: keeps the most recent audio and hands out
/// consistent snapshots of it.
///
/// Implemented by [`CircularClipStore`](crate::processing::circular_buffer::CircularClipStore)
/// and [`ChunkCollection`](crate::processing::chunk_collection::ChunkCollection).
pub trait ClipStore: Send + Sync {
    /// Size the store to hold `retention` of audio in `format`, keeping the
    /// newest data that still fits. A format change discards all data.
    fn configure(&self, format: WaveFormat, retention: Duration) -> Result<(), ClipError>;

    /// Append captured frames. Called on the capture thread.
    fn push(&self, data: &[u8], timestamp: DateTime<Utc>) -> Result<(), ClipError>;

    /// Copy of up to the last `duration` of audio, oldest byte first, taken
    /// under the store's lock.
    fn snapshot(&self, duration: Duration) -> Result<Vec<u8>, ClipError>;

    /// Bytes currently retained.
    fn retained_bytes(&self) -> usize;

    /// Drop all retained audio.
    fn clear(&self);

    /// Release storage. Later calls fail with `ObjectDisposed`.
    fn dispose(&self);
}
