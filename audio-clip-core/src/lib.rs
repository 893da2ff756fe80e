//! # audio-clip-core
//!
//! Platform-agnostic rolling audio buffer core.
//!
//! Keeps the last N seconds of a device's audio in memory, shares one
//! capture session per device between any number of listeners, and saves
//! time-windowed clips to disk without interrupting capture. Platform
//! backends (Windows WASAPI) implement the `DeviceProvider`,
//! `CaptureProvider` and `PlaybackOutput` traits.
//!
//! ## Architecture
//!
//! ```text
//! audio-clip-core (this crate)
//! ├── traits/       ← DeviceProvider, CaptureProvider, ClipStore, BufferDelegate, ...
//! ├── models/       ← ClipError, SessionState, WaveFormat, SaveOptions, settings DTOs
//! ├── processing/   ← CircularBuffer, ChunkCollection, PCM helpers, normalization
//! ├── session/      ← CaptureSession, AudioBuffer, BufferManager
//! ├── storage/      ← ClipWriter, FileEncoder, MP3 transcoder
//! ├── playback/     ← Playlist, action behaviours, AudioPlayer
//! └── binding/      ← button bindings over a SettingsStore
//! ```
//!
//! Data flow:
//! ```text
//! [CaptureStream] → [CaptureSession] → [ClipStore] ─ save ─→ [FileEncoder] → disk
//!                          ↑
//! [listeners] → [BufferManager] (retention = max requested duration)
//! ```

pub mod binding;
pub mod models;
pub mod playback;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use binding::capture_binding::CaptureBinding;
pub use binding::playback_binding::PlaybackBinding;
pub use binding::settings_store::JsonSettingsStore;
pub use models::audio_models::{
    AudioDevice, AudioLevels, AudioTransportType, DeviceFlow, SampleFormat, WaveFormat,
    DEFAULT_CAPTURE_DEVICE, DEFAULT_RENDER_DEVICE, MAX_CLIP_DURATION,
};
pub use models::config::{
    BufferManagerConfig, BufferStrategy, Normalization, SaveOptions, TranscodeFormat,
};
pub use models::error::ClipError;
pub use models::save_result::{ClipMetadata, SaveResult};
pub use models::settings::{CaptureAudioSettings, PlayAudioSettings, PlaybackAction, PlaylistOrder};
pub use models::state::SessionState;
pub use playback::player::{AudioPlayer, PlayerState};
pub use playback::playlist::Playlist;
pub use processing::chunk_collection::{Chunk, ChunkCollection};
pub use processing::circular_buffer::{CircularBuffer, CircularClipStore};
pub use session::audio_buffer::AudioBuffer;
pub use session::buffer_manager::{BufferManager, ListenerRegistration};
pub use session::capture_session::CaptureSession;
pub use storage::file_encoder::FileEncoder;
pub use traits::buffer_delegate::BufferDelegate;
pub use traits::capture_provider::{CaptureDirection, CaptureProvider, CaptureSink, CaptureStream};
pub use traits::clip_store::ClipStore;
pub use traits::device_provider::{DeviceChangeObserver, DeviceObservers, DeviceProvider, SubscriptionId};
pub use traits::playback_output::{PlaybackHandle, PlaybackOutput, PlaybackRequest};
pub use traits::settings_store::SettingsStore;
