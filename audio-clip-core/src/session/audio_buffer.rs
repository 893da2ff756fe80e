use std::sync::Arc;
use std::time::Duration;

use crate::models::audio_models::{AudioLevels, WaveFormat};
use crate::models::config::{BufferManagerConfig, BufferStrategy, SaveOptions};
use crate::models::error::ClipError;
use crate::models::save_result::SaveResult;
use crate::models::state::SessionState;
use crate::processing::chunk_collection::ChunkCollection;
use crate::processing::circular_buffer::CircularClipStore;
use crate::session::capture_session::CaptureSession;
use crate::storage::file_encoder::FileEncoder;
use crate::traits::buffer_delegate::DelegateSlot;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::clip_store::ClipStore;
use crate::traits::device_provider::DeviceProvider;

/// A device's rolling buffer: one [`CaptureSession`] feeding one
/// [`ClipStore`], with "save the last N seconds" on top.
///
/// Disposing the buffer tears down the session and releases the store.
pub struct AudioBuffer {
    session: CaptureSession,
    store: Arc<dyn ClipStore>,
    delegate: Arc<DelegateSlot>,
}

impl AudioBuffer {
    pub fn new(
        device_id: &str,
        devices: Arc<dyn DeviceProvider>,
        provider: Arc<dyn CaptureProvider>,
        config: &BufferManagerConfig,
        retention: Duration,
        delegate: Arc<DelegateSlot>,
    ) -> Result<Self, ClipError> {
        config.validate().map_err(ClipError::ConfigurationFailed)?;
        let store: Arc<dyn ClipStore> = match config.strategy {
            BufferStrategy::Circular => Arc::new(CircularClipStore::new()),
            BufferStrategy::Chunked { compress } => Arc::new(ChunkCollection::new(
                retention,
                config.flush_delay,
                config.trim_grace,
                compress,
            )?),
        };

        let session = CaptureSession::new(
            device_id,
            devices,
            provider,
            Arc::clone(&store),
            Arc::clone(&delegate),
        );
        session.set_retention(retention)?;

        Ok(Self {
            session,
            store,
            delegate,
        })
    }

    pub fn device_id(&self) -> &str {
        self.session.device_id()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn levels(&self) -> AudioLevels {
        self.session.levels()
    }

    pub fn format(&self) -> Option<WaveFormat> {
        self.session.format()
    }

    pub fn retention(&self) -> Duration {
        self.session.retention()
    }

    pub fn retained_bytes(&self) -> usize {
        self.store.retained_bytes()
    }

    /// Grow or shrink the retention window. Shrinking keeps the newest audio.
    pub fn set_retention(&self, retention: Duration) -> Result<(), ClipError> {
        let current = self.session.retention();
        if current == retention {
            return Ok(());
        }
        log::info!(
            "Buffer for {}: retention {:.1}s -> {:.1}s",
            self.device_id(),
            current.as_secs_f64(),
            retention.as_secs_f64()
        );
        self.session.set_retention(retention)
    }

    pub fn start(&self) -> Result<(), ClipError> {
        self.session.start()
    }

    pub fn restart(&self) -> Result<(), ClipError> {
        self.session.restart()
    }

    /// Copy of up to the last `duration` of audio and its format.
    pub fn snapshot(&self, duration: Duration) -> Result<(Vec<u8>, WaveFormat), ClipError> {
        let format = self.session.format().ok_or_else(|| {
            ClipError::DeviceUnavailable(format!("{}: nothing captured yet", self.device_id()))
        })?;
        let data = self.store.snapshot(duration)?;
        Ok((data, format))
    }

    /// Save up to the last `duration` of audio. Capture keeps running while
    /// the clip is encoded.
    pub fn save(&self, duration: Duration, options: &SaveOptions) -> Result<SaveResult, ClipError> {
        let encoder = FileEncoder::new(options.clone())?;
        let (data, format) = self.snapshot(duration)?;
        log::debug!(
            "Saving {:.1}s of {} ({} bytes)",
            format.duration_of(data.len()).as_secs_f64(),
            self.device_id(),
            data.len()
        );

        match encoder.save(&data, &format, self.device_id()) {
            Ok(result) => {
                self.delegate.clip_saved(&result);
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed to save clip from {}: {}", self.device_id(), e);
                self.delegate.error(self.device_id(), &e);
                Err(e)
            }
        }
    }

    pub fn dispose(&self) {
        self.session.dispose();
        self.store.dispose();
    }
}

impl Drop for AudioBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}
