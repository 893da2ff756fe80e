use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{AudioDevice, AudioLevels, DeviceFlow, WaveFormat};
use crate::models::error::ClipError;
use crate::models::state::SessionState;
use crate::processing::pcm;
use crate::traits::buffer_delegate::{DeferredEvents, DelegateSlot};
use crate::traits::capture_provider::{CaptureDirection, CaptureProvider, CaptureSink, CaptureStream};
use crate::traits::clip_store::ClipStore;
use crate::traits::device_provider::DeviceProvider;

/// State shared with the frame callback, protected by `parking_lot::Mutex`.
struct Shared {
    device_id: String,
    /// Bumped whenever a stream is detached; callbacks carrying an older
    /// value are ignored.
    generation: AtomicU64,
    store: Arc<dyn ClipStore>,
    levels: Mutex<AudioLevels>,
    state: Mutex<SessionState>,
    delegate: Arc<DelegateSlot>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state.clone();
        }
        log::debug!("Session {} -> {}", self.device_id, state.name());
        self.delegate.state_changed(&self.device_id, &state);
    }

    /// Detach every sink handed out so far.
    fn bump_generation(&self) {
        // Under the state lock so a failing callback cannot overwrite the
        // state of the stream that replaced it.
        let _state = self.state.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Frame callback bound to one stream generation.
struct FrameSink {
    shared: Arc<Shared>,
    generation: u64,
    format: WaveFormat,
}

impl FrameSink {
    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::Acquire) == self.generation
    }
}

impl CaptureSink for FrameSink {
    fn on_frames(&self, data: &[u8], timestamp: DateTime<Utc>) {
        if data.is_empty() || !self.is_current() {
            return;
        }
        if let Err(e) = self.shared.store.push(data, timestamp) {
            log::trace!("Dropped {} bytes from {}: {}", data.len(), self.shared.device_id, e);
            return;
        }
        *self.shared.levels.lock() = pcm::measure_levels(data, &self.format);
    }

    fn on_stream_failed(&self, error: ClipError) {
        let error = error.into_device_unavailable(&self.shared.device_id);
        {
            let mut state = self.shared.state.lock();
            if !self.is_current() {
                return;
            }
            *state = SessionState::Failed(error.clone());
        }
        log::error!("Capture stream for {} failed: {}", self.shared.device_id, error);
        let state = SessionState::Failed(error.clone());
        self.shared.delegate.state_changed(&self.shared.device_id, &state);
        self.shared.delegate.error(&self.shared.device_id, &error);
    }
}

/// Fields only touched by lifecycle calls, never by the frame callback.
struct Control {
    stream: Option<Box<dyn CaptureStream>>,
    device: Option<AudioDevice>,
    format: Option<WaveFormat>,
    retention: Duration,
    disposed: bool,
}

/// Owns the single OS capture stream of one logical device and pushes its
/// frames into a [`ClipStore`].
///
/// The logical id may be one of the default aliases; it is resolved again on
/// every (re)start so the session follows default endpoint changes.
pub struct CaptureSession {
    shared: Arc<Shared>,
    devices: Arc<dyn DeviceProvider>,
    provider: Arc<dyn CaptureProvider>,
    control: Mutex<Control>,
}

impl CaptureSession {
    pub fn new(
        device_id: impl Into<String>,
        devices: Arc<dyn DeviceProvider>,
        provider: Arc<dyn CaptureProvider>,
        store: Arc<dyn ClipStore>,
        delegate: Arc<DelegateSlot>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                device_id: device_id.into(),
                generation: AtomicU64::new(0),
                store,
                levels: Mutex::new(AudioLevels::default()),
                state: Mutex::new(SessionState::Idle),
                delegate,
            }),
            devices,
            provider,
            control: Mutex::new(Control {
                stream: None,
                device: None,
                format: None,
                retention: Duration::ZERO,
                disposed: false,
            }),
        }
    }

    /// Logical device id this session was created for.
    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn levels(&self) -> AudioLevels {
        *self.shared.levels.lock()
    }

    /// Format of the current (or last) stream.
    pub fn format(&self) -> Option<WaveFormat> {
        self.control.lock().format
    }

    /// Endpoint the logical id resolved to on the last start.
    pub fn device(&self) -> Option<AudioDevice> {
        self.control.lock().device.clone()
    }

    pub fn retention(&self) -> Duration {
        self.control.lock().retention
    }

    /// The flow whose default endpoint this session follows, if bound to an alias.
    pub fn follows_default(&self) -> Option<DeviceFlow> {
        DeviceFlow::from_alias(&self.shared.device_id)
    }

    /// Whether `endpoint_id` is this session's logical id or resolved endpoint.
    pub fn is_bound_to(&self, endpoint_id: &str) -> bool {
        self.shared.device_id == endpoint_id
            || self
                .control
                .lock()
                .device
                .as_ref()
                .is_some_and(|d| d.id == endpoint_id)
    }

    /// Resize the store for `retention`. Before the first start only the
    /// value is recorded.
    pub fn set_retention(&self, retention: Duration) -> Result<(), ClipError> {
        let mut control = self.control.lock();
        self.ensure_live(&control)?;
        control.retention = retention;
        if let Some(format) = control.format {
            self.shared.store.configure(format, retention)?;
        }
        Ok(())
    }

    /// Open and start the stream. A no-op while capturing.
    pub fn start(&self) -> Result<(), ClipError> {
        let _events = DeferredEvents::hold();
        let mut control = self.control.lock();
        self.start_locked(&mut control)
    }

    /// Stop the stream, keeping buffered audio.
    pub fn stop(&self) -> Result<(), ClipError> {
        let _events = DeferredEvents::hold();
        let mut control = self.control.lock();
        if control.disposed {
            return Ok(());
        }
        let result = self.release_locked(&mut control);
        self.shared.set_state(SessionState::Idle);
        result
    }

    /// Tear down and reopen the stream against the same logical device.
    pub fn restart(&self) -> Result<(), ClipError> {
        let _events = DeferredEvents::hold();
        let mut control = self.control.lock();
        self.ensure_live(&control)?;
        log::info!("Restarting capture for {}", self.shared.device_id);
        self.shared.set_state(SessionState::Restarting);
        if let Err(e) = self.release_locked(&mut control) {
            log::warn!("Ignoring stop failure while restarting {}: {}", self.shared.device_id, e);
        }
        self.start_locked(&mut control)
    }

    /// Stop the stream and mark the session failed, e.g. when its endpoint
    /// disappeared. Buffered audio stays saveable.
    pub fn fail(&self, error: ClipError) {
        let _events = DeferredEvents::hold();
        let mut control = self.control.lock();
        if control.disposed {
            return;
        }
        if let Err(e) = self.release_locked(&mut control) {
            log::warn!("Ignoring stop failure on {}: {}", self.shared.device_id, e);
        }
        let error = error.into_device_unavailable(&self.shared.device_id);
        log::warn!("Capture for {} failed: {}", self.shared.device_id, error);
        self.shared.set_state(SessionState::Failed(error.clone()));
        self.shared.delegate.error(&self.shared.device_id, &error);
    }

    /// Stop the stream for good. Later lifecycle calls fail with `ObjectDisposed`.
    pub fn dispose(&self) {
        let _events = DeferredEvents::hold();
        let mut control = self.control.lock();
        if control.disposed {
            return;
        }
        if let Err(e) = self.release_locked(&mut control) {
            log::warn!("Ignoring stop failure while disposing {}: {}", self.shared.device_id, e);
        }
        control.disposed = true;
        self.shared.set_state(SessionState::Disposed);
        log::debug!("Disposed capture session for {}", self.shared.device_id);
    }

    fn ensure_live(&self, control: &Control) -> Result<(), ClipError> {
        if control.disposed {
            return Err(ClipError::ObjectDisposed(format!(
                "capture session {}",
                self.shared.device_id
            )));
        }
        Ok(())
    }

    fn start_locked(&self, control: &mut Control) -> Result<(), ClipError> {
        self.ensure_live(control)?;
        if control.stream.is_some() {
            if self.shared.state.lock().is_capturing() {
                return Ok(());
            }
            // The stream reported a failure; replace it.
            if let Err(e) = self.release_locked(control) {
                log::warn!("Ignoring stop failure on {}: {}", self.shared.device_id, e);
            }
        }

        match self.open_locked(control) {
            Ok(()) => {
                self.shared.set_state(SessionState::Capturing);
                Ok(())
            }
            Err(e) => {
                let error = e.into_device_unavailable(&self.shared.device_id);
                log::error!("Failed to start capture for {}: {}", self.shared.device_id, error);
                self.shared.set_state(SessionState::Failed(error.clone()));
                self.shared.delegate.error(&self.shared.device_id, &error);
                Err(error)
            }
        }
    }

    fn open_locked(&self, control: &mut Control) -> Result<(), ClipError> {
        let device = self.devices.resolve_device(&self.shared.device_id)?;
        let direction = CaptureDirection::from(device.flow);
        let mut stream = self.provider.open(&device, direction)?;

        let format = stream.format();
        format.validate().map_err(ClipError::ConfigurationFailed)?;
        if let Some(previous) = control.format.filter(|f| *f != format) {
            log::info!(
                "Format of {} changed from {} to {}",
                self.shared.device_id,
                previous,
                format
            );
        }
        self.shared.store.configure(format, control.retention)?;

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let sink = Arc::new(FrameSink {
            shared: Arc::clone(&self.shared),
            generation,
            format,
        });
        stream.start(sink)?;

        log::info!(
            "Capturing {} from {} ({:?}, {})",
            self.shared.device_id,
            device.name,
            direction,
            format
        );
        control.stream = Some(stream);
        control.device = Some(device);
        control.format = Some(format);
        Ok(())
    }

    fn release_locked(&self, control: &mut Control) -> Result<(), ClipError> {
        self.shared.bump_generation();
        *self.shared.levels.lock() = AudioLevels::default();
        match control.stream.take() {
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::circular_buffer::CircularClipStore;
    use crate::test_support::{standard_devices, MockCaptureProvider, RecordingDelegate};

    struct Fixture {
        provider: Arc<MockCaptureProvider>,
        store: Arc<CircularClipStore>,
        delegate: Arc<RecordingDelegate>,
        session: CaptureSession,
    }

    fn fixture(device_id: &str) -> Fixture {
        let provider = Arc::new(MockCaptureProvider::new(WaveFormat::pcm16(1000, 1)));
        let store = Arc::new(CircularClipStore::new());
        let delegate = Arc::new(RecordingDelegate::default());
        let slot = Arc::new(DelegateSlot::default());
        slot.set(Some(delegate.clone()));
        let session = CaptureSession::new(
            device_id,
            standard_devices(),
            provider.clone(),
            store.clone(),
            slot,
        );
        session.set_retention(Duration::from_secs(1)).unwrap();
        Fixture {
            provider,
            store,
            delegate,
            session,
        }
    }

    #[test]
    fn start_is_idempotent() {
        let f = fixture("mic");
        f.session.start().unwrap();
        f.session.start().unwrap();

        assert_eq!(f.provider.opened(), 1);
        assert_eq!(f.session.state(), SessionState::Capturing);
        assert_eq!(f.delegate.events(), vec!["mic:capturing"]);
    }

    #[test]
    fn direction_follows_device_flow() {
        let f = fixture("speakers");
        f.session.start().unwrap();
        let stream = f.provider.live_for("speakers").unwrap();
        assert_eq!(stream.direction, CaptureDirection::Loopback);

        let f = fixture("mic");
        f.session.start().unwrap();
        assert_eq!(
            f.provider.live_for("mic").unwrap().direction,
            CaptureDirection::Input
        );
    }

    #[test]
    fn alias_resolves_to_default_endpoint() {
        let f = fixture("default-capture");
        f.session.start().unwrap();

        assert_eq!(f.session.device().unwrap().id, "mic");
        assert_eq!(f.session.follows_default(), Some(DeviceFlow::Capture));
        assert!(f.session.is_bound_to("mic"));
        assert!(f.session.is_bound_to("default-capture"));
        assert!(!f.session.is_bound_to("speakers"));
    }

    #[test]
    fn frames_reach_store_and_levels() {
        let f = fixture("mic");
        f.session.start().unwrap();
        let frames = pcm::encode_samples(&[0.5, -0.5], &WaveFormat::pcm16(1000, 1));

        assert!(f.provider.feed("mic", &frames));

        assert_eq!(f.store.retained_bytes(), 4);
        assert!(f.session.levels().peak > 0.49);
        // One second of 16-bit mono at 1 kHz.
        assert_eq!(f.store.capacity(), 2000);
    }

    #[test]
    fn restart_detaches_previous_callback() {
        let f = fixture("mic");
        f.session.start().unwrap();
        let old = f.provider.live_for("mic").unwrap();

        f.session.restart().unwrap();
        old.push(&[1, 2, 3, 4]);
        assert_eq!(f.store.retained_bytes(), 0);

        f.provider.feed("mic", &[5, 6]);
        assert_eq!(f.store.retained_bytes(), 2);
        assert_eq!(f.provider.opened(), 2);
        assert_eq!(f.provider.live_streams(), 1);
        assert_eq!(
            f.delegate.events(),
            vec!["mic:capturing", "mic:restarting", "mic:capturing"]
        );
    }

    #[test]
    fn open_failure_reports_device_unavailable() {
        let f = fixture("mic");
        f.provider.fail_open("mic", ClipError::PermissionDenied);

        let err = f.session.start().unwrap_err();

        assert_eq!(err, ClipError::DeviceUnavailable("mic: permission denied".into()));
        assert!(f.session.state().is_failed());
        assert_eq!(f.provider.live_streams(), 0);
        assert!(f.delegate.events().iter().any(|e| e.starts_with("mic:error:")));
    }

    #[test]
    fn unknown_device_is_unavailable() {
        let f = fixture("headset");
        assert!(matches!(f.session.start(), Err(ClipError::DeviceUnavailable(_))));
    }

    #[test]
    fn stream_failure_then_start_recovers() {
        let f = fixture("mic");
        f.session.start().unwrap();
        f.provider
            .live_for("mic")
            .unwrap()
            .fail(ClipError::Unknown("endpoint invalidated".into()));
        assert!(f.session.state().is_failed());

        f.session.start().unwrap();

        assert_eq!(f.session.state(), SessionState::Capturing);
        assert_eq!(f.provider.live_streams(), 1);
    }

    #[test]
    fn format_change_on_restart_discards_audio() {
        let f = fixture("mic");
        f.session.start().unwrap();
        f.provider.feed("mic", &[1, 2, 3, 4]);

        f.provider.set_format(WaveFormat::pcm16(2000, 1));
        f.session.restart().unwrap();

        assert_eq!(f.session.format(), Some(WaveFormat::pcm16(2000, 1)));
        assert_eq!(f.store.retained_bytes(), 0);
        assert_eq!(f.store.capacity(), 4000);
    }

    #[test]
    fn stop_keeps_buffered_audio() {
        let f = fixture("mic");
        f.session.start().unwrap();
        f.provider.feed("mic", &[1, 2]);
        f.session.stop().unwrap();

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.store.retained_bytes(), 2);
        assert!(!f.provider.feed("mic", &[3, 4]));
    }

    #[test]
    fn disposed_session_rejects_lifecycle_calls() {
        let f = fixture("mic");
        f.session.start().unwrap();
        f.session.dispose();

        assert_eq!(f.session.state(), SessionState::Disposed);
        assert_eq!(f.provider.live_streams(), 0);
        assert!(matches!(f.session.start(), Err(ClipError::ObjectDisposed(_))));
        assert!(matches!(f.session.restart(), Err(ClipError::ObjectDisposed(_))));
    }
}
