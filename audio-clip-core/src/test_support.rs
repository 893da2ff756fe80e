//! Scripted collaborators shared by unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{AudioDevice, DeviceFlow, WaveFormat};
use crate::models::error::ClipError;
use crate::models::save_result::SaveResult;
use crate::models::state::SessionState;
use crate::traits::buffer_delegate::BufferDelegate;
use crate::traits::capture_provider::{CaptureDirection, CaptureProvider, CaptureSink, CaptureStream};
use crate::traits::device_provider::{DeviceChangeObserver, DeviceObservers, DeviceProvider, SubscriptionId};
use crate::traits::playback_output::{PlaybackHandle, PlaybackOutput, PlaybackRequest};

pub(crate) fn device(id: &str, flow: DeviceFlow, is_default: bool) -> AudioDevice {
    AudioDevice {
        id: id.to_string(),
        name: format!("{id} device"),
        flow,
        is_default,
        transport_type: None,
    }
}

/// Speakers (default render) and a microphone (default capture).
pub(crate) fn standard_devices() -> Arc<MockDeviceProvider> {
    Arc::new(MockDeviceProvider::with_devices(vec![
        device("speakers", DeviceFlow::Render, true),
        device("mic", DeviceFlow::Capture, true),
    ]))
}

pub(crate) struct MockDeviceProvider {
    devices: Mutex<Vec<AudioDevice>>,
    observers: DeviceObservers,
}

impl MockDeviceProvider {
    pub fn with_devices(devices: Vec<AudioDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            observers: DeviceObservers::new(),
        }
    }

    pub fn add(&self, device: AudioDevice) {
        let id = device.id.clone();
        self.devices.lock().push(device);
        self.observers.device_added(&id);
    }

    pub fn remove(&self, id: &str) {
        self.devices.lock().retain(|d| d.id != id);
        self.observers.device_removed(id);
    }

    pub fn set_default(&self, flow: DeviceFlow, id: &str) {
        for device in self.devices.lock().iter_mut().filter(|d| d.flow == flow) {
            device.is_default = device.id == id;
        }
        self.observers.default_changed(flow, id);
    }

    pub fn subscribers(&self) -> usize {
        self.observers.len()
    }
}

impl DeviceProvider for MockDeviceProvider {
    fn list_active_devices(&self) -> Result<Vec<AudioDevice>, ClipError> {
        Ok(self.devices.lock().clone())
    }

    fn resolve_device(&self, id: &str) -> Result<AudioDevice, ClipError> {
        let devices = self.devices.lock();
        let found = match DeviceFlow::from_alias(id) {
            Some(flow) => devices.iter().find(|d| d.flow == flow && d.is_default),
            None => devices.iter().find(|d| d.id == id),
        };
        found
            .cloned()
            .ok_or_else(|| ClipError::DeviceUnavailable(id.to_string()))
    }

    fn subscribe(&self, observer: Arc<dyn DeviceChangeObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.unsubscribe(id);
    }
}

/// One stream handed out by [`MockCaptureProvider`]. Keeps its sink after
/// stop so tests can replay frames through a detached callback.
pub(crate) struct StreamControl {
    pub device_id: String,
    pub direction: CaptureDirection,
    sink: Mutex<Option<Arc<dyn CaptureSink>>>,
    stopped: AtomicBool,
}

impl StreamControl {
    pub fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.sink.lock().is_some()
    }

    /// Deliver frames through this stream's sink even if it was stopped.
    pub fn push(&self, data: &[u8]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_frames(data, Utc::now());
        }
    }

    pub fn fail(&self, error: ClipError) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_stream_failed(error);
        }
    }
}

struct MockStream {
    control: Arc<StreamControl>,
    format: WaveFormat,
}

impl CaptureStream for MockStream {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn start(&mut self, sink: Arc<dyn CaptureSink>) -> Result<(), ClipError> {
        let mut slot = self.control.sink.lock();
        if slot.is_some() {
            return Err(ClipError::Unknown("stream already started".into()));
        }
        *slot = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ClipError> {
        self.control.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockCaptureProvider {
    format: Mutex<WaveFormat>,
    streams: Mutex<Vec<Arc<StreamControl>>>,
    failures: Mutex<HashMap<String, ClipError>>,
}

impl MockCaptureProvider {
    pub fn new(format: WaveFormat) -> Self {
        Self {
            format: Mutex::new(format),
            streams: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_format(&self, format: WaveFormat) {
        *self.format.lock() = format;
    }

    pub fn fail_open(&self, device_id: &str, error: ClipError) {
        self.failures.lock().insert(device_id.to_string(), error);
    }

    pub fn allow_open(&self, device_id: &str) {
        self.failures.lock().remove(device_id);
    }

    /// Streams opened so far, live or not.
    pub fn opened(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn live_streams(&self) -> usize {
        self.streams.lock().iter().filter(|s| s.is_live()).count()
    }

    pub fn live_for(&self, device_id: &str) -> Option<Arc<StreamControl>> {
        self.streams
            .lock()
            .iter()
            .rev()
            .find(|s| s.device_id == device_id && s.is_live())
            .cloned()
    }

    /// Feed frames to the live stream of `device_id`. Returns false if none.
    pub fn feed(&self, device_id: &str, data: &[u8]) -> bool {
        match self.live_for(device_id) {
            Some(stream) => {
                stream.push(data);
                true
            }
            None => false,
        }
    }
}

impl CaptureProvider for MockCaptureProvider {
    fn open(
        &self,
        device: &AudioDevice,
        direction: CaptureDirection,
    ) -> Result<Box<dyn CaptureStream>, ClipError> {
        if let Some(error) = self.failures.lock().get(&device.id) {
            return Err(error.clone());
        }
        let control = Arc::new(StreamControl {
            device_id: device.id.clone(),
            direction,
            sink: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        self.streams.lock().push(Arc::clone(&control));
        Ok(Box::new(MockStream {
            control,
            format: *self.format.lock(),
        }))
    }
}

/// Delegate that records every callback as a string.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    pub events: Mutex<Vec<String>>,
    pub saved: Mutex<Vec<SaveResult>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl BufferDelegate for RecordingDelegate {
    fn on_state_changed(&self, device_id: &str, state: &SessionState) {
        self.events.lock().push(format!("{device_id}:{}", state.name()));
    }

    fn on_error(&self, device_id: &str, error: &ClipError) {
        self.events.lock().push(format!("{device_id}:error:{error}"));
    }

    fn on_clip_saved(&self, result: &SaveResult) {
        self.saved.lock().push(result.clone());
    }
}

/// Handle that finishes when stopped, or on its own when the output runs in
/// auto-finish mode.
pub(crate) struct MockHandle {
    finished: Mutex<bool>,
    done: Condvar,
}

impl MockHandle {
    fn new(finished: bool) -> Self {
        Self {
            finished: Mutex::new(finished),
            done: Condvar::new(),
        }
    }

    pub fn finish(&self) {
        *self.finished.lock() = true;
        self.done.notify_all();
    }
}

impl PlaybackHandle for MockHandle {
    fn stop(&self) {
        self.finish();
    }

    fn wait(&self) {
        let mut finished = self.finished.lock();
        while !*finished {
            self.done.wait(&mut finished);
        }
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock()
    }
}

/// Output that records requests. Clips either end immediately
/// (`auto_finish`) or play until stopped.
pub(crate) struct MockPlaybackOutput {
    auto_finish: bool,
    pub played: Mutex<Vec<PathBuf>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
    played_signal: Condvar,
}

impl MockPlaybackOutput {
    pub fn new(auto_finish: bool) -> Self {
        Self {
            auto_finish,
            played: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            played_signal: Condvar::new(),
        }
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().clone()
    }

    /// Block until at least `count` clips were started, or time out.
    pub fn wait_for_plays(&self, count: usize) -> Vec<PathBuf> {
        let mut played = self.played.lock();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while played.len() < count {
            if self.played_signal.wait_until(&mut played, deadline).timed_out() {
                break;
            }
        }
        played.clone()
    }

    pub fn playing(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// End the oldest clip still playing.
    pub fn finish_current(&self) {
        let handle = self.handles.lock().iter().find(|h| !h.is_finished()).cloned();
        if let Some(handle) = handle {
            handle.finish();
        }
    }
}

impl PlaybackOutput for MockPlaybackOutput {
    fn play(&self, request: &PlaybackRequest) -> Result<Arc<dyn PlaybackHandle>, ClipError> {
        let handle = Arc::new(MockHandle::new(self.auto_finish));
        self.handles.lock().push(Arc::clone(&handle));
        self.played.lock().push(request.path.clone());
        self.played_signal.notify_all();
        Ok(handle)
    }
}

/// Poll `condition` for up to two seconds.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
