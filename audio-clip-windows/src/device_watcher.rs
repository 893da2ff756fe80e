//! Device provider for Windows endpoints with change notification.
//!
//! `WindowsDeviceProvider` answers enumeration and resolution queries on the
//! caller's thread and runs a watcher thread that polls the endpoint list.
//! Each poll is diffed against the previous one and raised through
//! [`DeviceObservers`] in the order removed, added, default changed, so a
//! session bound to a vanished endpoint fails before its replacement
//! arrives.

use std::collections::BTreeSet;

use audio_clip_core::{AudioDevice, DeviceFlow, DeviceObservers};

/// What the watcher saw on one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub ids: BTreeSet<String>,
    pub default_capture: Option<String>,
    pub default_render: Option<String>,
}

/// A single change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Removed(String),
    Added(String),
    DefaultChanged(DeviceFlow, String),
}

impl DeviceSnapshot {
    pub fn from_devices(devices: &[AudioDevice]) -> Self {
        let mut snapshot = Self::default();
        for device in devices {
            snapshot.ids.insert(device.id.clone());
            if device.is_default {
                match device.flow {
                    DeviceFlow::Capture => snapshot.default_capture = Some(device.id.clone()),
                    DeviceFlow::Render => snapshot.default_render = Some(device.id.clone()),
                }
            }
        }
        snapshot
    }

    fn default_for(&self, flow: DeviceFlow) -> Option<&String> {
        match flow {
            DeviceFlow::Capture => self.default_capture.as_ref(),
            DeviceFlow::Render => self.default_render.as_ref(),
        }
    }

    /// Events that turn `self` into `next`.
    pub fn diff(&self, next: &DeviceSnapshot) -> Vec<DeviceEvent> {
        let mut events: Vec<DeviceEvent> = self
            .ids
            .difference(&next.ids)
            .map(|id| DeviceEvent::Removed(id.clone()))
            .collect();
        events.extend(
            next.ids
                .difference(&self.ids)
                .map(|id| DeviceEvent::Added(id.clone())),
        );
        for flow in [DeviceFlow::Capture, DeviceFlow::Render] {
            // A flow with no default left is covered by the removal.
            if let Some(id) = next.default_for(flow) {
                if self.default_for(flow) != Some(id) {
                    events.push(DeviceEvent::DefaultChanged(flow, id.clone()));
                }
            }
        }
        events
    }
}

pub fn dispatch(observers: &DeviceObservers, events: &[DeviceEvent]) {
    for event in events {
        match event {
            DeviceEvent::Removed(id) => {
                log::info!("Audio endpoint removed: {}", id);
                observers.device_removed(id);
            }
            DeviceEvent::Added(id) => {
                log::info!("Audio endpoint added: {}", id);
                observers.device_added(id);
            }
            DeviceEvent::DefaultChanged(flow, id) => {
                log::info!("Default {:?} endpoint is now {}", flow, id);
                observers.default_changed(*flow, id);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use provider::WindowsDeviceProvider;

#[cfg(target_os = "windows")]
mod provider {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use audio_clip_core::{
        AudioDevice, ClipError, DeviceChangeObserver, DeviceObservers, DeviceProvider,
        SubscriptionId,
    };

    use super::{dispatch, DeviceSnapshot};
    use crate::com::ComApartment;
    use crate::device_enumerator::DeviceEnumerator;

    const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// [`DeviceProvider`] over the MMDevice API with a polling watcher.
    pub struct WindowsDeviceProvider {
        observers: Arc<DeviceObservers>,
        running: Arc<AtomicBool>,
        watcher: Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl WindowsDeviceProvider {
        pub fn new() -> Result<Self, ClipError> {
            Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
        }

        pub fn with_poll_interval(interval: Duration) -> Result<Self, ClipError> {
            let observers = Arc::new(DeviceObservers::new());
            let running = Arc::new(AtomicBool::new(true));

            let thread_observers = Arc::clone(&observers);
            let thread_running = Arc::clone(&running);
            let handle = thread::Builder::new()
                .name("audio-device-watcher".into())
                .spawn(move || {
                    if let Err(e) = watch(&thread_observers, &thread_running, interval) {
                        log::error!("Device watcher stopped: {}", e);
                    }
                })
                .map_err(|e| ClipError::Unknown(format!("failed to spawn device watcher: {}", e)))?;

            Ok(Self {
                observers,
                running,
                watcher: Mutex::new(Some(handle)),
            })
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.watcher.lock().take() {
                handle.thread().unpark();
                let _ = handle.join();
            }
        }
    }

    impl DeviceProvider for WindowsDeviceProvider {
        fn list_active_devices(&self) -> Result<Vec<AudioDevice>, ClipError> {
            let _com = ComApartment::enter()?;
            DeviceEnumerator::new()?.list_all()
        }

        fn resolve_device(&self, id: &str) -> Result<AudioDevice, ClipError> {
            let _com = ComApartment::enter()?;
            DeviceEnumerator::new()?.resolve(id)
        }

        fn subscribe(&self, observer: Arc<dyn DeviceChangeObserver>) -> SubscriptionId {
            self.observers.subscribe(observer)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.observers.unsubscribe(id);
        }
    }

    impl Drop for WindowsDeviceProvider {
        fn drop(&mut self) {
            self.stop();
        }
    }

    fn watch(
        observers: &DeviceObservers,
        running: &AtomicBool,
        interval: Duration,
    ) -> Result<(), ClipError> {
        let _com = ComApartment::enter()?;
        let enumerator = DeviceEnumerator::new()?;
        let mut last = DeviceSnapshot::from_devices(&enumerator.list_all()?);
        log::debug!("Device watcher started with {} endpoints", last.ids.len());

        while running.load(Ordering::SeqCst) {
            thread::park_timeout(interval);
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let next = match enumerator.list_all() {
                Ok(devices) => DeviceSnapshot::from_devices(&devices),
                Err(e) => {
                    log::warn!("Endpoint enumeration failed, retrying: {}", e);
                    continue;
                }
            };
            let events = last.diff(&next);
            if !events.is_empty() {
                dispatch(observers, &events);
            }
            last = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use audio_clip_core::DeviceChangeObserver;

    fn device(id: &str, flow: DeviceFlow, is_default: bool) -> AudioDevice {
        AudioDevice {
            id: id.into(),
            name: id.into(),
            flow,
            is_default,
            transport_type: None,
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DeviceChangeObserver for Recorder {
        fn on_device_added(&self, device_id: &str) {
            self.events.lock().push(format!("added:{device_id}"));
        }

        fn on_device_removed(&self, device_id: &str) {
            self.events.lock().push(format!("removed:{device_id}"));
        }

        fn on_default_changed(&self, flow: DeviceFlow, device_id: &str) {
            self.events.lock().push(format!("default:{flow:?}:{device_id}"));
        }
    }

    #[test]
    fn unchanged_snapshot_has_no_events() {
        let snapshot = DeviceSnapshot::from_devices(&[
            device("mic", DeviceFlow::Capture, true),
            device("speakers", DeviceFlow::Render, true),
        ]);
        assert!(snapshot.diff(&snapshot.clone()).is_empty());
        assert_eq!(snapshot.default_capture.as_deref(), Some("mic"));
        assert_eq!(snapshot.default_render.as_deref(), Some("speakers"));
    }

    #[test]
    fn headset_swap_orders_removal_first() {
        let before = DeviceSnapshot::from_devices(&[
            device("mic", DeviceFlow::Capture, true),
            device("speakers", DeviceFlow::Render, false),
            device("headset", DeviceFlow::Render, true),
        ]);
        let after = DeviceSnapshot::from_devices(&[
            device("mic", DeviceFlow::Capture, true),
            device("speakers", DeviceFlow::Render, true),
            device("usb-dac", DeviceFlow::Render, false),
        ]);

        assert_eq!(
            before.diff(&after),
            vec![
                DeviceEvent::Removed("headset".into()),
                DeviceEvent::Added("usb-dac".into()),
                DeviceEvent::DefaultChanged(DeviceFlow::Render, "speakers".into()),
            ]
        );
    }

    #[test]
    fn losing_the_last_default_only_reports_removal() {
        let before = DeviceSnapshot::from_devices(&[device("mic", DeviceFlow::Capture, true)]);
        let after = DeviceSnapshot::default();
        assert_eq!(before.diff(&after), vec![DeviceEvent::Removed("mic".into())]);
    }

    #[test]
    fn dispatch_reaches_observers() {
        let observers = DeviceObservers::new();
        let recorder = Arc::new(Recorder::default());
        observers.subscribe(recorder.clone());

        dispatch(
            &observers,
            &[
                DeviceEvent::Removed("a".into()),
                DeviceEvent::Added("b".into()),
                DeviceEvent::DefaultChanged(DeviceFlow::Capture, "b".into()),
            ],
        );

        assert_eq!(
            *recorder.events.lock(),
            vec!["removed:a", "added:b", "default:Capture:b"]
        );
    }
}
