use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDevice, DeviceFlow};
use crate::models::error::ClipError;

/// Narrow view of OS device notifications.
pub trait DeviceChangeObserver: Send + Sync {
    fn on_device_added(&self, device_id: &str);

    fn on_device_removed(&self, device_id: &str);

    /// The default endpoint of `flow` is now `device_id`.
    fn on_default_changed(&self, flow: DeviceFlow, device_id: &str);
}

/// Handle returned by [`DeviceProvider::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Device enumeration and change notification.
pub trait DeviceProvider: Send + Sync {
    /// Active endpoints of both flows.
    fn list_active_devices(&self) -> Result<Vec<AudioDevice>, ClipError>;

    /// Resolve a device id, or one of the default aliases, to an active
    /// endpoint. Fails with `DeviceUnavailable`.
    fn resolve_device(&self, id: &str) -> Result<AudioDevice, ClipError>;

    fn subscribe(&self, observer: Arc<dyn DeviceChangeObserver>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscriber list shared by device provider implementations.
#[derive(Default)]
pub struct DeviceObservers {
    next_id: AtomicU64,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn DeviceChangeObserver>)>>,
}

impl DeviceObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn DeviceChangeObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.lock().retain(|(sub, _)| *sub != id);
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device_added(&self, device_id: &str) {
        for observer in self.snapshot() {
            observer.on_device_added(device_id);
        }
    }

    pub fn device_removed(&self, device_id: &str) {
        for observer in self.snapshot() {
            observer.on_device_removed(device_id);
        }
    }

    pub fn default_changed(&self, flow: DeviceFlow, device_id: &str) {
        for observer in self.snapshot() {
            observer.on_default_changed(flow, device_id);
        }
    }

    // Observers are called without the list lock held so they may unsubscribe.
    fn snapshot(&self) -> Vec<Arc<dyn DeviceChangeObserver>> {
        self.observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn notifies_until_unsubscribed() {
        let observers = DeviceObservers::new();
        let recorder = Arc::new(Recorder::default());
        let id = observers.subscribe(recorder.clone());

        observers.device_added("a");
        observers.default_changed(DeviceFlow::Render, "a");
        observers.unsubscribe(id);
        observers.device_removed("a");

        assert!(observers.is_empty());
        assert_eq!(*recorder.events.lock(), vec!["added:a", "default:Render:a"]);
    }
}
