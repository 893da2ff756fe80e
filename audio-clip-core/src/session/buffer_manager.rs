use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::audio_models::{AudioLevels, DeviceFlow, MAX_CLIP_DURATION};
use crate::models::config::{BufferManagerConfig, SaveOptions};
use crate::models::error::ClipError;
use crate::models::save_result::SaveResult;
use crate::models::state::SessionState;
use crate::session::audio_buffer::AudioBuffer;
use crate::traits::buffer_delegate::{BufferDelegate, DeferredEvents, DelegateSlot};
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::device_provider::{DeviceChangeObserver, DeviceProvider, SubscriptionId};

/// Listener set of one device, guarded by the device's own lock.
struct Listeners {
    durations: HashMap<Uuid, Duration>,
    /// Set once the last listener left; the entry is then unusable.
    disposed: bool,
}

fn check_duration(duration: Duration) -> Result<(), ClipError> {
    if duration.is_zero() {
        return Err(ClipError::ConfigurationFailed(
            "clip duration must be positive".into(),
        ));
    }
    if duration > MAX_CLIP_DURATION {
        return Err(ClipError::ConfigurationFailed(format!(
            "clip duration {:.0}s exceeds the {}s limit",
            duration.as_secs_f64(),
            MAX_CLIP_DURATION.as_secs()
        )));
    }
    Ok(())
}

impl Listeners {
    fn max(&self) -> Duration {
        self.durations.values().copied().max().unwrap_or(Duration::ZERO)
    }
}

struct DeviceEntry {
    buffer: AudioBuffer,
    listeners: Mutex<Listeners>,
}

impl DeviceEntry {
    fn is_disposed(&self) -> bool {
        self.listeners.lock().disposed
    }
}

struct ManagerShared {
    devices: Arc<dyn DeviceProvider>,
    provider: Arc<dyn CaptureProvider>,
    config: BufferManagerConfig,
    entries: DashMap<String, Arc<DeviceEntry>>,
    delegate: Arc<DelegateSlot>,
}

impl ManagerShared {
    fn entry(&self, device_id: &str) -> Result<Arc<DeviceEntry>, ClipError> {
        self.entries
            .get(device_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ClipError::KeyNotFound(device_id.to_string()))
    }

    /// Entries cloned out of the map so no shard lock is held while a
    /// session is restarted.
    fn snapshot(&self) -> Vec<Arc<DeviceEntry>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn forget(&self, device_id: &str, entry: &Arc<DeviceEntry>) {
        self.entries.remove_if(device_id, |_, current| Arc::ptr_eq(current, entry));
    }
}

/// Multiplexes listeners onto one capture buffer per device.
///
/// Each listener asks for a clip duration; the device's buffer retains the
/// maximum requested by its live listeners. The first registration for a
/// device starts its capture session and the last unregistration disposes
/// it, so at most one session per device is ever alive.
///
/// Dropping the manager disposes every buffer.
pub struct BufferManager {
    shared: Arc<ManagerShared>,
    subscription: SubscriptionId,
}

impl BufferManager {
    pub fn new(
        devices: Arc<dyn DeviceProvider>,
        provider: Arc<dyn CaptureProvider>,
        config: BufferManagerConfig,
    ) -> Result<Self, ClipError> {
        config.validate().map_err(ClipError::ConfigurationFailed)?;
        let shared = Arc::new(ManagerShared {
            devices: Arc::clone(&devices),
            provider,
            config,
            entries: DashMap::new(),
            delegate: Arc::new(DelegateSlot::default()),
        });
        let subscription = devices.subscribe(Arc::new(DeviceEvents {
            manager: Arc::downgrade(&shared),
        }));
        Ok(Self {
            shared,
            subscription,
        })
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn BufferDelegate>>) {
        self.shared.delegate.set(delegate);
    }

    /// Register a listener that wants to save up to `duration` of audio
    /// from `device_id` (an endpoint id or a default alias).
    ///
    /// Starts capture if this is the device's first listener; otherwise
    /// grows the shared buffer when `duration` exceeds its retention.
    pub fn register(
        &self,
        device_id: &str,
        duration: Duration,
    ) -> Result<ListenerRegistration, ClipError> {
        check_duration(duration)?;
        let _events = DeferredEvents::hold();

        loop {
            let entry = match self.shared.entries.entry(device_id.to_string()) {
                Entry::Occupied(occupied) => Arc::clone(occupied.get()),
                Entry::Vacant(vacant) => {
                    let buffer = AudioBuffer::new(
                        device_id,
                        Arc::clone(&self.shared.devices),
                        Arc::clone(&self.shared.provider),
                        &self.shared.config,
                        duration,
                        Arc::clone(&self.shared.delegate),
                    )?;
                    let entry = Arc::new(DeviceEntry {
                        buffer,
                        listeners: Mutex::new(Listeners {
                            durations: HashMap::new(),
                            disposed: false,
                        }),
                    });
                    vacant.insert(Arc::clone(&entry));
                    entry
                }
            };

            let mut listeners = entry.listeners.lock();
            if listeners.disposed {
                // Lost a race with the last unregistration; evict and retry.
                drop(listeners);
                self.shared.forget(device_id, &entry);
                continue;
            }

            let id = Uuid::new_v4();
            let first = listeners.durations.is_empty();
            listeners.durations.insert(id, duration);

            let outcome = if first {
                entry.buffer.start()
            } else if duration > entry.buffer.retention() {
                entry.buffer.set_retention(duration)
            } else {
                Ok(())
            };

            if let Err(e) = outcome {
                listeners.durations.remove(&id);
                if listeners.durations.is_empty() {
                    listeners.disposed = true;
                    self.shared.forget(device_id, &entry);
                    entry.buffer.dispose();
                }
                return Err(e);
            }

            log::info!(
                "Registered listener {} on {} for {:.1}s ({} listeners, retention {:.1}s)",
                id,
                device_id,
                duration.as_secs_f64(),
                listeners.durations.len(),
                entry.buffer.retention().as_secs_f64()
            );
            drop(listeners);

            return Ok(ListenerRegistration {
                id,
                device_id: device_id.to_string(),
                duration,
                entry,
                manager: Arc::downgrade(&self.shared),
                released: false,
            });
        }
    }

    /// Remove a listener. The device's buffer shrinks to the longest
    /// remaining duration, or is disposed if none remain.
    pub fn unregister(&self, registration: ListenerRegistration) -> Result<(), ClipError> {
        registration.unregister()
    }

    /// Save up to `duration` of audio from `device_id`.
    pub fn save(
        &self,
        device_id: &str,
        duration: Duration,
        options: &SaveOptions,
    ) -> Result<SaveResult, ClipError> {
        self.shared.entry(device_id)?.buffer.save(duration, options)
    }

    pub fn retention(&self, device_id: &str) -> Option<Duration> {
        self.shared.entry(device_id).ok().map(|e| e.buffer.retention())
    }

    pub fn listener_count(&self, device_id: &str) -> usize {
        self.shared
            .entry(device_id)
            .map(|e| e.listeners.lock().durations.len())
            .unwrap_or(0)
    }

    pub fn state(&self, device_id: &str) -> Option<SessionState> {
        self.shared.entry(device_id).ok().map(|e| e.buffer.state())
    }

    pub fn levels(&self, device_id: &str) -> Option<AudioLevels> {
        self.shared.entry(device_id).ok().map(|e| e.buffer.levels())
    }

    /// Logical ids with a live buffer.
    pub fn active_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Restart one device's session.
    pub fn restart(&self, device_id: &str) -> Result<(), ClipError> {
        self.shared.entry(device_id)?.buffer.restart()
    }

    /// Restart every live session, e.g. after the system resumed from sleep.
    /// All sessions are attempted; the first failure is returned.
    pub fn restart_all(&self) -> Result<(), ClipError> {
        let mut first_error = None;
        for entry in self.shared.snapshot() {
            if entry.is_disposed() {
                continue;
            }
            if let Err(e) = entry.buffer.restart() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.shared.devices.unsubscribe(self.subscription);
        for entry in self.shared.snapshot() {
            {
                let mut listeners = entry.listeners.lock();
                listeners.disposed = true;
                listeners.durations.clear();
            }
            entry.buffer.dispose();
        }
        self.shared.entries.clear();
        log::debug!("Buffer manager disposed");
    }
}

/// A listener's claim on a device buffer.
///
/// Dropping the registration unregisters it.
pub struct ListenerRegistration {
    id: Uuid,
    device_id: String,
    duration: Duration,
    entry: Arc<DeviceEntry>,
    manager: Weak<ManagerShared>,
    released: bool,
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("duration", &self.duration)
            .field("released", &self.released)
            .finish()
    }
}

impl ListenerRegistration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Requested clip duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Current retention of the shared buffer, at least [`duration`](Self::duration).
    pub fn retention(&self) -> Duration {
        self.entry.buffer.retention()
    }

    pub fn state(&self) -> SessionState {
        self.entry.buffer.state()
    }

    pub fn levels(&self) -> AudioLevels {
        self.entry.buffer.levels()
    }

    /// Change the requested duration and recompute the shared retention.
    /// On failure the previous duration stays in effect.
    pub fn set_duration(&mut self, duration: Duration) -> Result<(), ClipError> {
        check_duration(duration)?;
        let mut listeners = self.entry.listeners.lock();
        if listeners.disposed {
            return Err(ClipError::ObjectDisposed(format!("buffer for {}", self.device_id)));
        }
        let previous = match listeners.durations.get_mut(&self.id) {
            Some(slot) => std::mem::replace(slot, duration),
            None => return Err(ClipError::KeyNotFound(self.device_id.clone())),
        };
        let retention = listeners.max();
        if let Err(e) = self.entry.buffer.set_retention(retention) {
            listeners.durations.insert(self.id, previous);
            return Err(e);
        }
        self.duration = duration;
        Ok(())
    }

    /// Save the last [`duration`](Self::duration) of audio.
    pub fn save(&self, options: &SaveOptions) -> Result<SaveResult, ClipError> {
        self.save_last(self.duration, options)
    }

    /// Save up to the last `duration` of audio.
    pub fn save_last(&self, duration: Duration, options: &SaveOptions) -> Result<SaveResult, ClipError> {
        self.entry.buffer.save(duration, options)
    }

    /// Same as [`BufferManager::unregister`].
    pub fn unregister(mut self) -> Result<(), ClipError> {
        self.released = true;
        self.release()
    }

    fn release(&self) -> Result<(), ClipError> {
        let _events = DeferredEvents::hold();
        let mut listeners = self.entry.listeners.lock();
        if listeners.disposed || listeners.durations.remove(&self.id).is_none() {
            return Err(ClipError::KeyNotFound(self.device_id.clone()));
        }

        if listeners.durations.is_empty() {
            listeners.disposed = true;
            if let Some(manager) = self.manager.upgrade() {
                manager.forget(&self.device_id, &self.entry);
            }
            self.entry.buffer.dispose();
            log::info!("Last listener left {}, buffer disposed", self.device_id);
            return Ok(());
        }

        let retention = listeners.max();
        log::info!(
            "Unregistered listener {} from {} ({} left, retention {:.1}s)",
            self.id,
            self.device_id,
            listeners.durations.len(),
            retention.as_secs_f64()
        );
        self.entry.buffer.set_retention(retention)
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release() {
            log::debug!("Listener {} on {} already released: {}", self.id, self.device_id, e);
        }
    }
}

/// Routes device notifications to the manager's sessions.
struct DeviceEvents {
    manager: Weak<ManagerShared>,
}

impl DeviceEvents {
    fn live_entries(&self) -> Vec<Arc<DeviceEntry>> {
        match self.manager.upgrade() {
            Some(manager) => manager
                .snapshot()
                .into_iter()
                .filter(|e| !e.is_disposed())
                .collect(),
            None => Vec::new(),
        }
    }
}

impl DeviceChangeObserver for DeviceEvents {
    fn on_device_added(&self, device_id: &str) {
        for entry in self.live_entries() {
            let session = entry.buffer.session();
            let wanted = session.device_id() == device_id || session.follows_default().is_some();
            if wanted && session.state().is_failed() {
                log::info!("Device {} arrived, restarting {}", device_id, session.device_id());
                if let Err(e) = session.restart() {
                    log::debug!("Restart of {} failed: {}", session.device_id(), e);
                }
            }
        }
    }

    fn on_device_removed(&self, device_id: &str) {
        for entry in self.live_entries() {
            let session = entry.buffer.session();
            if session.is_bound_to(device_id) && !session.state().is_failed() {
                session.fail(ClipError::DeviceUnavailable(format!("{device_id} removed")));
            }
        }
    }

    fn on_default_changed(&self, flow: DeviceFlow, device_id: &str) {
        for entry in self.live_entries() {
            let session = entry.buffer.session();
            if session.follows_default() != Some(flow) {
                continue;
            }
            let current = session.device().map(|d| d.id);
            if current.as_deref() == Some(device_id) && !session.state().is_failed() {
                continue;
            }
            log::info!(
                "Default {:?} device is now {}, rebuilding {}",
                flow,
                device_id,
                session.device_id()
            );
            if let Err(e) = session.restart() {
                log::debug!("Rebuild of {} failed: {}", session.device_id(), e);
            }
        }
    }
}
