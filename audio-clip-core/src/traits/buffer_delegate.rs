use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::error::ClipError;
use crate::models::save_result::SaveResult;
use crate::models::state::SessionState;

/// Event delegate for buffer and session notifications.
///
/// Methods are called from capture, watcher, or caller threads, never while
/// a manager or session lock is held, so implementations may call back into
/// the [`BufferManager`](crate::BufferManager). Implementations should
/// marshal to the UI thread if needed.
pub trait BufferDelegate: Send + Sync {
    /// Called when a device's capture session changes state.
    fn on_state_changed(&self, device_id: &str, state: &SessionState);

    /// Called when a capture stream fails or cannot be restarted.
    fn on_error(&self, device_id: &str, error: &ClipError);

    /// Called after a clip reached its final location.
    fn on_clip_saved(&self, result: &SaveResult);
}

type Notification = Box<dyn FnOnce()>;

thread_local! {
    static DEFERRED: RefCell<Option<Vec<Notification>>> = const { RefCell::new(None) };
}

/// Holds back delegate notifications raised on this thread until the
/// outermost guard is dropped, then delivers them in order.
///
/// Create the guard before taking a lock the notifications must not run
/// under; locals drop in reverse order, so the lock is gone by the time the
/// guard delivers.
pub(crate) struct DeferredEvents {
    outermost: bool,
}

impl DeferredEvents {
    pub(crate) fn hold() -> Self {
        let outermost = DEFERRED.with(|queue| {
            let mut queue = queue.borrow_mut();
            if queue.is_some() {
                return false;
            }
            *queue = Some(Vec::new());
            true
        });
        Self { outermost }
    }
}

impl Drop for DeferredEvents {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }
        let pending = DEFERRED.with(|queue| queue.borrow_mut().take());
        for notify in pending.unwrap_or_default() {
            notify();
        }
    }
}

fn dispatch(notify: Notification) {
    let now = DEFERRED.with(|queue| match queue.borrow_mut().as_mut() {
        Some(pending) => {
            pending.push(notify);
            None
        }
        None => Some(notify),
    });
    if let Some(notify) = now {
        notify();
    }
}

/// Replaceable delegate shared between a manager and its sessions.
#[derive(Default)]
pub struct DelegateSlot {
    delegate: RwLock<Option<Arc<dyn BufferDelegate>>>,
}

impl DelegateSlot {
    pub fn set(&self, delegate: Option<Arc<dyn BufferDelegate>>) {
        *self.delegate.write() = delegate;
    }

    fn current(&self) -> Option<Arc<dyn BufferDelegate>> {
        self.delegate.read().clone()
    }

    pub fn state_changed(&self, device_id: &str, state: &SessionState) {
        if let Some(delegate) = self.current() {
            let device_id = device_id.to_string();
            let state = state.clone();
            dispatch(Box::new(move || delegate.on_state_changed(&device_id, &state)));
        }
    }

    pub fn error(&self, device_id: &str, error: &ClipError) {
        if let Some(delegate) = self.current() {
            let device_id = device_id.to_string();
            let error = error.clone();
            dispatch(Box::new(move || delegate.on_error(&device_id, &error)));
        }
    }

    pub fn clip_saved(&self, result: &SaveResult) {
        if let Some(delegate) = self.current() {
            let result = result.clone();
            dispatch(Box::new(move || delegate.on_clip_saved(&result)));
        }
    }
}
