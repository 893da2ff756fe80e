use std::sync::Arc;

use crate::models::error::ClipError;
use crate::models::save_result::SaveResult;
use crate::models::settings::CaptureAudioSettings;
use crate::session::buffer_manager::{BufferManager, ListenerRegistration};
use crate::traits::settings_store::SettingsStore;

/// A "save the last N seconds" button.
///
/// Appearing registers a listener with the shared [`BufferManager`],
/// pressing saves a clip, disappearing unregisters. Host callbacks return
/// `false` (or `None`) when the action failed; the cause is logged.
pub struct CaptureBinding {
    manager: Arc<BufferManager>,
    settings: Arc<dyn SettingsStore<CaptureAudioSettings>>,
    active: Option<Active>,
}

struct Active {
    settings: CaptureAudioSettings,
    registration: ListenerRegistration,
}

impl CaptureBinding {
    pub fn new(
        manager: Arc<BufferManager>,
        settings: Arc<dyn SettingsStore<CaptureAudioSettings>>,
    ) -> Self {
        Self {
            manager,
            settings,
            active: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    pub fn registration(&self) -> Option<&ListenerRegistration> {
        self.active.as_ref().map(|a| &a.registration)
    }

    pub fn on_appear(&mut self) -> bool {
        report("appear", self.bind())
    }

    /// Re-read settings: a new device moves the registration, a new
    /// duration resizes it.
    pub fn on_settings_changed(&mut self) -> bool {
        report("settings change", self.bind())
    }

    pub fn on_key_press(&mut self) -> Option<SaveResult> {
        let result = match &self.active {
            Some(active) => active.registration.save(&active.settings.save_options()),
            None => Err(ClipError::KeyNotFound("capture binding is not registered".into())),
        };
        match result {
            Ok(saved) => Some(saved),
            Err(e) => {
                log::error!("Capture action failed on key press: {}", e);
                None
            }
        }
    }

    pub fn on_disappear(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = self.manager.unregister(active.registration) {
                log::warn!("Capture binding unregister failed: {}", e);
            }
        }
    }

    fn bind(&mut self) -> Result<(), ClipError> {
        let settings = self.settings.get_settings()?;
        settings.validate().map_err(ClipError::ConfigurationFailed)?;

        let same_device = self
            .active
            .as_ref()
            .is_some_and(|a| a.settings.audio_device_id == settings.audio_device_id);

        if let Some(active) = self.active.as_mut().filter(|_| same_device) {
            if active.registration.duration() != settings.duration() {
                active.registration.set_duration(settings.duration())?;
            }
            active.settings = settings;
            return Ok(());
        }

        // Register the new device before letting go of the old one.
        let registration = self
            .manager
            .register(&settings.audio_device_id, settings.duration())?;
        if let Some(previous) = self.active.replace(Active {
            settings,
            registration,
        }) {
            self.manager.unregister(previous.registration)?;
        }
        Ok(())
    }
}

impl Drop for CaptureBinding {
    fn drop(&mut self) {
        self.on_disappear();
    }
}

fn report(event: &str, result: Result<(), ClipError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("Capture action failed on {}: {}", event, e);
            false
        }
    }
}
