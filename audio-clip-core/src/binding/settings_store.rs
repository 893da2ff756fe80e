use std::marker::PhantomData;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::models::error::ClipError;
use crate::traits::settings_store::SettingsStore;

/// In-memory settings store over the JSON object the host hands to a button.
///
/// Missing fields fall back to the settings type's defaults.
pub struct JsonSettingsStore<T> {
    value: Mutex<Value>,
    _settings: PhantomData<fn() -> T>,
}

impl<T> JsonSettingsStore<T> {
    pub fn new(value: Value) -> Self {
        Self {
            value: Mutex::new(value),
            _settings: PhantomData,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ClipError> {
        let value = serde_json::from_str(json)
            .map_err(|e| ClipError::ConfigurationFailed(format!("invalid settings json: {}", e)))?;
        Ok(Self::new(value))
    }

    /// Raw JSON, as it would be persisted by the host.
    pub fn value(&self) -> Value {
        self.value.lock().clone()
    }

    /// Replace the stored JSON, e.g. when the host pushes new settings.
    pub fn replace(&self, value: Value) {
        *self.value.lock() = value;
    }
}

impl<T> Default for JsonSettingsStore<T> {
    fn default() -> Self {
        Self::new(Value::Object(Default::default()))
    }
}

impl<T> SettingsStore<T> for JsonSettingsStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn get_settings(&self) -> Result<T, ClipError> {
        let value = match self.value.lock().clone() {
            Value::Null => Value::Object(Default::default()),
            value => value,
        };
        serde_json::from_value(value)
            .map_err(|e| ClipError::ConfigurationFailed(format!("invalid settings: {}", e)))
    }

    fn set_settings(&self, value: &T) -> Result<(), ClipError> {
        let json = serde_json::to_value(value)
            .map_err(|e| ClipError::ConfigurationFailed(format!("cannot serialize settings: {}", e)))?;
        *self.value.lock() = json;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{CaptureAudioSettings, PlayAudioSettings, PlaybackAction};
    use serde_json::json;

    #[test]
    fn missing_fields_use_defaults() {
        let store = JsonSettingsStore::<CaptureAudioSettings>::new(json!({ "durationSecs": 12 }));
        let settings = store.get_settings().unwrap();
        assert_eq!(settings.duration_secs, 12);
        assert_eq!(settings.audio_device_id, "default-render");

        let empty = JsonSettingsStore::<PlayAudioSettings>::new(Value::Null);
        assert_eq!(empty.get_settings().unwrap(), PlayAudioSettings::default());
    }

    #[test]
    fn set_then_get_round_trips_through_json() {
        let store = JsonSettingsStore::<PlayAudioSettings>::default();
        let settings = PlayAudioSettings {
            action: PlaybackAction::LoopAllStopReset,
            volume: 0.5,
            ..Default::default()
        };
        store.set_settings(&settings).unwrap();

        assert_eq!(store.value()["action"], "loopAllStopReset");
        assert_eq!(store.get_settings().unwrap(), settings);
    }

    #[test]
    fn wrong_types_are_configuration_errors() {
        let store = JsonSettingsStore::<CaptureAudioSettings>::from_json(r#"{"durationSecs":"long"}"#)
            .unwrap();
        assert!(matches!(store.get_settings(), Err(ClipError::ConfigurationFailed(_))));
        assert!(JsonSettingsStore::<CaptureAudioSettings>::from_json("{").is_err());
    }
}
