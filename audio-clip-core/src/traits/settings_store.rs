use crate::models::error::ClipError;

/// Per-action settings persisted by the host SDK.
pub trait SettingsStore<T>: Send + Sync {
    fn get_settings(&self) -> Result<T, ClipError>;

    fn set_settings(&self, value: &T) -> Result<(), ClipError>;
}
