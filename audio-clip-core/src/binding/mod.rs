pub mod capture_binding;
pub mod playback_binding;
pub mod settings_store;
