pub mod buffer_delegate;
pub mod capture_provider;
pub mod clip_store;
pub mod device_provider;
pub mod playback_output;
pub mod settings_store;
pub mod transcoder;
