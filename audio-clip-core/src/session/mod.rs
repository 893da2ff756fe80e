pub mod audio_buffer;
pub mod buffer_manager;
pub mod capture_session;
