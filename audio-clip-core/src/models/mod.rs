pub mod audio_models;
pub mod config;
pub mod error;
pub mod save_result;
pub mod settings;
pub mod state;
