//! # audio-clip-windows
//!
//! Windows WASAPI backend for audio-clip-core.
//!
//! Provides:
//! - `WindowsDeviceProvider` - endpoint enumeration, alias resolution and a
//!   polling watcher that reports arrivals, removals and default changes
//! - `WasapiCaptureProvider` - shared-mode capture; microphones directly,
//!   render endpoints via loopback
//! - `WasapiPlaybackOutput` - plays saved WAV clips on a render endpoint
//! - `DeviceEnumerator` - thin wrapper over the MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 1703+ for loopback on arbitrary render endpoints
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use audio_clip_core::{BufferManager, BufferManagerConfig, SaveOptions};
//! use audio_clip_windows::{WasapiCaptureProvider, WindowsDeviceProvider};
//!
//! let manager = BufferManager::new(
//!     Arc::new(WindowsDeviceProvider::new()?),
//!     Arc::new(WasapiCaptureProvider::new()),
//!     BufferManagerConfig::default(),
//! )?;
//! let listener = manager.register("default-render", Duration::from_secs(30))?;
//! listener.save(&SaveOptions::new("clips"))?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
pub mod device_watcher;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;
pub mod wasapi_render;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use device_watcher::WindowsDeviceProvider;
#[cfg(target_os = "windows")]
pub use wasapi_capture::{WasapiCaptureProvider, WasapiCaptureStream};
#[cfg(target_os = "windows")]
pub use wasapi_render::WasapiPlaybackOutput;
