//! # loopback-recorder-windows
//!
//! Windows WASAPI backend for loopback-recorder.
//!
//! Provides:
//! - `WasapiLoopbackSource` — system audio frame source via WASAPI loopback on a render endpoint
//! - `DeviceEnumerator` — render device enumeration via MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 or later
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use loopback_recorder_core::{LoopbackCaptureEngine, RecorderConfig, RecordingSession};
//! use loopback_recorder_windows::WasapiLoopbackSource;
//!
//! let engine = LoopbackCaptureEngine::new(WasapiLoopbackSource::default_device());
//! let session = RecordingSession::new(RecorderConfig::in_user_data_dir("MyApp")?, engine)?;
//! session.start();
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackSource;
