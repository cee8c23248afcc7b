//! # loopback-recorder-core
//!
//! Platform-agnostic core for recording what a machine is playing.
//!
//! Provides native sample conversion, a generic loopback capture engine, a
//! synthetic frame source, the recording session state machine, and 16-bit
//! WAV output. Platform backends (Windows WASAPI) implement the
//! `FrameSource` trait and plug into `LoopbackCaptureEngine`.
//!
//! ## Architecture
//!
//! ```text
//! loopback-recorder-core (this crate)
//! ├── traits/       ← FrameSource, PacketStream, CaptureProvider, RecorderDelegate
//! ├── models/       ← CaptureError, SessionState, RecorderConfig, Recording, NativeFormat, etc.
//! ├── processing/   ← sample conversion, WAV header generation
//! ├── capture/      ← LoopbackCaptureEngine, SyntheticSource
//! ├── session/      ← RecordingSession
//! └── storage/      ← WavFileWriter, metadata sidecar
//! ```
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use loopback_recorder_core::{
//!     FormatTag, LoopbackCaptureEngine, NativeFormat, RecorderConfig, RecordingSession, SyntheticSource,
//! };
//!
//! let source = SyntheticSource::new(NativeFormat::new(48000, 2, FormatTag::Float, 32)).looping([480]);
//! let session = Arc::new(
//!     RecordingSession::new(RecorderConfig::new("recordings"), LoopbackCaptureEngine::new(source)).unwrap(),
//! );
//! assert!(session.start());
//! std::thread::sleep(std::time::Duration::from_millis(500));
//! let recording = session.stop();
//! ```

pub mod capture;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::engine::LoopbackCaptureEngine;
pub use capture::synthetic::SyntheticSource;
pub use models::audio_models::{
    AudioFrameBlock, AudioSource, AudioTransportType, CaptureDiagnostics, FormatTag, NativeFormat, SampleEncoding,
};
pub use models::config::{EngineConfig, RecorderConfig};
pub use models::error::CaptureError;
pub use models::recording::{Recording, UNTAGGED};
pub use models::state::SessionState;
pub use session::recording::RecordingSession;
pub use storage::wav_writer::WavFileWriter;
pub use traits::capture_provider::{CaptureProvider, FrameCallback};
pub use traits::frame_source::{FrameSource, Packet, PacketStream};
pub use traits::recorder_delegate::RecorderDelegate;
