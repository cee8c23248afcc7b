use std::sync::Arc;

use crate::models::audio_models::{AudioFrameBlock, AudioSource, CaptureDiagnostics, NativeFormat};
use crate::models::error::CaptureError;

/// Callback invoked on the capture thread for every delivered packet.
///
/// The block borrows engine-owned scratch; copy anything that must outlive
/// the call.
pub type FrameCallback = Arc<dyn Fn(&AudioFrameBlock<'_>) + Send + Sync + 'static>;

/// What a recording session needs from a capture engine.
///
/// Implemented by [`LoopbackCaptureEngine`](crate::capture::engine::LoopbackCaptureEngine).
pub trait CaptureProvider: Send {
    /// Start capturing, delivering blocks via `callback`.
    ///
    /// Fails with [`CaptureError::AlreadyRunning`] if a capture is active.
    /// On any other failure nothing is left running or open.
    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError>;

    /// Stop capturing and wait for the capture thread. No callback runs after
    /// this returns. No-op when not running.
    fn stop(&mut self);

    /// Whether the capture thread is still delivering. Turns false on its own
    /// after a fatal stream error.
    fn is_running(&self) -> bool;

    /// Format negotiated by the last successful start.
    fn format(&self) -> Option<NativeFormat>;

    fn diagnostics(&self) -> CaptureDiagnostics;

    fn device_info(&self) -> AudioSource;
}
