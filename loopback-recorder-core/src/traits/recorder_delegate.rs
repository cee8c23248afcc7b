use crate::models::error::CaptureError;
use crate::models::recording::Recording;

/// Notifications from a recording session.
///
/// Methods are called from whichever thread is running the session step:
/// the caller of `start`/`stop`, or the capture thread for writer errors.
/// Implementations should marshal to the UI thread if needed.
pub trait RecorderDelegate: Send + Sync {
    /// Short human-readable status, e.g. `"Recording started: <uid>"`.
    fn on_status_changed(&self, status: &str);

    /// A recording was finalized and kept. This is the catalog hand-off.
    fn on_recording_complete(&self, recording: &Recording);

    fn on_error(&self, error: &CaptureError);
}
