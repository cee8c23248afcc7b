use std::path::PathBuf;
use std::time::Duration;

use super::error::CaptureError;

/// Configuration for a recording session.
///
/// All paths are injected by the host; nothing here is derived from
/// process-wide locations unless the host asks for it via
/// [`RecorderConfig::in_user_data_dir`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Directory where recording files are written.
    pub recordings_dir: PathBuf,

    /// Recordings must be strictly longer than this to be kept (default: 0.1).
    pub min_duration_secs: f64,

    /// Prefix of the default display name, followed by the start time.
    pub name_prefix: String,

    /// Tags attached to every finished recording.
    pub default_tags: Vec<String>,
}

impl RecorderConfig {
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            ..Default::default()
        }
    }

    /// `<user data dir>/<app_name>/Recordings`.
    pub fn in_user_data_dir(app_name: &str) -> Result<Self, CaptureError> {
        let base = dirs_next::data_dir().ok_or_else(|| {
            CaptureError::ConfigurationFailed("no user data directory on this platform".into())
        })?;
        Ok(Self::new(base.join(app_name).join("Recordings")))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.recordings_dir.as_os_str().is_empty() {
            return Err("recordings directory must not be empty".into());
        }
        if !self.min_duration_secs.is_finite() || self.min_duration_secs < 0.0 {
            return Err(format!("invalid minimum duration: {}", self.min_duration_secs));
        }
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("Recordings"),
            min_duration_secs: 0.1,
            name_prefix: "Internal Audio".into(),
            default_tags: vec!["Loopback".into(), "Internal".into()],
        }
    }
}

/// Tuning for the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sleep between packet-size queries when the stream has nothing ready.
    /// Also bounds how long `stop()` waits for the thread to notice.
    pub poll_interval: Duration,

    /// Frames of scratch space allocated up front; grows on demand.
    pub initial_scratch_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2),
            initial_scratch_frames: 4096,
        }
    }
}
