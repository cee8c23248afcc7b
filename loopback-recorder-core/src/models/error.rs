use thiserror::Error;

/// Errors that can occur while capturing or persisting loopback audio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("capture already running")]
    AlreadyRunning,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("format negotiation failed: {0}")]
    FormatNegotiation(String),

    #[error("stream activation failed: {0}")]
    StreamActivation(String),

    #[error("stream failed: {0}")]
    StreamFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
