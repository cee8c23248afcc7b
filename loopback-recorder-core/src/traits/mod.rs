pub mod capture_provider;
pub mod frame_source;
pub mod recorder_delegate;
