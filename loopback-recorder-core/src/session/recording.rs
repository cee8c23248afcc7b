use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::models::audio_models::{AudioFrameBlock, AudioSource, CaptureDiagnostics};
use crate::models::config::RecorderConfig;
use crate::models::error::CaptureError;
use crate::models::recording::Recording;
use crate::models::state::{AtomicSessionState, SessionState};
use crate::storage::wav_writer::WavFileWriter;
use crate::traits::capture_provider::{CaptureProvider, FrameCallback};
use crate::traits::recorder_delegate::RecorderDelegate;

/// The writer as seen by the frame handler.
enum WriterSlot {
    /// No block has arrived yet.
    Pending,
    Open(WavFileWriter),
    /// A write failed; blocks are dropped and the writer is closed at
    /// finalize.
    Stalled(WavFileWriter),
    /// Creation failed; blocks are dropped until the session stops.
    Failed,
}

/// State touched by the capture thread through the frame handler.
///
/// During `Capturing` only the capture thread writes here. Finalize reads it
/// after the capture thread has been joined.
struct SessionShared {
    delegate: Mutex<Option<Arc<dyn RecorderDelegate>>>,
    writer: Mutex<WriterSlot>,
    frames_recorded: AtomicU64,
    sample_rate_bits: AtomicU64,
    channels: AtomicU16,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            delegate: Mutex::new(None),
            writer: Mutex::new(WriterSlot::Pending),
            frames_recorded: AtomicU64::new(0),
            sample_rate_bits: AtomicU64::new(0),
            channels: AtomicU16::new(0),
        }
    }

    fn reset(&self) {
        *self.writer.lock() = WriterSlot::Pending;
        self.frames_recorded.store(0, Ordering::SeqCst);
        self.sample_rate_bits.store(0f64.to_bits(), Ordering::SeqCst);
        self.channels.store(0, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::SeqCst))
    }

    /// Frame handler body, run on the capture thread.
    ///
    /// The first block creates the writer and locks the session's format.
    fn handle_block(&self, file: &Path, block: &AudioFrameBlock<'_>) {
        let mut slot = self.writer.lock();

        if matches!(*slot, WriterSlot::Pending) {
            if block.sample_rate() <= 0.0 || block.channel_count() == 0 {
                return;
            }
            let channels = block.channel_count() as u16;
            self.sample_rate_bits.store(block.sample_rate().to_bits(), Ordering::SeqCst);
            self.channels.store(channels, Ordering::SeqCst);

            match WavFileWriter::create(file.to_path_buf(), block.sample_rate().round() as u32, channels) {
                Ok(writer) => {
                    log::debug!("Writing {} ({} Hz, {} ch, 16-bit)", file.display(), block.sample_rate(), channels);
                    *slot = WriterSlot::Open(writer);
                }
                Err(e) => {
                    *slot = WriterSlot::Failed;
                    drop(slot);
                    log::error!("Failed to create audio writer: {}", e);
                    self.notify_error(&e);
                    return;
                }
            }
        }

        let WriterSlot::Open(ref mut writer) = *slot else {
            return;
        };
        match writer.write_block(block) {
            Ok(()) => {
                self.frames_recorded
                    .fetch_add(block.frame_count() as u64, Ordering::SeqCst);
            }
            Err(CaptureError::ConfigurationFailed(reason)) => {
                log::warn!("Dropping block: {}", reason);
            }
            Err(e) => {
                if let WriterSlot::Open(writer) = std::mem::replace(&mut *slot, WriterSlot::Failed) {
                    *slot = WriterSlot::Stalled(writer);
                }
                drop(slot);
                log::error!("Failed to write audio data, dropping further blocks: {}", e);
                self.notify_error(&e);
            }
        }
    }

    fn delegate(&self) -> Option<Arc<dyn RecorderDelegate>> {
        self.delegate.lock().clone()
    }

    fn notify_status(&self, status: &str) {
        if let Some(delegate) = self.delegate() {
            delegate.on_status_changed(status);
        }
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(delegate) = self.delegate() {
            delegate.on_error(error);
        }
    }

    fn notify_complete(&self, recording: &Recording) {
        if let Some(delegate) = self.delegate() {
            delegate.on_recording_complete(recording);
        }
    }
}

/// The recording currently owned by a session.
struct ActiveRecording {
    uid: String,
    file: PathBuf,
    started_at: DateTime<Local>,
    started: Instant,
}

/// One-at-a-time loopback recording state machine.
///
/// ```text
/// [CaptureProvider] → frame handler → [WavFileWriter]
///        stop → join → finalize → Recording → [RecorderDelegate]
/// ```
///
/// State transitions: `Idle → Capturing → Finalizing → Idle`. Requests that
/// don't match the current state are no-ops. All methods take `&self`, so a
/// session can be shared across threads behind an `Arc`; concurrent `stop`
/// calls finalize exactly once.
///
/// Delegate callbacks must not call `stop` from the capture thread (writer
/// errors are reported there), since `stop` joins that thread.
pub struct RecordingSession<P: CaptureProvider> {
    config: RecorderConfig,
    provider: Mutex<P>,
    state: AtomicSessionState,
    shared: Arc<SessionShared>,
    active: Mutex<Option<ActiveRecording>>,
}

impl<P: CaptureProvider> RecordingSession<P> {
    pub fn new(config: RecorderConfig, provider: P) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            config,
            provider: Mutex::new(provider),
            state: AtomicSessionState::new(SessionState::Idle),
            shared: Arc::new(SessionShared::new()),
            active: Mutex::new(None),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn RecorderDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// True while capturing or finalizing.
    pub fn is_recording(&self) -> bool {
        self.state.load().is_recording()
    }

    pub fn current_uid(&self) -> Option<String> {
        self.active.lock().as_ref().map(|a| a.uid.clone())
    }

    /// Wall-clock time since the current recording started.
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.active.lock().as_ref().map(|a| a.started.elapsed().as_secs_f64())
    }

    /// Frames written to the current recording so far.
    pub fn frames_recorded(&self) -> u64 {
        self.shared.frames_recorded.load(Ordering::SeqCst)
    }

    pub fn capture_diagnostics(&self) -> CaptureDiagnostics {
        self.provider.lock().diagnostics()
    }

    pub fn device_info(&self) -> AudioSource {
        self.provider.lock().device_info()
    }

    /// Start a new recording. Only valid from `Idle`.
    ///
    /// Returns `false` if a recording is already in progress or the capture
    /// could not be started (the error goes to the delegate).
    pub fn start(&self) -> bool {
        let uid = {
            let mut provider = self.provider.lock();
            if !self.state.load().is_idle() {
                return false;
            }

            let started_at = Local::now();
            let uid = Recording::generate_uid(&started_at);
            let file = self.config.recordings_dir.join(format!("{}.wav", uid));
            self.shared.reset();

            let shared = Arc::clone(&self.shared);
            let target = file.clone();
            let callback: FrameCallback = Arc::new(move |block: &AudioFrameBlock<'_>| {
                shared.handle_block(&target, block);
            });

            if let Err(e) = provider.start(callback) {
                drop(provider);
                log::error!("Failed to start loopback capture: {}", e);
                self.shared.notify_error(&e);
                return false;
            }

            *self.active.lock() = Some(ActiveRecording {
                uid: uid.clone(),
                file,
                started_at,
                started: Instant::now(),
            });
            self.state.transition(SessionState::Idle, SessionState::Capturing);
            uid
        };

        log::info!("Recording started: {}", uid);
        self.shared.notify_status(&format!("Recording started: {}", uid));
        true
    }

    /// Stop the current recording and finalize it. Only valid from
    /// `Capturing`; otherwise returns `None` without side effects.
    ///
    /// Returns the finished recording if it was kept.
    pub fn stop(&self) -> Option<Recording> {
        if !self.state.transition(SessionState::Capturing, SessionState::Finalizing) {
            return None;
        }

        {
            let mut provider = self.provider.lock();
            provider.stop();
            let diagnostics = provider.diagnostics();
            log::info!(
                "Recording stopped ({} packets, {} frames delivered)",
                diagnostics.packets_delivered,
                diagnostics.frames_delivered
            );
            if diagnostics.unsupported_format_frames > 0 {
                log::warn!(
                    "{} frames were recorded as silence (unsupported native format)",
                    diagnostics.unsupported_format_frames
                );
            }
        }
        self.shared.notify_status("Recording stopped");

        let recording = self.finalize();
        self.state.transition(SessionState::Finalizing, SessionState::Idle);
        recording
    }

    /// Finalize if the capture ended on its own (stream failure).
    ///
    /// Returns `None` when still capturing normally, when idle, or when a
    /// `start`/`stop` is in progress on another thread.
    pub fn finalize_if_capture_ended(&self) -> Option<Recording> {
        if !self.state.load().is_capturing() {
            return None;
        }
        let ended = match self.provider.try_lock() {
            Some(provider) => !provider.is_running(),
            None => return None,
        };
        if !ended {
            return None;
        }
        log::warn!("Loopback capture ended unexpectedly; finalizing recording");
        self.stop()
    }

    /// Close the writer, then keep or discard the file. Runs only after the
    /// capture thread has been joined.
    fn finalize(&self) -> Option<Recording> {
        let active = self.active.lock().take();

        let slot = std::mem::replace(&mut *self.shared.writer.lock(), WriterSlot::Pending);
        let closed = match slot {
            WriterSlot::Open(mut writer) | WriterSlot::Stalled(mut writer) => match writer.close() {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Failed to close {}: {}", writer.file_path().display(), e);
                    self.shared.notify_error(&e);
                    false
                }
            },
            WriterSlot::Pending | WriterSlot::Failed => true,
        };

        let frames = self.shared.frames_recorded.load(Ordering::SeqCst);
        let sample_rate = self.shared.sample_rate();
        let channels = self.shared.channels.load(Ordering::SeqCst);
        self.shared.reset();

        let active = active?;
        let duration = if sample_rate > 0.0 { frames as f64 / sample_rate } else { 0.0 };

        if closed && active.file.is_file() && duration > self.config.min_duration_secs {
            let recording = Recording {
                name: Recording::default_name(&self.config.name_prefix, &active.started_at),
                uid: active.uid,
                file: active.file,
                duration_secs: duration,
                tags: Recording::normalize_tags(&self.config.default_tags),
                timestamp: active.started_at,
                sample_rate,
                num_channels: channels,
            };
            log::info!("Recording saved: {} ({:.2}s)", recording.uid, duration);
            self.shared.notify_complete(&recording);
            Some(recording)
        } else {
            if active.file.exists() {
                if let Err(e) = fs::remove_file(&active.file) {
                    log::warn!("Failed to delete {}: {}", active.file.display(), e);
                }
            }
            log::info!("Discarded recording {} ({:.3}s)", active.uid, duration);
            None
        }
    }
}

impl<P: CaptureProvider> Drop for RecordingSession<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
