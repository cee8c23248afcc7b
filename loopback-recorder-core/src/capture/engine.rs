use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::audio_models::{AudioFrameBlock, AudioSource, CaptureDiagnostics, NativeFormat};
use crate::models::config::EngineConfig;
use crate::models::error::CaptureError;
use crate::processing::sample_converter::{self, ConversionOutcome};
use crate::traits::capture_provider::{CaptureProvider, FrameCallback};
use crate::traits::frame_source::{FrameSource, Packet, PacketStream};

/// Loopback capture engine, generic over where packets come from.
///
/// Owns one capture thread per run. The thread opens the stream through the
/// [`FrameSource`], reports the negotiated format back to `start`, then polls
/// for packets, converts them to normalized per-channel floats and invokes
/// the frame callback synchronously. There is no queue between the stream
/// and the callback: a slow callback slows the poll cadence.
///
/// ```text
/// [FrameSource] → [PacketStream] → convert_to_f32 → deinterleave → FrameCallback
/// ```
pub struct LoopbackCaptureEngine<S: FrameSource> {
    source: Arc<S>,
    config: EngineConfig,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
    format: Option<NativeFormat>,
    counters: Arc<EngineCounters>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    packets: AtomicU64,
    frames: AtomicU64,
    silent_packets: AtomicU64,
    unsupported_frames: AtomicU64,
}

impl EngineCounters {
    fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.frames.store(0, Ordering::Relaxed);
        self.silent_packets.store(0, Ordering::Relaxed);
        self.unsupported_frames.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CaptureDiagnostics {
        CaptureDiagnostics {
            packets_delivered: self.packets.load(Ordering::Relaxed),
            frames_delivered: self.frames.load(Ordering::Relaxed),
            silent_packets: self.silent_packets.load(Ordering::Relaxed),
            unsupported_format_frames: self.unsupported_frames.load(Ordering::Relaxed),
        }
    }
}

impl<S: FrameSource> LoopbackCaptureEngine<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: S, config: EngineConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            format: None,
            counters: Arc::new(EngineCounters::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Open the stream and start the capture thread.
    ///
    /// Returns once the stream is running (or has failed to open). On error
    /// the capture thread has already been joined.
    pub fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }

        // A previous run may have ended on its own after a stream failure.
        self.join_capture_thread();
        self.counters.reset();
        self.format = None;
        self.running.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<NativeFormat, CaptureError>>(1);
        let source = Arc::clone(&self.source);
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let config = self.config;

        let spawned = thread::Builder::new()
            .name("loopback-capture".into())
            .spawn(move || {
                let _running = RunningGuard(Arc::clone(&running));

                let stream = match source.open().and_then(|stream| {
                    validate_format(&stream.format())?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if ready_tx.send(Ok(stream.format())).is_err() {
                    return;
                }
                drop(ready_tx);

                CaptureLoop::new(stream, callback, running, counters, config).run();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(format)) => {
                log::info!("Loopback capture started ({})", format);
                self.format = Some(format);
                self.capture_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Unknown("capture thread exited during startup".into()))
            }
        }
    }

    /// Signal the capture thread and join it. Safe to call when not running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_capture_thread();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn format(&self) -> Option<NativeFormat> {
        self.format
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.counters.snapshot()
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("Loopback capture thread panicked");
            }
        }
    }
}

impl<S: FrameSource> Drop for LoopbackCaptureEngine<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: FrameSource> CaptureProvider for LoopbackCaptureEngine<S> {
    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        LoopbackCaptureEngine::start(self, callback)
    }

    fn stop(&mut self) {
        LoopbackCaptureEngine::stop(self)
    }

    fn is_running(&self) -> bool {
        LoopbackCaptureEngine::is_running(self)
    }

    fn format(&self) -> Option<NativeFormat> {
        self.format
    }

    fn diagnostics(&self) -> CaptureDiagnostics {
        LoopbackCaptureEngine::diagnostics(self)
    }

    fn device_info(&self) -> AudioSource {
        self.source.device_info()
    }
}

fn validate_format(format: &NativeFormat) -> Result<(), CaptureError> {
    if format.sample_rate == 0 || format.channels == 0 {
        return Err(CaptureError::FormatNegotiation(format!("unusable device format: {}", format)));
    }
    Ok(())
}

/// Clears the running flag when the capture thread exits, however it exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State owned by the capture thread for one run.
struct CaptureLoop {
    stream: Box<dyn PacketStream>,
    format: NativeFormat,
    callback: FrameCallback,
    running: Arc<AtomicBool>,
    counters: Arc<EngineCounters>,
    poll_interval: Duration,
    interleaved: Vec<f32>,
    channels: Vec<Vec<f32>>,
}

impl CaptureLoop {
    fn new(
        stream: Box<dyn PacketStream>,
        callback: FrameCallback,
        running: Arc<AtomicBool>,
        counters: Arc<EngineCounters>,
        config: EngineConfig,
    ) -> Self {
        let format = stream.format();
        let channel_count = format.channels as usize;
        Self {
            stream,
            format,
            callback,
            running,
            counters,
            poll_interval: config.poll_interval,
            interleaved: vec![0.0; config.initial_scratch_frames * channel_count],
            channels: vec![vec![0.0; config.initial_scratch_frames]; channel_count],
        }
    }

    fn run(mut self) {
        if !self.format.encoding.is_supported() {
            log::warn!("Unsupported native encoding ({}); delivering silence", self.format);
        }

        while self.running.load(Ordering::SeqCst) {
            let frames = match self.stream.next_packet_size() {
                Ok(frames) => frames,
                Err(e) => {
                    log::error!("Loopback capture stopped: {}", e);
                    break;
                }
            };

            if frames == 0 {
                thread::sleep(self.poll_interval);
                continue;
            }

            if let Err(e) = self.deliver_next_packet() {
                log::error!("Loopback capture stopped: {}", e);
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        log::debug!("Loopback capture thread exiting");
    }

    fn deliver_next_packet(&mut self) -> Result<(), CaptureError> {
        let Self {
            stream,
            format,
            callback,
            counters,
            interleaved,
            channels,
            ..
        } = self;
        let channel_count = format.channels as usize;

        stream.read_packet(&mut |packet: Packet<'_>| {
            if packet.frames == 0 {
                return;
            }
            let needed = packet.frames * channel_count;
            if interleaved.len() < needed {
                interleaved.resize(needed, 0.0);
            }

            if packet.silent {
                interleaved[..needed].fill(0.0);
                counters.silent_packets.fetch_add(1, Ordering::Relaxed);
            } else if sample_converter::convert_to_f32(
                packet.data,
                format.encoding,
                channel_count,
                packet.frames,
                interleaved,
            ) == ConversionOutcome::Unsupported
            {
                counters
                    .unsupported_frames
                    .fetch_add(packet.frames as u64, Ordering::Relaxed);
            }

            sample_converter::deinterleave(&interleaved[..needed], channel_count, packet.frames, channels);

            let block = AudioFrameBlock::new(&channels[..channel_count], packet.frames, format.sample_rate as f64);
            callback(&block);

            counters.packets.fetch_add(1, Ordering::Relaxed);
            counters.frames.fetch_add(packet.frames as u64, Ordering::Relaxed);
        })
    }
}
