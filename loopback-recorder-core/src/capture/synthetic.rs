//! A scripted [`FrameSource`] that needs no audio hardware.
//!
//! Generates a sine tone in any native encoding, packet by packet, and can be
//! told to fail on open or after a number of packets. Used to drive the
//! engine and recording sessions in tests.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::audio_models::{AudioSource, AudioTransportType, NativeFormat, SampleEncoding};
use crate::models::error::CaptureError;
use crate::traits::frame_source::{FrameSource, Packet, PacketStream};

#[derive(Debug, Default)]
struct Probes {
    opens: AtomicUsize,
    live_streams: AtomicUsize,
}

/// Synthetic loopback source.
///
/// By default it delivers nothing. [`with_packets`](Self::with_packets)
/// scripts a finite run delivered as fast as the engine polls;
/// [`looping`](Self::looping) repeats a script forever, paced at real time.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    format: NativeFormat,
    packets: Vec<usize>,
    looping: bool,
    tone_hz: f64,
    amplitude: f64,
    fail_open: Option<CaptureError>,
    fail_after_packets: Option<usize>,
    silent_packets: Vec<usize>,
    probes: Arc<Probes>,
}

impl SyntheticSource {
    pub fn new(format: NativeFormat) -> Self {
        Self {
            format,
            packets: Vec::new(),
            looping: false,
            tone_hz: 440.0,
            amplitude: 0.25,
            fail_open: None,
            fail_after_packets: None,
            silent_packets: Vec::new(),
            probes: Arc::new(Probes::default()),
        }
    }

    /// Deliver these packet sizes (in frames) once, back to back.
    pub fn with_packets(mut self, frames: impl IntoIterator<Item = usize>) -> Self {
        self.packets = frames.into_iter().collect();
        self.looping = false;
        self
    }

    /// Deliver these packet sizes forever, one packet per packet-duration.
    pub fn looping(mut self, frames: impl IntoIterator<Item = usize>) -> Self {
        self.packets = frames.into_iter().collect();
        self.looping = true;
        self
    }

    pub fn with_tone(mut self, frequency_hz: f64, amplitude: f64) -> Self {
        self.tone_hz = frequency_hz;
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Flag the packets at these positions in the script as silent. Their
    /// buffers still carry the tone, as stale OS buffers would.
    pub fn with_silent_packets(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.silent_packets = indices.into_iter().collect();
        self
    }

    /// Make every `open` fail with `error`.
    pub fn failing_open(mut self, error: CaptureError) -> Self {
        self.fail_open = Some(error);
        self
    }

    /// Make the packet-size query fail once `packets` packets were delivered.
    pub fn failing_after_packets(mut self, packets: usize) -> Self {
        self.fail_after_packets = Some(packets);
        self
    }

    /// How many times `open` was called, successful or not.
    pub fn open_count(&self) -> usize {
        self.probes.opens.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.probes.live_streams.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self) -> Result<Box<dyn PacketStream>, CaptureError> {
        self.probes.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(ref error) = self.fail_open {
            return Err(error.clone());
        }
        self.probes.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            source: self.clone(),
            cursor: 0,
            sample_index: 0,
            last_packet_at: None,
            buffer: Vec::new(),
        }))
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "synthetic".into(),
            name: format!("Synthetic tone ({} Hz)", self.tone_hz),
            is_default: true,
            transport_type: Some(AudioTransportType::Virtual),
        }
    }
}

struct SyntheticStream {
    source: SyntheticSource,
    cursor: usize,
    sample_index: u64,
    last_packet_at: Option<Instant>,
    buffer: Vec<u8>,
}

impl SyntheticStream {
    fn pending_frames(&self) -> usize {
        let packets = &self.source.packets;
        if packets.is_empty() {
            return 0;
        }
        if self.source.looping {
            packets[self.cursor % packets.len()]
        } else {
            packets.get(self.cursor).copied().unwrap_or(0)
        }
    }

    fn packet_due(&self, frames: usize) -> bool {
        if !self.source.looping {
            return true;
        }
        let Some(last) = self.last_packet_at else {
            return true;
        };
        let period = Duration::from_secs_f64(frames as f64 / self.source.format.sample_rate.max(1) as f64);
        last.elapsed() >= period
    }

    fn render(&mut self, frames: usize) {
        let format = self.source.format;
        let channels = format.channels as usize;
        let step = TAU * self.source.tone_hz / format.sample_rate.max(1) as f64;

        self.buffer.clear();
        for _ in 0..frames {
            let value = self.source.amplitude * (step * self.sample_index as f64).sin();
            for _ in 0..channels {
                encode_sample(value, format.encoding, &mut self.buffer);
            }
            self.sample_index += 1;
        }
    }
}

impl PacketStream for SyntheticStream {
    fn format(&self) -> NativeFormat {
        self.source.format
    }

    fn next_packet_size(&mut self) -> Result<u32, CaptureError> {
        if let Some(limit) = self.source.fail_after_packets {
            if self.cursor >= limit {
                return Err(CaptureError::StreamFailed("synthetic device removed".into()));
            }
        }
        let frames = self.pending_frames();
        if frames == 0 || !self.packet_due(frames) {
            return Ok(0);
        }
        Ok(frames as u32)
    }

    fn read_packet(&mut self, consume: &mut dyn FnMut(Packet<'_>)) -> Result<(), CaptureError> {
        let frames = self.pending_frames();
        if frames == 0 {
            return Ok(());
        }
        self.render(frames);
        consume(Packet {
            data: &self.buffer,
            frames,
            silent: self.source.silent_packets.contains(&self.cursor),
        });
        self.cursor += 1;
        self.last_packet_at = Some(Instant::now());
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.source.probes.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

fn encode_sample(value: f64, encoding: SampleEncoding, out: &mut Vec<u8>) {
    match encoding {
        SampleEncoding::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
        SampleEncoding::I16 => out.extend_from_slice(&((value * i16::MAX as f64) as i16).to_le_bytes()),
        SampleEncoding::I24 => out.extend_from_slice(&((value * 8388607.0) as i32).to_le_bytes()[..3]),
        SampleEncoding::I32 => out.extend_from_slice(&((value * i32::MAX as f64) as i32).to_le_bytes()),
        SampleEncoding::Unsupported { .. } => out.extend(std::iter::repeat_n(0u8, encoding.bytes_per_sample())),
    }
}
