/// How a native sample is stored, as reported by the device format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// IEEE floating point.
    Float,
    /// Signed integer PCM.
    Integer,
    /// Anything else the platform reports (compressed, vendor specific).
    Other(u16),
}

impl FormatTag {
    /// Map a RIFF/`WAVEFORMATEX` format code (`1` = PCM, `3` = IEEE float).
    pub fn from_wave_tag(tag: u16) -> Self {
        match tag {
            1 => Self::Integer,
            3 => Self::Float,
            other => Self::Other(other),
        }
    }
}

/// Native sample encoding of a negotiated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    F32,
    I16,
    /// 3-byte packed, little-endian.
    I24,
    I32,
    Unsupported { tag: FormatTag, bits_per_sample: u16 },
}

impl SampleEncoding {
    pub fn from_layout(tag: FormatTag, bits_per_sample: u16) -> Self {
        match (tag, bits_per_sample) {
            (FormatTag::Float, 32) => Self::F32,
            (FormatTag::Integer, 16) => Self::I16,
            (FormatTag::Integer, 24) => Self::I24,
            (FormatTag::Integer, 32) => Self::I32,
            _ => Self::Unsupported { tag, bits_per_sample },
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }

    /// Size of one sample in the native buffer.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I24 => 3,
            Self::F32 | Self::I32 => 4,
            Self::Unsupported { bits_per_sample, .. } => (*bits_per_sample as usize).div_ceil(8),
        }
    }
}

/// The format a device reported when its stream was opened.
///
/// Fixed for the lifetime of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl NativeFormat {
    pub fn new(sample_rate: u32, channels: u16, tag: FormatTag, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            encoding: SampleEncoding::from_layout(tag, bits_per_sample),
        }
    }

    /// Bytes per interleaved frame in the native buffer.
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample()
    }
}

impl std::fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit {:?}",
            self.sample_rate, self.channels, self.bits_per_sample, self.encoding
        )
    }
}

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// An output device that can be captured in loopback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

/// One packet of normalized audio, borrowed for the duration of a callback.
///
/// The backing buffers belong to the capture engine and are reused for the
/// next packet, so they may be longer than `frame_count`.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrameBlock<'a> {
    channels: &'a [Vec<f32>],
    frames: usize,
    sample_rate: f64,
}

impl<'a> AudioFrameBlock<'a> {
    pub fn new(channels: &'a [Vec<f32>], frames: usize, sample_rate: f64) -> Self {
        let shortest = channels.iter().map(Vec::len).min().unwrap_or(0);
        Self {
            channels,
            frames: frames.min(shortest),
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Samples of one channel. Panics if `index >= channel_count()`.
    pub fn channel(&self, index: usize) -> &'a [f32] {
        &self.channels[index][..self.frames]
    }

    pub fn channels(&self) -> impl Iterator<Item = &'a [f32]> + '_ {
        let frames = self.frames;
        self.channels.iter().map(move |c| &c[..frames])
    }
}

/// Counters kept by the capture engine across one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub packets_delivered: u64,
    pub frames_delivered: u64,
    pub silent_packets: u64,
    /// Frames delivered as silence because the native encoding could not be
    /// converted.
    pub unsupported_format_frames: u64,
}
