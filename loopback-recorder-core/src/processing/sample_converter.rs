//! Native PCM → normalized `f32` conversion.
//!
//! Pure functions, no allocation beyond lazily growing caller-owned scratch.
//! The encoding is matched once per block; each arm is a tight loop with no
//! per-sample branching.

use crate::models::audio_models::SampleEncoding;

/// What `convert_to_f32` did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted,
    /// The encoding is not one we can decode; the output was zero-filled.
    Unsupported,
}

/// Convert `frames` interleaved frames of native PCM into normalized floats.
///
/// - `F32` is copied as is.
/// - `I16` is scaled by `1 / 32768`.
/// - `I24` (3-byte little-endian, sign-extended) is scaled by `1 / 8388608`.
/// - `I32` is scaled by `1 / 2147483648`.
/// - Unsupported encodings produce silence.
///
/// Writes `channels * frames` samples into `dst` (or as many as fit). If
/// `src` runs short, the remainder of the output is zero-filled.
pub fn convert_to_f32(
    src: &[u8],
    encoding: SampleEncoding,
    channels: usize,
    frames: usize,
    dst: &mut [f32],
) -> ConversionOutcome {
    let total = channels.saturating_mul(frames).min(dst.len());
    let dst = &mut dst[..total];

    match encoding {
        SampleEncoding::F32 => decode_into::<4>(src, dst, f32::from_le_bytes),
        SampleEncoding::I16 => decode_into::<2>(src, dst, |b| i16::from_le_bytes(b) as f32 / 32768.0),
        SampleEncoding::I24 => decode_into::<3>(src, dst, |b| {
            let value = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            value as f32 / 8388608.0
        }),
        SampleEncoding::I32 => decode_into::<4>(src, dst, |b| i32::from_le_bytes(b) as f32 / 2147483648.0),
        SampleEncoding::Unsupported { .. } => {
            dst.fill(0.0);
            return ConversionOutcome::Unsupported;
        }
    }
    ConversionOutcome::Converted
}

fn decode_into<const N: usize>(src: &[u8], dst: &mut [f32], decode: impl Fn([u8; N]) -> f32) {
    let mut written = 0;
    for (out, bytes) in dst.iter_mut().zip(src.chunks_exact(N)) {
        let mut raw = [0u8; N];
        raw.copy_from_slice(bytes);
        *out = decode(raw);
        written += 1;
    }
    dst[written..].fill(0.0);
}

/// Split interleaved samples into one contiguous buffer per channel.
///
/// `out` grows to `channels` buffers of at least `frames` samples each; it
/// never shrinks, so the same scratch can be reused across packets.
pub fn deinterleave(interleaved: &[f32], channels: usize, frames: usize, out: &mut Vec<Vec<f32>>) {
    if channels == 0 {
        return;
    }
    if out.len() < channels {
        out.resize_with(channels, Vec::new);
    }
    for (ch, buffer) in out.iter_mut().take(channels).enumerate() {
        if buffer.len() < frames {
            buffer.resize(frames, 0.0);
        }
        for (sample, frame) in buffer[..frames].iter_mut().zip(interleaved.chunks_exact(channels)) {
            *sample = frame[ch];
        }
    }
}
