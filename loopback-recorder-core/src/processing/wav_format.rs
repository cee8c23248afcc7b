//! RIFF/WAVE helpers for the 16-bit PCM files sessions write.
//!
//! The header is written up front with a zero data size and patched once
//! the recording is closed.

use crate::models::audio_models::AudioFrameBlock;

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Output depth of every recording, whatever the native capture depth.
pub const OUTPUT_BITS_PER_SAMPLE: u16 = 16;

/// Largest data chunk a 32-bit RIFF size field can describe.
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8);

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// RIFF chunk size field (offset 4) for a given data chunk size.
pub fn riff_chunk_size(data_size: u64) -> u32 {
    (data_size + WAV_HEADER_SIZE as u64 - 8) as u32
}

/// Normalized float → 16-bit PCM.
///
/// Scales by 32768 and rounds to nearest, so samples that came from a 16-bit
/// source (`n / 32768`) are written back unchanged. `+1.0` saturates at
/// `i16::MAX`.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Interleave a block into little-endian 16-bit PCM, appending to `out`.
pub fn encode_block_i16(block: &AudioFrameBlock<'_>, out: &mut Vec<u8>) {
    let channels = block.channel_count();
    out.reserve(block.frame_count() * channels * 2);
    for frame in 0..block.frame_count() {
        for ch in 0..channels {
            out.extend_from_slice(&f32_to_i16(block.channel(ch)[frame]).to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::SampleEncoding;
    use crate::processing::sample_converter::convert_to_f32;

    #[test]
    fn header_riff_magic() {
        let header = generate_wav_header(48000, 16, 2, 0);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u16::from_le_bytes([header[20], header[21]]), 1);
    }

    #[test]
    fn header_48khz_stereo_16bit() {
        let header = generate_wav_header(48000, 16, 2, 9600);

        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 48000);
        assert_eq!(u32::from_le_bytes([header[28], header[29], header[30], header[31]]), 192000);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 4);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]), 9600);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 36 + 9600);
    }

    #[test]
    fn chunk_size_matches_header() {
        assert_eq!(riff_chunk_size(9600), 36 + 9600);
        assert_eq!(riff_chunk_size(MAX_DATA_SIZE), u32::MAX);
    }

    #[test]
    fn f32_to_i16_clamps_and_scales() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-3.0), i16::MIN);
        assert_eq!(f32_to_i16(0.5), 16384);
        assert_eq!(f32_to_i16(0.25 + 0.4 / 32768.0), 8192);
    }

    #[test]
    fn sixteen_bit_source_samples_survive_unchanged() {
        let native: Vec<i16> = vec![16384, 1, -1, 12345, i16::MIN, i16::MAX, 0, -20000];
        let bytes: Vec<u8> = native.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut floats = vec![0.0f32; native.len()];

        convert_to_f32(&bytes, SampleEncoding::I16, 1, native.len(), &mut floats);

        let written: Vec<i16> = floats.iter().map(|&s| f32_to_i16(s)).collect();
        assert_eq!(written, native);
    }

    #[test]
    fn encode_block_interleaves_channels() {
        let buffers = vec![vec![1.0f32, 0.0], vec![-1.0f32, 0.5]];
        let block = AudioFrameBlock::new(&buffers, 2, 48000.0);
        let mut pcm = Vec::new();

        encode_block_i16(&block, &mut pcm);

        let samples: Vec<i16> = pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
        assert_eq!(samples, vec![i16::MAX, i16::MIN, 0, 16384]);
    }
}
