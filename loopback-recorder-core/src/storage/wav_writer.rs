use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::audio_models::AudioFrameBlock;
use crate::models::error::CaptureError;
use crate::processing::wav_format::{self, MAX_DATA_SIZE, OUTPUT_BITS_PER_SAMPLE};

/// Streaming 16-bit PCM WAV writer.
///
/// The header goes out with a zero data size when the file is created and is
/// patched in `close`. Float blocks are clamped and rounded to 16 bits
/// whatever precision the source had.
///
/// ## File Format
/// ```text
/// [44-byte WAV header]
/// [interleaved 16-bit little-endian PCM...]
/// ```
pub struct WavFileWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    sample_rate: u32,
    channels: u16,
    data_bytes: u64,
    scratch: Vec<u8>,
}

impl WavFileWriter {
    /// Create the file (and its parent directory) and write the header.
    pub fn create(file_path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        if sample_rate == 0 || channels == 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid output format: {} Hz, {} channels",
                sample_rate, channels
            )));
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);

        let header = wav_format::generate_wav_header(sample_rate, OUTPUT_BITS_PER_SAMPLE, channels, 0);
        file.write_all(&header)
            .map_err(|e| CaptureError::StorageError(format!("failed to write header: {}", e)))?;

        Ok(Self {
            file_path,
            file: Some(file),
            sample_rate,
            channels,
            data_bytes: 0,
            scratch: Vec::new(),
        })
    }

    /// Append one block. Its channel count must match the file's.
    pub fn write_block(&mut self, block: &AudioFrameBlock<'_>) -> Result<(), CaptureError> {
        if block.channel_count() != self.channels as usize {
            return Err(CaptureError::ConfigurationFailed(format!(
                "block has {} channels, file has {}",
                block.channel_count(),
                self.channels
            )));
        }

        self.scratch.clear();
        wav_format::encode_block_i16(block, &mut self.scratch);

        if self.data_bytes + self.scratch.len() as u64 > MAX_DATA_SIZE {
            return Err(CaptureError::StorageError("WAV size limit reached".into()));
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(&self.scratch)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.data_bytes += self.scratch.len() as u64;
        Ok(())
    }

    /// Patch the header sizes, flush, and close the file.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;

        let riff_size = wav_format::riff_chunk_size(self.data_bytes);
        let data_size = self.data_bytes as u32;

        file.seek(SeekFrom::Start(4))
            .and_then(|_| file.write_all(&riff_size.to_le_bytes()))
            .and_then(|_| file.seek(SeekFrom::Start(40)))
            .and_then(|_| file.write_all(&data_size.to_le_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| CaptureError::StorageError(format!("failed to finalize header: {}", e)))?;

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn frames_written(&self) -> u64 {
        self.data_bytes / (self.channels as u64 * 2)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl Drop for WavFileWriter {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                log::error!("Failed to close {}: {}", self.file_path.display(), e);
            }
        }
    }
}
