//! WASAPI loopback frame source for system audio.
//!
//! Captures the mix going to a render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions needed on Windows.
//! DRM-protected audio arrives as silence.
//!
//! The stream is opened on whatever thread calls [`FrameSource::open`]; the
//! engine calls it on its capture thread, which joins the MTA here and leaves
//! it when the stream is dropped.

use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use loopback_recorder_core::models::audio_models::{AudioSource, FormatTag, NativeFormat};
use loopback_recorder_core::models::error::CaptureError;
use loopback_recorder_core::traits::frame_source::{FrameSource, Packet, PacketStream};

/// Shared-mode buffer length in 100ns units (100ms).
const BUFFER_DURATION_HNS: i64 = 1_000_000;

const WAVE_FORMAT_EXTENSIBLE_TAG: u16 = 0xFFFE;

/// `KSDATAFORMAT_SUBTYPE_*` GUIDs share this layout; `data1` holds the plain
/// wave format code.
const KSDATAFORMAT_SUBTYPE_BASE: GUID = GUID::from_u128(0x00000000_0000_0010_8000_00aa00389b71);

/// Loopback source bound to a render endpoint.
#[derive(Debug, Clone)]
pub struct WasapiLoopbackSource {
    device_id: Option<String>,
    device_name: String,
}

impl WasapiLoopbackSource {
    /// Follow the default console render device at open time.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            device_name: "System Audio (Loopback)".into(),
        }
    }

    /// Bind to a specific render endpoint by MMDevice ID.
    pub fn with_device(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
            device_name: name.into(),
        }
    }

    /// Bind to a device returned by
    /// [`DeviceEnumerator::list_render_devices`](crate::DeviceEnumerator::list_render_devices).
    pub fn from_source(source: &AudioSource) -> Self {
        Self::with_device(source.id.clone(), source.name.clone())
    }
}

impl FrameSource for WasapiLoopbackSource {
    fn open(&self) -> Result<Box<dyn PacketStream>, CaptureError> {
        let stream = unsafe { open_loopback_stream(self.device_id.as_deref())? };
        log::debug!("WASAPI loopback opened on {}: {}", self.device_name, stream.format);
        Ok(Box::new(stream))
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self
                .device_id
                .clone()
                .unwrap_or_else(|| "system-loopback".into()),
            name: self.device_name.clone(),
            is_default: self.device_id.is_none(),
            transport_type: None,
        }
    }
}

/// Open sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Resolve the render endpoint
/// 3. Activate IAudioClient and read the mix format
/// 4. Initialize with LOOPBACK flag in shared mode
/// 5. Get IAudioCaptureClient
/// 6. Register with MMCSS
/// 7. Start
unsafe fn open_loopback_stream(device_id: Option<&str>) -> Result<WasapiLoopbackStream, CaptureError> {
    let com = ComApartment::enter()?;

    let enumerator: IMMDeviceEnumerator =
        CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|_| CaptureError::DeviceNotAvailable)?;

    let device = match device_id {
        Some(id) => {
            let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
            enumerator.GetDevice(PCWSTR(wide.as_ptr()))
        }
        None => enumerator.GetDefaultAudioEndpoint(eRender, eConsole),
    }
    .map_err(|_| CaptureError::DeviceNotAvailable)?;

    let audio_client: IAudioClient = device
        .Activate(CLSCTX_ALL, None)
        .map_err(|e| CaptureError::StreamActivation(format!("Activate failed: {}", e)))?;

    let mix_format = MixFormat(
        audio_client
            .GetMixFormat()
            .map_err(|e| CaptureError::FormatNegotiation(format!("GetMixFormat failed: {}", e)))?,
    );
    let format = mix_format.native_format();
    let block_align = mix_format.block_align();

    audio_client
        .Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
            BUFFER_DURATION_HNS,
            0,
            mix_format.0,
            None,
        )
        .map_err(|e| CaptureError::StreamActivation(format!("IAudioClient::Initialize (loopback) failed: {}", e)))?;

    let capture_client: IAudioCaptureClient = audio_client
        .GetService()
        .map_err(|e| CaptureError::StreamActivation(format!("GetService failed: {}", e)))?;

    let mut task_index: u32 = 0;
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    let mmcss = match AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("MMCSS registration failed, capturing at normal priority: {}", e);
            None
        }
    };

    let stream = WasapiLoopbackStream {
        format,
        block_align,
        capture_client,
        audio_client,
        _mix_format: mix_format,
        mmcss,
        _com: com,
    };

    stream
        .audio_client
        .Start()
        .map_err(|e| CaptureError::StreamActivation(format!("IAudioClient::Start failed: {}", e)))?;

    Ok(stream)
}

/// A started loopback stream. Field order matters: COM objects release
/// before the apartment is left.
struct WasapiLoopbackStream {
    format: NativeFormat,
    block_align: usize,
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    _mix_format: MixFormat,
    mmcss: Option<HANDLE>,
    _com: ComApartment,
}

impl PacketStream for WasapiLoopbackStream {
    fn format(&self) -> NativeFormat {
        self.format
    }

    fn next_packet_size(&mut self) -> Result<u32, CaptureError> {
        unsafe {
            self.capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::StreamFailed(format!("GetNextPacketSize failed: {}", e)))
        }
    }

    fn read_packet(&mut self, consume: &mut dyn FnMut(Packet<'_>)) -> Result<(), CaptureError> {
        unsafe {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            self.capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| CaptureError::StreamFailed(format!("GetBuffer failed: {}", e)))?;

            if num_frames > 0 {
                let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || buffer_ptr.is_null();
                let data: &[u8] = if silent {
                    &[]
                } else {
                    std::slice::from_raw_parts(buffer_ptr, num_frames as usize * self.block_align)
                };
                consume(Packet {
                    data,
                    frames: num_frames as usize,
                    silent,
                });
            }

            self.capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| CaptureError::StreamFailed(format!("ReleaseBuffer failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for WasapiLoopbackStream {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.audio_client.Stop() {
                log::debug!("IAudioClient::Stop failed: {}", e);
            }
            if let Some(handle) = self.mmcss.take() {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
        }
    }
}

/// Mix format returned by `GetMixFormat`, freed with `CoTaskMemFree`.
struct MixFormat(*mut WAVEFORMATEX);

impl MixFormat {
    fn native_format(&self) -> NativeFormat {
        // WAVEFORMATEX is packed; copy it out rather than borrowing fields.
        let wf = unsafe { std::ptr::read_unaligned(self.0) };
        let bits = wf.wBitsPerSample;
        let tag = if wf.wFormatTag == WAVE_FORMAT_EXTENSIBLE_TAG && wf.cbSize >= 22 {
            let ext = unsafe { std::ptr::read_unaligned(self.0 as *const WAVEFORMATEXTENSIBLE) };
            subformat_tag(ext.SubFormat)
        } else {
            FormatTag::from_wave_tag(wf.wFormatTag)
        };
        NativeFormat::new(wf.nSamplesPerSec, wf.nChannels, tag, bits)
    }

    fn block_align(&self) -> usize {
        let wf = unsafe { std::ptr::read_unaligned(self.0) };
        wf.nBlockAlign as usize
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe {
            CoTaskMemFree(Some(self.0 as *const _));
        }
    }
}

fn subformat_tag(sub_format: GUID) -> FormatTag {
    let matches_base = sub_format.data2 == KSDATAFORMAT_SUBTYPE_BASE.data2
        && sub_format.data3 == KSDATAFORMAT_SUBTYPE_BASE.data3
        && sub_format.data4 == KSDATAFORMAT_SUBTYPE_BASE.data4;
    if matches_base && sub_format.data1 <= u16::MAX as u32 {
        FormatTag::from_wave_tag(sub_format.data1 as u16)
    } else {
        FormatTag::Other(WAVE_FORMAT_EXTENSIBLE_TAG)
    }
}

/// Membership in the multithreaded apartment for the current thread.
struct ComApartment;

impl ComApartment {
    fn enter() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::StreamActivation(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensible_subformats_map_to_wave_tags() {
        let float = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);
        let pcm = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
        assert_eq!(subformat_tag(float), FormatTag::Float);
        assert_eq!(subformat_tag(pcm), FormatTag::Integer);
    }

    #[test]
    fn foreign_subformat_is_unsupported() {
        let other = GUID::from_u128(0x6dba3190_67bd_11cf_a0f7_0020afd156e4);
        assert_eq!(subformat_tag(other), FormatTag::Other(WAVE_FORMAT_EXTENSIBLE_TAG));
    }

    #[test]
    fn default_device_info() {
        let source = WasapiLoopbackSource::default_device();
        let info = source.device_info();
        assert!(info.is_default);
        assert_eq!(info.id, "system-loopback");
    }
}
