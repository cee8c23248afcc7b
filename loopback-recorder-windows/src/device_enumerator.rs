//! Render endpoint enumeration via the MMDevice API.
//!
//! Lists the output devices a [`WasapiLoopbackSource`](crate::WasapiLoopbackSource)
//! can be bound to, with friendly names and transport types.

use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use loopback_recorder_core::models::audio_models::{AudioSource, AudioTransportType};
use loopback_recorder_core::models::error::CaptureError;

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List active render (output) devices.
    pub fn list_render_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Unknown(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_render_device_id().ok();
            let mut devices = Vec::with_capacity(count as usize);

            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device_id(&device) else {
                    continue;
                };

                let name = Self::get_device_friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());

                devices.push(AudioSource {
                    id,
                    name,
                    is_default,
                    transport_type: Some(Self::detect_transport_type(&device)),
                });
            }

            log::debug!("Found {} active render devices", devices.len());
            Ok(devices)
        }
    }

    /// Get the default render device ID.
    pub fn default_render_device_id(&self) -> Result<String, CaptureError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|_| CaptureError::DeviceNotAvailable)?;
            device_id(&device).ok_or(CaptureError::DeviceNotAvailable)
        }
    }

    /// Read `PKEY_Device_FriendlyName` from a device.
    fn get_device_friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;
            let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
            non_empty(value.to_string())
        }
    }

    /// Classify the transport from `PKEY_Device_EnumeratorName`.
    fn detect_transport_type(device: &IMMDevice) -> AudioTransportType {
        let enumerator_name = unsafe {
            device
                .OpenPropertyStore(STGM_READ)
                .ok()
                .and_then(|store| store.GetValue(&PKEY_Device_EnumeratorName).ok())
                .and_then(|value| non_empty(value.to_string()))
        };
        match enumerator_name {
            Some(name) => transport_from_enumerator_name(&name),
            None => AudioTransportType::Unknown,
        }
    }
}

unsafe fn device_id(device: &IMMDevice) -> Option<String> {
    let id = device.GetId().ok()?;
    let text = id.to_string().ok();
    CoTaskMemFree(Some(id.0 as *const _));
    text
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn transport_from_enumerator_name(name: &str) -> AudioTransportType {
    let upper = name.to_ascii_uppercase();
    if upper.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if upper.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if upper.contains("USB") {
        AudioTransportType::Usb
    } else if upper.contains("SWD") || upper.contains("ROOT") {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::BuiltIn
    }
}
