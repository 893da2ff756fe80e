//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture and render endpoints
//! with friendly names and transport types, and to resolve endpoint ids
//! (including the `default-render` / `default-capture` aliases) to live
//! `IMMDevice` handles.

use windows::core::{Interface, PCWSTR, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::{
    PKEY_Device_EnumeratorName, PKEY_Device_FriendlyName,
};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};

use audio_clip_core::{AudioDevice, AudioTransportType, ClipError, DeviceFlow};

use crate::com::audio_error;

/// Audio device enumerator using the Windows MMDevice API.
///
/// Requires COM to be initialized on the calling thread, and must stay on
/// that thread.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, ClipError> {
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .map_err(|e| ClipError::Unknown(format!("failed to create enumerator: {}", e)))?;
        Ok(Self { enumerator })
    }

    /// Active endpoints of both flows, capture first.
    pub fn list_all(&self) -> Result<Vec<AudioDevice>, ClipError> {
        let mut devices = self.list_devices(DeviceFlow::Capture)?;
        devices.extend(self.list_devices(DeviceFlow::Render)?);
        Ok(devices)
    }

    pub fn list_devices(&self, flow: DeviceFlow) -> Result<Vec<AudioDevice>, ClipError> {
        let collection = unsafe {
            self.enumerator
                .EnumAudioEndpoints(data_flow(flow), DEVICE_STATE_ACTIVE)
        }
        .map_err(|e| audio_error("EnumAudioEndpoints", e))?;
        let count =
            unsafe { collection.GetCount() }.map_err(|e| audio_error("GetCount", e))?;
        let default_id = self.default_device_id(flow).ok();

        let mut devices = Vec::with_capacity(count as usize);
        for i in 0..count {
            let Ok(device) = (unsafe { collection.Item(i) }) else {
                continue;
            };
            let Ok(id) = device_id(&device) else {
                continue;
            };
            let is_default = default_id.as_deref() == Some(id.as_str());
            devices.push(describe(&device, id, flow, is_default, i));
        }
        Ok(devices)
    }

    /// Endpoint id of the current default device for `flow`.
    pub fn default_device_id(&self, flow: DeviceFlow) -> Result<String, ClipError> {
        let device = self.default_endpoint(flow)?;
        device_id(&device)
    }

    /// The live endpoint behind `id`. Aliases follow the current default;
    /// other ids must name an active endpoint.
    pub fn endpoint(&self, id: &str) -> Result<IMMDevice, ClipError> {
        if let Some(flow) = DeviceFlow::from_alias(id) {
            return self.default_endpoint(flow);
        }

        let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        let device = unsafe { self.enumerator.GetDevice(PCWSTR(wide.as_ptr())) }
            .map_err(|_| ClipError::DeviceUnavailable(format!("{}: no such endpoint", id)))?;
        let state = unsafe { device.GetState() }.map_err(|e| audio_error("GetState", e))?;
        if state != DEVICE_STATE_ACTIVE {
            return Err(ClipError::DeviceUnavailable(format!("{}: endpoint not active", id)));
        }
        Ok(device)
    }

    /// Describe the endpoint behind `id` as it currently stands.
    pub fn resolve(&self, id: &str) -> Result<AudioDevice, ClipError> {
        let device = self.endpoint(id)?;
        let endpoint_id = device_id(&device)?;
        let endpoint: IMMEndpoint = device
            .cast()
            .map_err(|e| ClipError::Unknown(format!("IMMEndpoint cast failed: {}", e)))?;
        let raw_flow =
            unsafe { endpoint.GetDataFlow() }.map_err(|e| audio_error("GetDataFlow", e))?;
        let flow = if raw_flow == eCapture {
            DeviceFlow::Capture
        } else {
            DeviceFlow::Render
        };
        let is_default =
            self.default_device_id(flow).ok().as_deref() == Some(endpoint_id.as_str());
        Ok(describe(&device, endpoint_id, flow, is_default, 0))
    }

    fn default_endpoint(&self, flow: DeviceFlow) -> Result<IMMDevice, ClipError> {
        unsafe { self.enumerator.GetDefaultAudioEndpoint(data_flow(flow), eConsole) }.map_err(
            |_| ClipError::DeviceUnavailable(format!("no default {:?} endpoint", flow)),
        )
    }
}

fn data_flow(flow: DeviceFlow) -> EDataFlow {
    match flow {
        DeviceFlow::Capture => eCapture,
        DeviceFlow::Render => eRender,
    }
}

pub(crate) fn device_id(device: &IMMDevice) -> Result<String, ClipError> {
    let raw: PWSTR = unsafe { device.GetId() }.map_err(|e| audio_error("GetId", e))?;
    let id = unsafe { raw.to_string() };
    unsafe { CoTaskMemFree(Some(raw.0 as *const _)) };
    id.map_err(|e| ClipError::Unknown(format!("endpoint id is not UTF-16: {}", e)))
}

fn describe(
    device: &IMMDevice,
    id: String,
    flow: DeviceFlow,
    is_default: bool,
    index: u32,
) -> AudioDevice {
    let store = unsafe { device.OpenPropertyStore(STGM_READ) }.ok();
    let name = store
        .as_ref()
        .and_then(|s| unsafe { s.GetValue(&PKEY_Device_FriendlyName) }.ok())
        .map(|value| value.to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| format!("Device {}", index));
    let transport = store
        .as_ref()
        .and_then(|s| unsafe { s.GetValue(&PKEY_Device_EnumeratorName) }.ok())
        .map(|value| value.to_string())
        .filter(|text| !text.is_empty())
        .map(|enumerator| transport_from_enumerator(&enumerator))
        .unwrap_or(AudioTransportType::Unknown);

    AudioDevice {
        id,
        name,
        flow,
        is_default,
        transport_type: Some(transport),
    }
}

/// Map `PKEY_Device_EnumeratorName` to a transport type.
pub(crate) fn transport_from_enumerator(enumerator: &str) -> AudioTransportType {
    let upper = enumerator.to_ascii_uppercase();
    if upper.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if upper.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if upper.contains("USB") {
        AudioTransportType::Usb
    } else if upper == "ROOT" || upper.starts_with("SWD") {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::BuiltIn
    }
}
