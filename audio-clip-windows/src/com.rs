//! COM apartment scoping and HRESULT mapping shared by the WASAPI modules.

use windows::Win32::Foundation::{E_ACCESSDENIED, RPC_E_CHANGED_MODE};
use windows::Win32::Media::Audio::{
    AUDCLNT_E_DEVICE_INVALIDATED, AUDCLNT_E_DEVICE_IN_USE, AUDCLNT_E_SERVICE_NOT_RUNNING,
};
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use audio_clip_core::ClipError;

/// Joins the multithreaded apartment for the lifetime of the value.
///
/// A thread already in a single-threaded apartment keeps it; the guard then
/// leaves COM initialization alone on drop.
pub(crate) struct ComApartment {
    owned: bool,
}

impl ComApartment {
    pub(crate) fn enter() -> Result<Self, ClipError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|e| ClipError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

/// Translate a WASAPI failure into the crate error, keeping the call name.
pub(crate) fn audio_error(call: &str, err: windows::core::Error) -> ClipError {
    let code = err.code();
    if code == E_ACCESSDENIED {
        log::warn!("{} denied by the OS audio privacy settings", call);
        ClipError::PermissionDenied
    } else if code == AUDCLNT_E_DEVICE_INVALIDATED
        || code == AUDCLNT_E_DEVICE_IN_USE
        || code == AUDCLNT_E_SERVICE_NOT_RUNNING
    {
        ClipError::DeviceUnavailable(format!("{} failed: {}", call, err))
    } else {
        ClipError::Unknown(format!("{} failed: {}", call, err))
    }
}
