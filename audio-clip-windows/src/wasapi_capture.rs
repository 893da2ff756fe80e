//! WASAPI capture streams for both endpoint flows.
//!
//! Capture endpoints are read directly; render endpoints are read through
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`, which yields the mix going to the
//! device. Frames are delivered in the endpoint's shared-mode mix format
//! without conversion.
//!
//! ## Threading
//! COM objects never leave the thread that created them. `open` reads the
//! mix format on the caller's thread; `start` builds the audio client again
//! on a dedicated capture thread and waits for it to report whether the
//! stream came up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW};

use audio_clip_core::{
    AudioDevice, CaptureDirection, CaptureProvider, CaptureSink, CaptureStream, ClipError,
    SampleFormat, WaveFormat,
};

use crate::com::{audio_error, ComApartment};
use crate::device_enumerator::DeviceEnumerator;

/// 100 ms in 100-nanosecond units.
const BUFFER_DURATION: i64 = 1_000_000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT`.
const SUBTYPE_IEEE_FLOAT: GUID = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// Opens WASAPI shared-mode capture streams.
#[derive(Debug, Default)]
pub struct WasapiCaptureProvider;

impl WasapiCaptureProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureProvider for WasapiCaptureProvider {
    fn open(
        &self,
        device: &AudioDevice,
        direction: CaptureDirection,
    ) -> Result<Box<dyn CaptureStream>, ClipError> {
        let _com = ComApartment::enter()?;
        let endpoint = DeviceEnumerator::new()?.endpoint(&device.id)?;
        let client: IAudioClient = unsafe { endpoint.Activate(CLSCTX_ALL, None) }
            .map_err(|e| audio_error("IMMDevice::Activate", e))?;
        let (format, raw_format) = mix_format(&client)?;
        unsafe { CoTaskMemFree(Some(raw_format as *const _)) };

        log::debug!(
            "Opened {:?} stream on {} ({} Hz, {} ch, {}-bit {:?})",
            direction,
            device.id,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            format.sample_format
        );

        Ok(Box::new(WasapiCaptureStream {
            device_id: device.id.clone(),
            direction,
            format,
            running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        }))
    }
}

/// One endpoint's capture stream. Dropping it stops capture.
pub struct WasapiCaptureStream {
    device_id: String,
    direction: CaptureDirection,
    format: WaveFormat,
    running: Arc<AtomicBool>,
    capture_thread: Option<thread::JoinHandle<()>>,
}

impl CaptureStream for WasapiCaptureStream {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn start(&mut self, sink: Arc<dyn CaptureSink>) -> Result<(), ClipError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ClipError::ConfigurationFailed(format!(
                "capture on {} already running",
                self.device_id
            )));
        }
        // A stream that died on its own still has a finished thread to reap.
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }

        self.running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = mpsc::channel();
        let params = LoopParams {
            device_id: self.device_id.clone(),
            direction: self.direction,
            format: self.format,
            running: Arc::clone(&self.running),
        };

        let handle = thread::Builder::new()
            .name("wasapi-capture".into())
            .spawn(move || {
                let running = Arc::clone(&params.running);
                let device_id = params.device_id.clone();
                let mut ready = Some(ready_tx);
                match capture_loop(params, &sink, &mut ready) {
                    Ok(()) => {}
                    Err(e) if running.load(Ordering::SeqCst) => {
                        log::error!("Capture on {} failed: {}", device_id, e);
                        match ready.take() {
                            Some(tx) => {
                                let _ = tx.send(Err(e));
                            }
                            None => sink.on_stream_failed(e),
                        }
                    }
                    Err(e) => log::debug!("Capture on {} ended during stop: {}", device_id, e),
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                ClipError::Unknown(format!("failed to spawn capture thread: {}", e))
            })?;
        self.capture_thread = Some(handle);

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(ClipError::Unknown("capture thread exited before starting".into()))
        });
        if started.is_err() {
            self.stop()?;
        }
        started
    }

    fn stop(&mut self) -> Result<(), ClipError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            handle
                .join()
                .map_err(|_| ClipError::Unknown("capture thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for WasapiCaptureStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct LoopParams {
    device_id: String,
    direction: CaptureDirection,
    format: WaveFormat,
    running: Arc<AtomicBool>,
}

/// Capture loop running on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Resolve the endpoint and activate `IAudioClient`
/// 3. Initialize in shared mode, adding LOOPBACK for render endpoints
/// 4. Register with MMCSS and start
/// 5. Signal readiness, then poll for packets every 10 ms
fn capture_loop(
    params: LoopParams,
    sink: &Arc<dyn CaptureSink>,
    ready: &mut Option<mpsc::Sender<Result<(), ClipError>>>,
) -> Result<(), ClipError> {
    let _com = ComApartment::enter()?;
    let endpoint = DeviceEnumerator::new()?.endpoint(&params.device_id)?;
    let client: IAudioClient = unsafe { endpoint.Activate(CLSCTX_ALL, None) }
        .map_err(|e| audio_error("IMMDevice::Activate", e))?;

    let (format, raw_format) = mix_format(&client)?;
    if format != params.format {
        unsafe { CoTaskMemFree(Some(raw_format as *const _)) };
        return Err(ClipError::DeviceUnavailable(format!(
            "{}: mix format changed since open",
            params.device_id
        )));
    }

    let flags = match params.direction {
        CaptureDirection::Input => AUDCLNT_STREAMFLAGS_NOPERSIST,
        CaptureDirection::Loopback => AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
    };
    let initialized = unsafe {
        client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            flags,
            BUFFER_DURATION,
            0,
            raw_format,
            None,
        )
    };
    unsafe { CoTaskMemFree(Some(raw_format as *const _)) };
    initialized.map_err(|e| audio_error("IAudioClient::Initialize", e))?;

    let capture: IAudioCaptureClient =
        unsafe { client.GetService() }.map_err(|e| audio_error("GetService", e))?;

    let mut task_index = 0u32;
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    let mmcss = unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) }.ok();

    unsafe { client.Start() }.map_err(|e| audio_error("IAudioClient::Start", e))?;
    if let Some(tx) = ready.take() {
        let _ = tx.send(Ok(()));
    }
    log::info!("Capture started on {} ({:?})", params.device_id, params.direction);

    let block_align = format.block_align();
    let mut result = Ok(());
    while params.running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        if let Err(e) = drain_packets(&capture, block_align, sink.as_ref()) {
            result = Err(e);
            break;
        }
    }

    let _ = unsafe { client.Stop() };
    if let Some(handle) = mmcss {
        let _ = unsafe { AvRevertMmThreadCharacteristics(handle) };
    }
    log::info!("Capture stopped on {}", params.device_id);
    result
}

/// Hand every pending packet to the sink. Silent packets become zeroes.
fn drain_packets(
    capture: &IAudioCaptureClient,
    block_align: usize,
    sink: &dyn CaptureSink,
) -> Result<(), ClipError> {
    let mut packet_length =
        unsafe { capture.GetNextPacketSize() }.map_err(|e| audio_error("GetNextPacketSize", e))?;

    while packet_length > 0 {
        let mut buffer: *mut u8 = std::ptr::null_mut();
        let mut frames = 0u32;
        let mut flags = 0u32;
        unsafe { capture.GetBuffer(&mut buffer, &mut frames, &mut flags, None, None) }
            .map_err(|e| audio_error("GetBuffer", e))?;

        if frames > 0 {
            let len = frames as usize * block_align;
            let timestamp = Utc::now();
            if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || buffer.is_null() {
                sink.on_frames(&vec![0u8; len], timestamp);
            } else {
                let data = unsafe { std::slice::from_raw_parts(buffer, len) };
                sink.on_frames(data, timestamp);
            }
        }

        unsafe { capture.ReleaseBuffer(frames) }.map_err(|e| audio_error("ReleaseBuffer", e))?;
        packet_length = unsafe { capture.GetNextPacketSize() }
            .map_err(|e| audio_error("GetNextPacketSize", e))?;
    }
    Ok(())
}

/// Read the shared-mode mix format. The caller owns the returned pointer
/// and frees it with `CoTaskMemFree`.
fn mix_format(client: &IAudioClient) -> Result<(WaveFormat, *mut WAVEFORMATEX), ClipError> {
    let raw = unsafe { client.GetMixFormat() }.map_err(|e| audio_error("GetMixFormat", e))?;
    // WAVEFORMATEX is packed; copy the fields out before use.
    let (tag, rate, channels, bits, extra) = unsafe {
        let mix = &*raw;
        (mix.wFormatTag, mix.nSamplesPerSec, mix.nChannels, mix.wBitsPerSample, mix.cbSize)
    };
    let extensible_size =
        (std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>()) as u16;
    let sub_format = (tag == WAVE_FORMAT_EXTENSIBLE && extra >= extensible_size).then(|| unsafe {
        std::ptr::addr_of!((*(raw as *const WAVEFORMATEXTENSIBLE)).SubFormat).read_unaligned()
    });
    let format = wave_format(is_float(tag, sub_format), rate, channels, bits);
    if let Err(reason) = format.validate() {
        unsafe { CoTaskMemFree(Some(raw as *const _)) };
        return Err(ClipError::ConfigurationFailed(format!("unsupported mix format: {}", reason)));
    }
    Ok((format, raw))
}

/// Whether a mix format carries IEEE float samples. Extensible formats name
/// their sample type in `SubFormat`.
pub(crate) fn is_float(tag: u16, sub_format: Option<GUID>) -> bool {
    match tag {
        WAVE_FORMAT_IEEE_FLOAT => true,
        WAVE_FORMAT_EXTENSIBLE => sub_format == Some(SUBTYPE_IEEE_FLOAT),
        _ => false,
    }
}

pub(crate) fn wave_format(float: bool, sample_rate: u32, channels: u16, bits: u16) -> WaveFormat {
    WaveFormat {
        sample_rate,
        channels,
        bits_per_sample: bits,
        sample_format: if float { SampleFormat::Float } else { SampleFormat::Int },
    }
}
