//! Clip playback on a WASAPI render endpoint.
//!
//! Clips are decoded with `hound` to interleaved f32 on the calling thread,
//! with the request's volume applied. The render thread opens the endpoint
//! in shared mode with `AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM`, so the audio
//! engine handles rate and channel conversion to the mix format.

use std::path::Path;

use audio_clip_core::ClipError;

/// A decoded clip ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedClip {
    pub fn load(path: &Path, volume: f32) -> Result<Self, ClipError> {
        let reader = hound::WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => {
                ClipError::StorageError(format!("{}: {}", path.display(), io))
            }
            other => ClipError::EncodingFailed(format!("{}: {}", path.display(), other)),
        })?;
        let spec = reader.spec();
        let gain = volume.clamp(0.0, 1.0);
        let decode = |e: hound::Error| ClipError::EncodingFailed(format!("{}: {}", path.display(), e));

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| v * gain))
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode)?,
            hound::SampleFormat::Int => {
                let scale = gain / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(decode)?
            }
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

#[cfg(target_os = "windows")]
pub use output::WasapiPlaybackOutput;

#[cfg(target_os = "windows")]
mod output {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use parking_lot::{Condvar, Mutex};
    use windows::Win32::Media::Audio::*;
    use windows::Win32::System::Com::CLSCTX_ALL;

    use audio_clip_core::{ClipError, PlaybackHandle, PlaybackOutput, PlaybackRequest};

    use super::DecodedClip;
    use crate::com::{audio_error, ComApartment};
    use crate::device_enumerator::DeviceEnumerator;

    const BUFFER_DURATION: i64 = 1_000_000;
    const POLL_INTERVAL: Duration = Duration::from_millis(10);
    const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

    /// Plays saved clips on render endpoints, one thread per clip.
    #[derive(Debug, Default)]
    pub struct WasapiPlaybackOutput;

    impl WasapiPlaybackOutput {
        pub fn new() -> Self {
            Self
        }
    }

    impl PlaybackOutput for WasapiPlaybackOutput {
        fn play(&self, request: &PlaybackRequest) -> Result<Arc<dyn PlaybackHandle>, ClipError> {
            let clip = DecodedClip::load(&request.path, request.volume)?;
            let handle = Arc::new(RenderHandle::default());
            let (ready_tx, ready_rx) = mpsc::channel();

            let thread_handle = Arc::clone(&handle);
            let device_id = request.device_id.clone();
            let path = request.path.display().to_string();
            thread::Builder::new()
                .name("clip-render".into())
                .spawn(move || {
                    let mut ready = Some(ready_tx);
                    if let Err(e) = render_loop(&device_id, &clip, &thread_handle, &mut ready) {
                        log::error!("Playback of {} on {} failed: {}", path, device_id, e);
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Err(e));
                        }
                    }
                    thread_handle.finish();
                })
                .map_err(|e| ClipError::Unknown(format!("failed to spawn render thread: {}", e)))?;

            ready_rx.recv().unwrap_or_else(|_| {
                Err(ClipError::Unknown("render thread exited before starting".into()))
            })?;
            Ok(handle)
        }
    }

    #[derive(Default)]
    struct RenderHandle {
        stopped: AtomicBool,
        finished: Mutex<bool>,
        done: Condvar,
    }

    impl RenderHandle {
        fn finish(&self) {
            *self.finished.lock() = true;
            self.done.notify_all();
        }
    }

    impl PlaybackHandle for RenderHandle {
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn wait(&self) {
            let mut finished = self.finished.lock();
            while !*finished {
                self.done.wait(&mut finished);
            }
        }

        fn is_finished(&self) -> bool {
            *self.finished.lock()
        }
    }

    fn render_loop(
        device_id: &str,
        clip: &DecodedClip,
        handle: &RenderHandle,
        ready: &mut Option<mpsc::Sender<Result<(), ClipError>>>,
    ) -> Result<(), ClipError> {
        let _com = ComApartment::enter()?;
        let endpoint = DeviceEnumerator::new()?.endpoint(device_id)?;
        let client: IAudioClient = unsafe { endpoint.Activate(CLSCTX_ALL, None) }
            .map_err(|e| audio_error("IMMDevice::Activate", e))?;

        let channels = clip.channels.max(1);
        let block_align = channels * 4;
        let format = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_IEEE_FLOAT,
            nChannels: channels,
            nSamplesPerSec: clip.sample_rate,
            nAvgBytesPerSec: clip.sample_rate * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: 32,
            cbSize: 0,
        };
        unsafe {
            client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                BUFFER_DURATION,
                0,
                &format,
                None,
            )
        }
        .map_err(|e| audio_error("IAudioClient::Initialize", e))?;

        let render: IAudioRenderClient =
            unsafe { client.GetService() }.map_err(|e| audio_error("GetService", e))?;
        let buffer_frames =
            unsafe { client.GetBufferSize() }.map_err(|e| audio_error("GetBufferSize", e))? as usize;

        unsafe { client.Start() }.map_err(|e| audio_error("IAudioClient::Start", e))?;
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }
        log::debug!("Rendering {} frames on {}", clip.frames(), device_id);

        let result = feed(&client, &render, buffer_frames, clip, handle);
        let _ = unsafe { client.Stop() };
        result
    }

    /// Write the clip into the endpoint buffer until it is drained or stopped.
    fn feed(
        client: &IAudioClient,
        render: &IAudioRenderClient,
        buffer_frames: usize,
        clip: &DecodedClip,
        handle: &RenderHandle,
    ) -> Result<(), ClipError> {
        let channels = clip.channels.max(1) as usize;
        let total = clip.frames();
        let mut written = 0usize;

        while !handle.stopped.load(Ordering::SeqCst) {
            let padding = unsafe { client.GetCurrentPadding() }
                .map_err(|e| audio_error("GetCurrentPadding", e))? as usize;
            if written >= total {
                if padding == 0 {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            let frames = buffer_frames.saturating_sub(padding).min(total - written);
            if frames > 0 {
                let data = unsafe { render.GetBuffer(frames as u32) }
                    .map_err(|e| audio_error("GetBuffer", e))?;
                let out =
                    unsafe { std::slice::from_raw_parts_mut(data as *mut f32, frames * channels) };
                out.copy_from_slice(&clip.samples[written * channels..(written + frames) * channels]);
                unsafe { render.ReleaseBuffer(frames as u32, 0) }
                    .map_err(|e| audio_error("ReleaseBuffer", e))?;
                written += frames;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<std::io::BufWriter<std::fs::File>>)) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_int_clip_with_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            for s in [16384i16, -16384, 0, 8192] {
                w.write_sample(s).unwrap();
            }
        });

        let clip = DecodedClip::load(&path, 0.5).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.frames(), 2);
        assert_eq!(clip.samples, vec![0.25, -0.25, 0.0, 0.125]);
    }

    #[test]
    fn decodes_float_clip_and_clamps_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, |w| {
            for s in [0.5f32, -1.0] {
                w.write_sample(s).unwrap();
            }
        });

        let clip = DecodedClip::load(&path, 3.0).unwrap();
        assert_eq!(clip.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn missing_clip_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DecodedClip::load(&dir.path().join("gone.wav"), 1.0).unwrap_err();
        assert!(matches!(err, ClipError::StorageError(_)));
    }

    #[test]
    fn non_wav_file_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"not a riff file").unwrap();
        let err = DecodedClip::load(&path, 1.0).unwrap_err();
        assert!(matches!(err, ClipError::EncodingFailed(_)));
    }
}
