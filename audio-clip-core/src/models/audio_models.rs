use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical id that always resolves to the current default render endpoint.
pub const DEFAULT_RENDER_DEVICE: &str = "default-render";

/// Logical id that always resolves to the current default capture endpoint.
pub const DEFAULT_CAPTURE_DEVICE: &str = "default-capture";

/// Longest clip a listener may ask a buffer to retain.
pub const MAX_CLIP_DURATION: Duration = Duration::from_secs(60 * 60);

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFlow {
    /// Input endpoint (microphone, line-in). Captured directly.
    Capture,
    /// Output endpoint (speakers, headphones). Captured via loopback.
    Render,
}

impl DeviceFlow {
    /// The logical alias that tracks the default endpoint of this flow.
    pub fn default_alias(self) -> &'static str {
        match self {
            Self::Capture => DEFAULT_CAPTURE_DEVICE,
            Self::Render => DEFAULT_RENDER_DEVICE,
        }
    }

    /// Parses a logical default alias back into its flow.
    pub fn from_alias(id: &str) -> Option<Self> {
        match id {
            DEFAULT_CAPTURE_DEVICE => Some(Self::Capture),
            DEFAULT_RENDER_DEVICE => Some(Self::Render),
            _ => None,
        }
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

/// An active audio endpoint as reported by the device provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub flow: DeviceFlow,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

/// Sample encoding of raw PCM frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed little-endian integers (16, 24 or 32 bit).
    Int,
    /// IEEE 754 32-bit floats.
    Float,
}

/// Wave format of a capture stream. Discovered when the stream opens and
/// fixed for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
}

impl WaveFormat {
    /// 32-bit float, the shared-mode mix format on most systems.
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        }
    }

    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes per frame (all channels of one sample instant).
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Byte count holding `duration` of audio, rounded down to whole frames.
    /// Saturates at the largest whole-frame count that fits in `usize`.
    pub fn bytes_for_duration(&self, duration: Duration) -> usize {
        let block = self.block_align();
        if block == 0 {
            return 0;
        }
        let frames = (self.sample_rate as f64 * duration.as_secs_f64()) as usize;
        frames
            .checked_mul(block)
            .unwrap_or(usize::MAX - usize::MAX % block)
    }

    /// Playback duration of `bytes` bytes of audio in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels == 0 {
            return Err("channel count must be positive".into());
        }
        match (self.sample_format, self.bits_per_sample) {
            (SampleFormat::Int, 16 | 24 | 32) | (SampleFormat::Float, 32) => Ok(()),
            (format, bits) => Err(format!("unsupported sample format: {format:?} {bits}-bit")),
        }
    }
}

impl std::fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.sample_format {
            SampleFormat::Int => "int",
            SampleFormat::Float => "float",
        };
        write!(
            f,
            "{} Hz, {} ch, {}-bit {}",
            self.sample_rate, self.channels, self.bits_per_sample, kind
        )
    }
}

/// Audio level metering of the latest captured block (RMS and peak, 0.0-1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub rms: f32,
    pub peak: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_stereo_sizes() {
        let format = WaveFormat::float32(48000, 2);
        assert_eq!(format.block_align(), 8);
        assert_eq!(format.bytes_per_second(), 384_000);
        assert_eq!(format.bytes_for_duration(Duration::from_secs(30)), 11_520_000);
    }

    #[test]
    fn bytes_for_duration_is_frame_aligned() {
        let format = WaveFormat::pcm16(44100, 2);
        let bytes = format.bytes_for_duration(Duration::from_millis(333));
        assert_eq!(bytes % format.block_align(), 0);
    }

    #[test]
    fn huge_durations_saturate() {
        let format = WaveFormat::float32(48000, 6);
        let bytes = format.bytes_for_duration(Duration::from_secs(u64::MAX));
        assert_eq!(bytes % format.block_align(), 0);
        assert!(bytes > usize::MAX - format.block_align());
    }

    #[test]
    fn duration_of_inverts_bytes_for_duration() {
        let format = WaveFormat::pcm16(8000, 1);
        assert_eq!(format.duration_of(16000), Duration::from_secs(1));
    }

    #[test]
    fn validate_rejects_odd_formats() {
        assert!(WaveFormat::float32(48000, 2).validate().is_ok());
        assert!(WaveFormat { bits_per_sample: 16, ..WaveFormat::float32(48000, 2) }
            .validate()
            .is_err());
        assert!(WaveFormat::pcm16(0, 2).validate().is_err());
    }

    #[test]
    fn aliases_round_trip() {
        for flow in [DeviceFlow::Capture, DeviceFlow::Render] {
            assert_eq!(DeviceFlow::from_alias(flow.default_alias()), Some(flow));
        }
        assert_eq!(DeviceFlow::from_alias("{0.0.1.00000000}"), None);
    }
}
