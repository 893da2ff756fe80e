use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the shared per-device buffer stores captured audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BufferStrategy {
    /// Fixed-capacity wraparound byte buffer sized to the retention window.
    Circular,
    /// Timestamped chunks trimmed by a background task, optionally deflated.
    Chunked { compress: bool },
}

/// Configuration for a [`BufferManager`](crate::BufferManager).
#[derive(Debug, Clone, PartialEq)]
pub struct BufferManagerConfig {
    /// Storage strategy for every device buffer (default: circular).
    pub strategy: BufferStrategy,

    /// Interval between trim passes of chunked buffers (default: 5 s).
    pub flush_delay: Duration,

    /// Extra age tolerated past the retention window before a chunk is
    /// trimmed (default: 5 s).
    pub trim_grace: Duration,
}

impl BufferManagerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.flush_delay.is_zero() {
            return Err("flush delay must be positive".into());
        }
        Ok(())
    }
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            strategy: BufferStrategy::Circular,
            flush_delay: Duration::from_secs(5),
            trim_grace: Duration::from_secs(5),
        }
    }
}

/// Gain applied to a clip before it is written to its final location.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum Normalization {
    #[default]
    None,
    /// Scale so the loudest sample reaches full scale (gain = 1 / peak).
    Peak,
    /// Peak normalization capped at a maximum linear gain.
    Loudness { max_gain: f32 },
}

impl Normalization {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Linear gain for a clip whose absolute peak is `peak`.
    ///
    /// Silent clips are left untouched.
    pub fn gain_for_peak(&self, peak: f32) -> f32 {
        if peak <= f32::EPSILON {
            return 1.0;
        }
        match *self {
            Self::None => 1.0,
            Self::Peak => 1.0 / peak,
            Self::Loudness { max_gain } => (1.0 / peak).min(max_gain),
        }
    }
}

/// Compressed output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "codec")]
pub enum TranscodeFormat {
    Mp3 { bitrate_kbps: u32 },
}

impl TranscodeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 { .. } => "mp3",
        }
    }
}

/// Options for saving a clip to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    /// Directory where clips are written.
    pub output_directory: PathBuf,

    /// File stem; `None` uses the UTC timestamp pattern `yyyy-MM-dd_HHmmss`.
    pub file_name: Option<String>,

    /// Append ` (1)`, ` (2)`, ... instead of overwriting an existing file.
    pub unique_file_names: bool,

    pub normalization: Normalization,

    /// Transcode to a compressed container instead of keeping raw PCM.
    pub transcode: Option<TranscodeFormat>,
}

impl SaveOptions {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            ..Default::default()
        }
    }

    /// Whether the temp file needs a second rewrite pass.
    pub fn requires_rewrite(&self) -> bool {
        self.normalization.is_enabled() || self.transcode.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Normalization::Loudness { max_gain } = self.normalization {
            if !(max_gain > 0.0) {
                return Err(format!("max gain must be positive, got {max_gain}"));
            }
        }
        if let Some(TranscodeFormat::Mp3 { bitrate_kbps }) = self.transcode {
            if !(32..=320).contains(&bitrate_kbps) {
                return Err(format!("unsupported mp3 bitrate: {bitrate_kbps} kbps"));
            }
        }
        if let Some(name) = &self.file_name {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(format!("invalid file name: {name:?}"));
            }
        }
        Ok(())
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            file_name: None,
            unique_file_names: true,
            normalization: Normalization::None,
            transcode: None,
        }
    }
}
