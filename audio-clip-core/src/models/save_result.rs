use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::WaveFormat;

/// Result returned when a clip has been written to its final location.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    pub file_path: PathBuf,
    pub duration: Duration,
    /// Format of the captured PCM the clip was cut from.
    pub format: WaveFormat,
    /// SHA-256 hex digest of the final file.
    pub checksum: String,
    pub metadata: ClipMetadata,
}

/// Serializable description of a saved clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMetadata {
    pub id: String,
    pub device_id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub created_at: String,
    pub normalized: bool,
    pub codec: String,
}

impl ClipMetadata {
    pub fn new(
        device_id: &str,
        duration: Duration,
        file_path: &str,
        checksum: &str,
        normalized: bool,
        codec: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            duration_secs: duration.as_secs_f64(),
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            normalized,
            codec: codec.to_string(),
        }
    }
}
