//! Per-button settings persisted by the host SDK as JSON.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::{DEFAULT_RENDER_DEVICE, MAX_CLIP_DURATION};
use super::config::{Normalization, SaveOptions, TranscodeFormat};

/// How pressing a playback button interacts with what is already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackAction {
    /// Stop whatever is playing and play the next clip.
    #[default]
    PlayNext,
    /// Play the next clip, or stop if already playing.
    PlayStop,
    /// Loop the next clip until pressed again.
    LoopStop,
    /// Loop the whole playlist until pressed again.
    LoopAllStop,
    /// Like `LoopAllStop`, rewinding the playlist when stopped.
    LoopAllStopReset,
    /// Play the next clip on top of anything already playing.
    PlayOverlap,
    /// Play the playlist once from the cursor, or stop if already playing.
    Continuous,
}

/// Order in which a playlist yields its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaylistOrder {
    #[default]
    Sequential,
    Random,
}

/// Settings of a "capture audio buffer" button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureAudioSettings {
    pub audio_device_id: String,
    pub duration_secs: u64,
    pub output_path: PathBuf,
    pub normalize: bool,
    /// Caps the normalization gain; `None` normalizes to full scale.
    pub max_gain: Option<f32>,
    pub encode_mp3: bool,
    pub mp3_bitrate_kbps: u32,
}

impl CaptureAudioSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Check what the host sent before it reaches a buffer.
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_secs == 0 {
            return Err("duration must be positive".into());
        }
        if self.duration() > MAX_CLIP_DURATION {
            return Err(format!(
                "duration of {}s exceeds the {}s limit",
                self.duration_secs,
                MAX_CLIP_DURATION.as_secs()
            ));
        }
        self.save_options().validate()
    }

    pub fn save_options(&self) -> SaveOptions {
        let normalization = match (self.normalize, self.max_gain) {
            (false, _) => Normalization::None,
            (true, None) => Normalization::Peak,
            (true, Some(max_gain)) => Normalization::Loudness { max_gain },
        };
        SaveOptions {
            output_directory: self.output_path.clone(),
            normalization,
            transcode: self.encode_mp3.then_some(TranscodeFormat::Mp3 {
                bitrate_kbps: self.mp3_bitrate_kbps,
            }),
            ..SaveOptions::default()
        }
    }
}

impl Default for CaptureAudioSettings {
    fn default() -> Self {
        Self {
            audio_device_id: DEFAULT_RENDER_DEVICE.to_string(),
            duration_secs: 30,
            output_path: PathBuf::from("."),
            normalize: false,
            max_gain: None,
            encode_mp3: false,
            mp3_bitrate_kbps: 192,
        }
    }
}

/// Settings of a "play audio" button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayAudioSettings {
    pub files: Vec<PathBuf>,
    pub action: PlaybackAction,
    pub order: PlaylistOrder,
    /// Linear volume, 0.0-1.0.
    pub volume: f32,
    pub device_id: String,
}

impl Default for PlayAudioSettings {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            action: PlaybackAction::default(),
            order: PlaylistOrder::default(),
            volume: 1.0,
            device_id: DEFAULT_RENDER_DEVICE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_settings_fill_missing_fields() {
        let settings: CaptureAudioSettings =
            serde_json::from_str(r#"{"audioDeviceId":"mic-1","normalize":true}"#).unwrap();
        assert_eq!(settings.audio_device_id, "mic-1");
        assert_eq!(settings.duration(), Duration::from_secs(30));
        assert_eq!(settings.save_options().normalization, Normalization::Peak);
        assert_eq!(settings.save_options().transcode, None);
    }

    #[test]
    fn capture_settings_build_loudness_and_mp3() {
        let settings = CaptureAudioSettings {
            normalize: true,
            max_gain: Some(4.0),
            encode_mp3: true,
            mp3_bitrate_kbps: 128,
            ..Default::default()
        };
        let options = settings.save_options();
        assert_eq!(options.normalization, Normalization::Loudness { max_gain: 4.0 });
        assert_eq!(options.transcode, Some(TranscodeFormat::Mp3 { bitrate_kbps: 128 }));
    }

    #[test]
    fn capture_settings_reject_out_of_range_durations() {
        assert!(CaptureAudioSettings::default().validate().is_ok());
        let settings: CaptureAudioSettings =
            serde_json::from_str(r#"{"durationSecs":18446744073709551615}"#).unwrap();
        assert!(settings.validate().unwrap_err().contains("limit"));
        let zero = CaptureAudioSettings {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn play_settings_parse_action_names() {
        let settings: PlayAudioSettings = serde_json::from_str(
            r#"{"files":["a.wav","b.wav"],"action":"loopAllStopReset","order":"random"}"#,
        )
        .unwrap();
        assert_eq!(settings.action, PlaybackAction::LoopAllStopReset);
        assert_eq!(settings.order, PlaylistOrder::Random);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.device_id, DEFAULT_RENDER_DEVICE);
    }
}
