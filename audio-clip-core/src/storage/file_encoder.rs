use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;

use crate::models::audio_models::WaveFormat;
use crate::models::config::{SaveOptions, TranscodeFormat};
use crate::models::error::ClipError;
use crate::models::save_result::{ClipMetadata, SaveResult};
use crate::processing::{normalizer, pcm};
use crate::storage::clip_writer::{self, ClipWriter};
use crate::storage::mp3_transcoder::Mp3Transcoder;
use crate::storage::naming;
use crate::traits::transcoder::Transcoder;

/// Bytes handed to the writer per call.
const WRITE_BLOCK: usize = 64 * 1024;

/// Writes buffered PCM to disk.
///
/// The clip always goes to a hidden temp file first. Without normalization
/// or transcoding that file is renamed into place; otherwise it is re-read,
/// rewritten to a second temp file, and only that one is moved to the final
/// path. Temp files are removed on failure.
pub struct FileEncoder {
    options: SaveOptions,
}

impl FileEncoder {
    pub fn new(options: SaveOptions) -> Result<Self, ClipError> {
        options.validate().map_err(ClipError::ConfigurationFailed)?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SaveOptions {
        &self.options
    }

    /// Write `data`, frames in `format`, and return where it landed.
    pub fn save(&self, data: &[u8], format: &WaveFormat, device_id: &str) -> Result<SaveResult, ClipError> {
        fs::create_dir_all(&self.options.output_directory)
            .map_err(|e| ClipError::StorageError(format!("failed to create directory: {}", e)))?;

        let stem = self
            .options
            .file_name
            .clone()
            .unwrap_or_else(|| naming::timestamp_stem(Utc::now()));
        let extension = self.options.transcode.map_or("wav", |t| t.extension());
        let unique = self.options.unique_file_names;
        let final_path =
            naming::reserve_output_path(&self.options.output_directory, &stem, extension, unique)
                .map_err(|e| ClipError::StorageError(format!("failed to reserve clip name: {}", e)))?;

        if data.is_empty() {
            log::warn!("Saving empty clip for device {}", device_id);
        }

        let checksum = match self.write_clip(data, format, &final_path, extension) {
            Ok(checksum) => checksum,
            Err(e) => {
                if unique {
                    remove_quietly(&final_path);
                }
                return Err(e);
            }
        };

        let duration = format.duration_of(data.len());
        let codec = match self.options.transcode {
            Some(TranscodeFormat::Mp3 { .. }) => "mp3",
            None => "pcm",
        };
        log::info!(
            "Saved {:.1}s clip from {} to {}",
            duration.as_secs_f64(),
            device_id,
            final_path.display()
        );

        Ok(SaveResult {
            metadata: ClipMetadata::new(
                device_id,
                duration,
                &final_path.to_string_lossy(),
                &checksum,
                self.options.normalization.is_enabled(),
                codec,
            ),
            file_path: final_path,
            duration,
            format: *format,
            checksum,
        })
    }

    /// Write the clip through temp files and move it onto `final_path`.
    /// Returns the checksum of the file at `final_path`.
    fn write_clip(
        &self,
        data: &[u8],
        format: &WaveFormat,
        final_path: &Path,
        extension: &str,
    ) -> Result<String, ClipError> {
        let temp = naming::temp_path(final_path, "tmp.wav");
        let pcm_checksum = match write_pcm(&temp, data, format) {
            Ok(checksum) => checksum,
            Err(e) => {
                remove_quietly(&temp);
                return Err(e);
            }
        };

        if !self.options.requires_rewrite() {
            if let Err(e) = move_into_place(&temp, final_path) {
                remove_quietly(&temp);
                return Err(e);
            }
            return Ok(pcm_checksum);
        }

        let rewritten = naming::temp_path(final_path, &format!("tmp.{extension}"));
        let outcome = self
            .rewrite(&temp, &rewritten)
            .and_then(|_| move_into_place(&rewritten, final_path));
        remove_quietly(&temp);
        if let Err(e) = outcome {
            remove_quietly(&rewritten);
            log::error!("Clip rewrite failed for {}: {}", final_path.display(), e);
            return Err(match e {
                ClipError::EncodingFailed(_) => e,
                other => ClipError::EncodingFailed(other.to_string()),
            });
        }
        clip_writer::sha256_file(final_path)
    }

    /// Second pass: gain and/or transcode `source` into `target`.
    fn rewrite(&self, source: &Path, target: &Path) -> Result<(), ClipError> {
        let gain = if self.options.normalization.is_enabled() {
            let peak = normalizer::scan_peak(source)?;
            let gain = self.options.normalization.gain_for_peak(peak);
            log::debug!("Normalizing clip: peak {:.4}, gain {:.3}", peak, gain);
            gain
        } else {
            1.0
        };

        match self.options.transcode {
            None => normalizer::rewrite_with_gain(source, target, gain),
            Some(format) => transcode(source, target, format, gain),
        }
    }
}

fn write_pcm(path: &Path, data: &[u8], format: &WaveFormat) -> Result<String, ClipError> {
    let mut writer = ClipWriter::new(path.to_path_buf());
    writer.open(format)?;
    for block in data.chunks(WRITE_BLOCK) {
        writer.write(block)?;
    }
    writer.close()
}

fn transcode(source: &Path, target: &Path, format: TranscodeFormat, gain: f32) -> Result<(), ClipError> {
    let encoding = |e: std::io::Error| ClipError::EncodingFailed(format!("write encoded clip: {}", e));
    let spec = hound::WavReader::open(source)
        .map_err(|e| ClipError::EncodingFailed(format!("open wav: {}", e)))?
        .spec();
    let mut transcoder: Box<dyn Transcoder> = match format {
        TranscodeFormat::Mp3 { bitrate_kbps } => {
            Box::new(Mp3Transcoder::new(spec.sample_rate, spec.channels, bitrate_kbps)?)
        }
    };

    let mut out = BufWriter::new(File::create(target).map_err(encoding)?);
    normalizer::read_blocks(source, |block, _| {
        let mut block = block.to_vec();
        if gain != 1.0 {
            pcm::apply_gain(&mut block, gain);
        }
        let encoded = transcoder.encode_block(&block)?;
        out.write_all(&encoded).map_err(encoding)
    })?;
    let tail = transcoder.finish()?;
    out.write_all(&tail).map_err(encoding)?;
    out.flush().map_err(encoding)
}

fn move_into_place(from: &Path, to: &Path) -> Result<(), ClipError> {
    fs::rename(from, to).map_err(|e| {
        ClipError::StorageError(format!("failed to move clip to {}: {}", to.display(), e))
    })
}

fn remove_quietly(path: &Path) {
    if path.is_file() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove temp file {}: {}", path.display(), e);
        }
    }
}
