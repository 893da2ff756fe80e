//! Peak normalization of WAV files in fixed-size windows.
//!
//! Files are never loaded whole: a first pass finds the absolute peak, a
//! second pass rewrites the samples with the computed gain.

use std::path::Path;

use hound::{SampleFormat as HoundFormat, WavReader, WavSpec, WavWriter};

use crate::models::error::ClipError;
use crate::processing::pcm;

/// Samples processed per window.
pub const NORMALIZE_WINDOW: usize = 16 * 1024;

fn encoding_error(context: &str, err: hound::Error) -> ClipError {
    ClipError::EncodingFailed(format!("{}: {}", context, err))
}

/// Stream a WAV file as interleaved `f32` blocks of at most
/// [`NORMALIZE_WINDOW`] samples. Every block but the last holds whole
/// frames. Returns the file's spec.
pub fn read_blocks<F>(path: &Path, mut on_block: F) -> Result<WavSpec, ClipError>
where
    F: FnMut(&[f32], &WavSpec) -> Result<(), ClipError>,
{
    let mut reader = WavReader::open(path).map_err(|e| encoding_error("open wav", e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let window = (NORMALIZE_WINDOW - NORMALIZE_WINDOW % channels).max(channels);
    let mut block = Vec::with_capacity(window);

    match spec.sample_format {
        HoundFormat::Float => {
            for sample in reader.samples::<f32>() {
                block.push(sample.map_err(|e| encoding_error("read sample", e))?);
                if block.len() == window {
                    on_block(&block, &spec)?;
                    block.clear();
                }
            }
        }
        HoundFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let value = sample.map_err(|e| encoding_error("read sample", e))?;
                block.push(value as f32 / scale);
                if block.len() == window {
                    on_block(&block, &spec)?;
                    block.clear();
                }
            }
        }
    }

    if !block.is_empty() {
        on_block(&block, &spec)?;
    }
    Ok(spec)
}

/// Absolute peak over every sample of the file.
pub fn scan_peak(path: &Path) -> Result<f32, ClipError> {
    let mut peak = 0.0f32;
    read_blocks(path, |block, _| {
        peak = peak.max(pcm::peak_level(block));
        Ok(())
    })?;
    Ok(peak)
}

/// Copy `source` to `target` with every sample multiplied by `gain`,
/// keeping the source spec.
pub fn rewrite_with_gain(source: &Path, target: &Path, gain: f32) -> Result<(), ClipError> {
    let spec = WavReader::open(source)
        .map_err(|e| encoding_error("open wav", e))?
        .spec();
    let mut writer = WavWriter::create(target, spec).map_err(|e| encoding_error("create wav", e))?;
    let int_scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;

    read_blocks(source, |block, spec| {
        let mut scaled = block.to_vec();
        pcm::apply_gain(&mut scaled, gain);
        for &sample in &scaled {
            let written = match (spec.sample_format, spec.bits_per_sample) {
                (HoundFormat::Float, _) => writer.write_sample(sample),
                (HoundFormat::Int, 16) => writer.write_sample((sample * int_scale) as i16),
                (HoundFormat::Int, _) => writer.write_sample((sample * int_scale) as i32),
            };
            written.map_err(|e| encoding_error("write sample", e))?;
        }
        Ok(())
    })?;

    writer.finalize().map_err(|e| encoding_error("finalize wav", e))
}
