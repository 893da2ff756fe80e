//! Raw PCM sample decoding, level metering and gain.
//!
//! Captured frames are stored in the device's native [`WaveFormat`]; these
//! helpers read those bytes as `f32` samples without copying them out.

use crate::models::audio_models::{AudioLevels, SampleFormat, WaveFormat};

fn decode_sample(bytes: &[u8], sample_format: SampleFormat) -> f32 {
    match (sample_format, bytes.len()) {
        (SampleFormat::Float, 4) => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        (SampleFormat::Int, 2) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        (SampleFormat::Int, 3) => {
            let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        (SampleFormat::Int, 4) => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
        _ => 0.0,
    }
}

/// RMS and peak of raw frames without decoding them into a buffer.
///
/// Runs on the capture thread for every delivered block.
pub fn measure_levels(data: &[u8], format: &WaveFormat) -> AudioLevels {
    let width = format.bytes_per_sample();
    if width == 0 || data.len() < width {
        return AudioLevels::default();
    }
    let mut sum_sq = 0.0f32;
    let mut peak = 0.0f32;
    let mut count = 0usize;
    for bytes in data.chunks_exact(width) {
        let sample = decode_sample(bytes, format.sample_format);
        sum_sq += sample * sample;
        peak = peak.max(sample.abs());
        count += 1;
    }
    AudioLevels {
        rms: (sum_sq / count as f32).sqrt(),
        peak,
    }
}

/// Encode `f32` samples into interleaved little-endian frames, as a
/// capture stream would deliver them.
///
/// Integer formats clamp out-of-range values.
#[cfg(test)]
pub(crate) fn encode_samples(samples: &[f32], format: &WaveFormat) -> Vec<u8> {
    let width = format.bytes_per_sample();
    let mut data = Vec::with_capacity(samples.len() * width);
    for &sample in samples {
        match (format.sample_format, width) {
            (SampleFormat::Float, 4) => data.extend_from_slice(&sample.to_le_bytes()),
            (SampleFormat::Int, 2) => {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                data.extend_from_slice(&value.to_le_bytes());
            }
            (SampleFormat::Int, 3) => {
                let value = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
                data.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            (SampleFormat::Int, 4) => {
                let value = (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32;
                data.extend_from_slice(&value.to_le_bytes());
            }
            _ => data.extend(std::iter::repeat_n(0u8, width)),
        }
    }
    data
}

/// Peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Multiply every sample by `gain`, clamping to full scale.
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}
