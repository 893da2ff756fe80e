//! MP3 transcoding through LAME (mp3lame-encoder).

use mp3lame_encoder::{Bitrate, Builder, DualPcm, Encoder, FlushNoGap, Quality};

use crate::models::error::ClipError;
use crate::traits::transcoder::Transcoder;

/// Incremental MP3 encoder. Input is interleaved `f32` with any channel
/// count; mono is duplicated to both sides, extra channels are dropped.
pub struct Mp3Transcoder {
    encoder: Encoder,
    channels: usize,
}

impl Mp3Transcoder {
    pub fn new(sample_rate: u32, channels: u16, bitrate_kbps: u32) -> Result<Self, ClipError> {
        let mut builder = Builder::new()
            .ok_or_else(|| ClipError::EncodingFailed("LAME encoder init failed".into()))?;
        builder
            .set_num_channels(2)
            .map_err(|e| ClipError::EncodingFailed(format!("LAME set channels failed: {:?}", e)))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| ClipError::EncodingFailed(format!("LAME set sample rate failed: {:?}", e)))?;
        builder
            .set_brate(lame_bitrate(bitrate_kbps))
            .map_err(|e| ClipError::EncodingFailed(format!("LAME set bitrate failed: {:?}", e)))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| ClipError::EncodingFailed(format!("LAME set quality failed: {:?}", e)))?;
        let encoder = builder
            .build()
            .map_err(|e| ClipError::EncodingFailed(format!("LAME build failed: {:?}", e)))?;

        Ok(Self {
            encoder,
            channels: channels.max(1) as usize,
        })
    }
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=111 => Bitrate::Kbps96,
        112..=127 => Bitrate::Kbps112,
        128..=159 => Bitrate::Kbps128,
        160..=191 => Bitrate::Kbps160,
        192..=223 => Bitrate::Kbps192,
        224..=255 => Bitrate::Kbps224,
        256..=319 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

impl Transcoder for Mp3Transcoder {
    fn encode_block(&mut self, samples: &[f32]) -> Result<Vec<u8>, ClipError> {
        let frames = samples.len() / self.channels;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in samples.chunks_exact(self.channels) {
            left.push(to_i16(frame[0]));
            right.push(to_i16(if self.channels > 1 { frame[1] } else { frame[0] }));
        }

        let mut output: Vec<u8> = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames));
        let encoded = self
            .encoder
            .encode(DualPcm { left: &left, right: &right }, output.spare_capacity_mut())
            .map_err(|e| ClipError::EncodingFailed(format!("LAME encode failed: {:?}", e)))?;

        // SAFETY: the encoder initialised `encoded` bytes of spare capacity.
        unsafe {
            output.set_len(encoded);
        }
        Ok(output)
    }

    fn finish(&mut self) -> Result<Vec<u8>, ClipError> {
        let mut output: Vec<u8> = Vec::with_capacity(7200);
        let flushed = self
            .encoder
            .flush::<FlushNoGap>(output.spare_capacity_mut())
            .map_err(|e| ClipError::EncodingFailed(format!("LAME flush failed: {:?}", e)))?;

        // SAFETY: the encoder initialised `flushed` bytes of spare capacity.
        unsafe {
            output.set_len(flushed);
        }
        Ok(output)
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_buckets() {
        assert!(matches!(lame_bitrate(64), Bitrate::Kbps96));
        assert!(matches!(lame_bitrate(192), Bitrate::Kbps192));
        assert!(matches!(lame_bitrate(320), Bitrate::Kbps320));
    }

    #[test]
    fn encodes_a_second_of_stereo() {
        let mut mp3 = Mp3Transcoder::new(44100, 2, 128).unwrap();
        let samples: Vec<f32> = (0..44100 * 2)
            .map(|i| ((i / 2) as f32 * 0.05).sin() * 0.5)
            .collect();

        let mut bytes = Vec::new();
        for block in samples.chunks(8192) {
            bytes.extend(mp3.encode_block(block).unwrap());
        }
        bytes.extend(mp3.finish().unwrap());

        assert!(!bytes.is_empty());
        assert_eq!(mp3.extension(), "mp3");
    }
}
