use crate::models::error::ClipError;

/// Incremental encoder from interleaved f32 samples to a compressed container.
pub trait Transcoder {
    /// Encode one block of interleaved samples, returning the bytes produced.
    fn encode_block(&mut self, samples: &[f32]) -> Result<Vec<u8>, ClipError>;

    /// Flush buffered frames at the end of the stream.
    fn finish(&mut self) -> Result<Vec<u8>, ClipError>;

    /// File extension of the produced container, without the dot.
    fn extension(&self) -> &'static str;
}
