pub mod clip_writer;
pub mod file_encoder;
pub mod mp3_transcoder;
pub mod naming;
