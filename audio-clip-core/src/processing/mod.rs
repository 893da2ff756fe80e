pub mod chunk_collection;
pub mod circular_buffer;
pub mod normalizer;
pub mod pcm;
pub mod wav_format;
