use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_models::WaveFormat;
use crate::models::error::ClipError;
use crate::processing::wav_format;

/// Streaming WAV file writer.
///
/// Writes a placeholder header on open, appends raw frames in the stream's
/// native format, and patches the size fields on close.
///
/// ```text
/// [44-byte WAV header]
/// [raw PCM / IEEE float data...]
/// ```
pub struct ClipWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    total_bytes_written: u64,
}

impl ClipWriter {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: None,
            total_bytes_written: 0,
        }
    }

    /// Create the file and write the initial 44-byte WAV header.
    pub fn open(&mut self, format: &WaveFormat) -> Result<(), ClipError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ClipError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&self.file_path)
            .map_err(|e| ClipError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(BufWriter::new(file));

        // Data size placeholder, patched on close.
        let header = wav_format::generate_wav_header(format, 0);
        self.write_raw(&header)
    }

    /// Append raw frames.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ClipError> {
        if self.file.is_none() {
            return Err(ClipError::StorageError("file is not open for writing".into()));
        }
        self.write_raw(data)
    }

    /// Patch the header sizes, flush, and return the SHA-256 checksum of the file.
    pub fn close(&mut self) -> Result<String, ClipError> {
        let mut writer = self
            .file
            .take()
            .ok_or_else(|| ClipError::StorageError("file is not open".into()))?;

        let data_size = self.total_bytes_written - wav_format::WAV_HEADER_SIZE as u64;
        let mut header = [0u8; wav_format::WAV_HEADER_SIZE];
        wav_format::patch_file_size(&mut header, self.total_bytes_written);
        wav_format::patch_data_size(&mut header, data_size);

        let storage = |e: std::io::Error| ClipError::StorageError(e.to_string());
        writer.seek(SeekFrom::Start(4)).map_err(storage)?;
        writer.write_all(&header[4..8]).map_err(storage)?;
        writer.seek(SeekFrom::Start(40)).map_err(storage)?;
        writer.write_all(&header[40..44]).map_err(storage)?;
        writer.flush().map_err(storage)?;
        drop(writer);

        sha256_file(&self.file_path)
    }

    /// Total bytes written so far (including WAV header).
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), ClipError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ClipError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| ClipError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

/// SHA-256 hex digest of a file, read in blocks.
pub fn sha256_file(path: &Path) -> Result<String, ClipError> {
    let mut file = File::open(path)
        .map_err(|e| ClipError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut block)
            .map_err(|e| ClipError::StorageError(format!("failed to read file for checksum: {}", e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
