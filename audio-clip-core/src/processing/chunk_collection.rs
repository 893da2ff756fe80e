use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::WaveFormat;
use crate::models::error::ClipError;
use crate::traits::clip_store::ClipStore;

/// One capture callback worth of raw audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub buffer: Vec<u8>,
    /// Valid bytes at the start of `buffer`; never more than its length.
    pub bytes_recorded: usize,
    pub timestamp: DateTime<Utc>,
}

impl Chunk {
    pub fn new(buffer: Vec<u8>, bytes_recorded: usize, timestamp: DateTime<Utc>) -> Self {
        let bytes_recorded = bytes_recorded.min(buffer.len());
        Self {
            buffer,
            bytes_recorded,
            timestamp,
        }
    }

    pub fn from_bytes(data: &[u8], timestamp: DateTime<Utc>) -> Self {
        Self::new(data.to_vec(), data.len(), timestamp)
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.bytes_recorded]
    }
}

/// Chunk as held by the collection; the payload may be deflated.
struct StoredChunk {
    payload: Vec<u8>,
    bytes_recorded: usize,
    timestamp: DateTime<Utc>,
}

struct CollectionState {
    chunks: VecDeque<StoredChunk>,
    retention: Duration,
    format: Option<WaveFormat>,
    disposed: bool,
}

struct Shared {
    state: Mutex<CollectionState>,
    wake: Condvar,
    compress: bool,
    flush_delay: Duration,
    grace: Duration,
}

impl Shared {
    fn encode(&self, chunk: Chunk) -> Result<StoredChunk, ClipError> {
        let payload = if self.compress {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
            encoder
                .write_all(chunk.data())
                .map_err(|e| ClipError::Unknown(format!("chunk deflate failed: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| ClipError::Unknown(format!("chunk deflate failed: {}", e)))?
        } else {
            let mut buffer = chunk.buffer;
            buffer.truncate(chunk.bytes_recorded);
            buffer
        };
        Ok(StoredChunk {
            payload,
            bytes_recorded: chunk.bytes_recorded,
            timestamp: chunk.timestamp,
        })
    }

    fn decode(&self, stored: &StoredChunk) -> Result<Chunk, ClipError> {
        let buffer = if self.compress {
            let mut out = Vec::with_capacity(stored.bytes_recorded);
            DeflateDecoder::new(stored.payload.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| ClipError::Unknown(format!("chunk inflate failed: {}", e)))?;
            out
        } else {
            stored.payload.clone()
        };
        Ok(Chunk::new(buffer, stored.bytes_recorded, stored.timestamp))
    }
}

/// Drops chunks older than `cutoff` from the head. Chunks arrive in time
/// order, so the first young chunk ends the scan.
fn trim_before(state: &mut CollectionState, cutoff: DateTime<Utc>) -> usize {
    let mut removed = 0;
    while state
        .chunks
        .front()
        .is_some_and(|chunk| chunk.timestamp < cutoff)
    {
        state.chunks.pop_front();
        removed += 1;
    }
    removed
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

/// Time-indexed, append-only sequence of capture chunks trimmed to a
/// retention window by a background thread.
///
/// With `compress` set, payloads are deflated on add and inflated on read.
pub struct ChunkCollection {
    shared: Arc<Shared>,
    trimmer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ChunkCollection {
    pub fn new(
        retention: Duration,
        flush_delay: Duration,
        grace: Duration,
        compress: bool,
    ) -> Result<Self, ClipError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(CollectionState {
                chunks: VecDeque::new(),
                retention,
                format: None,
                disposed: false,
            }),
            wake: Condvar::new(),
            compress,
            flush_delay,
            grace,
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("chunk-trimmer".into())
            .spawn(move || trim_loop(worker))
            .map_err(|e| ClipError::Unknown(format!("failed to spawn trim thread: {}", e)))?;

        Ok(Self {
            shared,
            trimmer: Mutex::new(Some(handle)),
        })
    }

    /// Append a chunk. Fails with `ObjectDisposed` after [`dispose`](ClipStore::dispose).
    pub fn add(&self, chunk: Chunk) -> Result<(), ClipError> {
        if self.shared.state.lock().disposed {
            return Err(ClipError::ObjectDisposed("chunk collection".into()));
        }
        // Deflate outside the lock; the capture thread is the only writer.
        let stored = self.shared.encode(chunk)?;
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(ClipError::ObjectDisposed("chunk collection".into()));
        }
        state.chunks.push_back(stored);
        Ok(())
    }

    /// Chunks captured within the last `duration`, oldest first.
    pub fn get(&self, duration: Duration) -> Result<Vec<Chunk>, ClipError> {
        self.get_at(duration, Utc::now())
    }

    fn get_at(&self, duration: Duration, now: DateTime<Utc>) -> Result<Vec<Chunk>, ClipError> {
        let state = self.shared.state.lock();
        if state.disposed {
            return Err(ClipError::ObjectDisposed("chunk collection".into()));
        }
        let since = cutoff(now, duration);
        state
            .chunks
            .iter()
            .filter(|chunk| since.is_none_or(|since| chunk.timestamp >= since))
            .map(|chunk| self.shared.decode(chunk))
            .collect()
    }

    /// Trim as the background thread would at `now`. Returns chunks removed.
    pub fn trim(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.shared.state.lock();
        let age = state.retention + self.shared.grace;
        match cutoff(now, age) {
            Some(cutoff) => trim_before(&mut state, cutoff),
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retention(&self) -> Duration {
        self.shared.state.lock().retention
    }

    /// Bytes held in memory, after compression.
    pub fn stored_bytes(&self) -> usize {
        self.shared
            .state
            .lock()
            .chunks
            .iter()
            .map(|chunk| chunk.payload.len())
            .sum()
    }
}

fn trim_loop(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    let initial = state.retention;
    if !state.disposed {
        shared.wake.wait_for(&mut state, initial);
    }

    while !state.disposed {
        let age = state.retention + shared.grace;
        if let Some(cutoff) = cutoff(Utc::now(), age) {
            let removed = trim_before(&mut state, cutoff);
            if removed > 0 {
                log::trace!("Trimmed {} chunks older than {:?}", removed, age);
            }
        }
        shared.wake.wait_for(&mut state, shared.flush_delay);
    }
}

impl ClipStore for ChunkCollection {
    fn configure(&self, format: WaveFormat, retention: Duration) -> Result<(), ClipError> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(ClipError::ObjectDisposed("chunk collection".into()));
        }
        if state.format.is_some_and(|f| f != format) {
            log::debug!("Chunk collection format changed to {}, discarding chunks", format);
            state.chunks.clear();
        }
        state.format = Some(format);
        state.retention = retention;
        Ok(())
    }

    fn push(&self, data: &[u8], timestamp: DateTime<Utc>) -> Result<(), ClipError> {
        self.add(Chunk::from_bytes(data, timestamp))
    }

    fn snapshot(&self, duration: Duration) -> Result<Vec<u8>, ClipError> {
        let format = self.shared.state.lock().format;
        let chunks = self.get(duration)?;
        let mut out: Vec<u8> = chunks.iter().flat_map(|c| c.data().iter().copied()).collect();

        // Chunks straddle the window edge; cut to whole frames of `duration`.
        if let Some(format) = format {
            let block = format.block_align().max(1);
            let wanted = format.bytes_for_duration(duration);
            let keep = out.len().min(wanted);
            let keep = keep - keep % block;
            out.drain(..out.len() - keep);
        }
        Ok(out)
    }

    fn retained_bytes(&self) -> usize {
        self.shared
            .state
            .lock()
            .chunks
            .iter()
            .map(|chunk| chunk.bytes_recorded)
            .sum()
    }

    fn clear(&self) {
        self.shared.state.lock().chunks.clear();
    }

    fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            state.disposed = true;
            state.chunks.clear();
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.trimmer.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChunkCollection {
    fn drop(&mut self) {
        self.dispose();
    }
}
