use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::WaveFormat;
use crate::models::error::ClipError;
use crate::traits::clip_store::ClipStore;

#[derive(Debug)]
struct Inner<T> {
    buffer: Vec<T>,
    length: usize,
    position: usize,
}

impl<T: Copy> Inner<T> {
    /// Copy the newest `target.len()` items that end `offset` items before the
    /// newest one, oldest first.
    fn copy_window(&self, target: &mut [T], offset: usize) -> usize {
        let capacity = self.buffer.len();
        let available = self.length.saturating_sub(offset);
        let count = target.len().min(available);
        if count == 0 {
            return 0;
        }

        // `position` is the next write slot, so the newest item sits just before it.
        let end = (self.position + capacity - offset % capacity) % capacity;
        let start = (end + capacity - count) % capacity;

        let first = (capacity - start).min(count);
        target[..first].copy_from_slice(&self.buffer[start..start + first]);
        target[first..count].copy_from_slice(&self.buffer[..count - first]);
        count
    }
}

/// Fixed-capacity wraparound buffer that overwrites its oldest items.
///
/// Every operation takes the instance lock, so a read always observes a
/// state between two whole writes.
#[derive(Debug)]
pub struct CircularBuffer<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Copy + Default> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: vec![T::default(); capacity],
                length: 0,
                position: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Number of valid items.
    pub fn len(&self) -> usize {
        self.inner.lock().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the next write.
    pub fn position(&self) -> usize {
        self.inner.lock().position
    }

    /// Append `source`, overwriting the oldest items once full.
    ///
    /// If `source` is at least as long as the capacity only its trailing
    /// `capacity` items are kept. Returns the number of items stored.
    pub fn write(&self, source: &[T]) -> usize {
        let mut inner = self.inner.lock();
        let capacity = inner.buffer.len();
        if capacity == 0 || source.is_empty() {
            return 0;
        }

        if source.len() >= capacity {
            inner
                .buffer
                .copy_from_slice(&source[source.len() - capacity..]);
            inner.position = 0;
            inner.length = capacity;
            return capacity;
        }

        let position = inner.position;
        let first = (capacity - position).min(source.len());
        inner.buffer[position..position + first].copy_from_slice(&source[..first]);
        let rest = source.len() - first;
        inner.buffer[..rest].copy_from_slice(&source[first..]);

        inner.position = (position + source.len()) % capacity;
        inner.length = (inner.length + source.len()).min(capacity);
        source.len()
    }

    /// Append `count` items of `source` starting at `offset`. Out-of-range
    /// requests are clamped to `source`.
    pub fn write_range(&self, source: &[T], offset: usize, count: usize) -> usize {
        let start = offset.min(source.len());
        let end = start.saturating_add(count).min(source.len());
        self.write(&source[start..end])
    }

    /// Fill `target` with the newest items, oldest first. Returns the number
    /// of items copied, bounded by `len()`.
    pub fn read(&self, target: &mut [T]) -> usize {
        self.read_offset(target, 0)
    }

    /// Like [`read`](Self::read), but the copied window ends `offset` items
    /// before the newest item.
    pub fn read_offset(&self, target: &mut [T], offset: usize) -> usize {
        self.inner.lock().copy_window(target, offset)
    }

    /// All valid items, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        let inner = self.inner.lock();
        let mut out = vec![T::default(); inner.length];
        inner.copy_window(&mut out, 0);
        out
    }

    /// Reallocate to `new_capacity`, keeping the newest
    /// `min(len, new_capacity)` items in order.
    pub fn set_capacity(&self, new_capacity: usize) {
        let mut inner = self.inner.lock();
        if inner.buffer.len() == new_capacity {
            return;
        }

        let keep = inner.length.min(new_capacity);
        let mut buffer = vec![T::default(); new_capacity];
        inner.copy_window(&mut buffer[..keep], 0);

        inner.buffer = buffer;
        inner.length = keep;
        inner.position = if new_capacity == 0 { 0 } else { keep % new_capacity };
    }

    /// Zero the storage and forget all items.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.buffer.fill(T::default());
        inner.length = 0;
        inner.position = 0;
    }
}

/// [`ClipStore`] backed by a byte [`CircularBuffer`] sized to the retention
/// window. Starts with a one-byte placeholder until the format is known.
pub struct CircularClipStore {
    buffer: CircularBuffer<u8>,
    format: Mutex<Option<WaveFormat>>,
    disposed: AtomicBool,
}

impl CircularClipStore {
    pub fn new() -> Self {
        Self {
            buffer: CircularBuffer::new(1),
            format: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn ensure_live(&self) -> Result<(), ClipError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ClipError::ObjectDisposed("circular clip store".into()));
        }
        Ok(())
    }
}

impl Default for CircularClipStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStore for CircularClipStore {
    fn configure(&self, format: WaveFormat, retention: Duration) -> Result<(), ClipError> {
        self.ensure_live()?;
        let mut current = self.format.lock();
        if current.is_some_and(|f| f != format) {
            log::debug!("Clip store format changed to {}, discarding buffered audio", format);
            self.buffer.clear();
        }
        *current = Some(format);

        let capacity = format.bytes_for_duration(retention);
        log::debug!(
            "Resizing circular clip store to {} bytes ({:.1}s)",
            capacity,
            retention.as_secs_f64()
        );
        self.buffer.set_capacity(capacity);
        Ok(())
    }

    fn push(&self, data: &[u8], _timestamp: DateTime<Utc>) -> Result<(), ClipError> {
        self.ensure_live()?;
        self.buffer.write(data);
        Ok(())
    }

    fn snapshot(&self, duration: Duration) -> Result<Vec<u8>, ClipError> {
        self.ensure_live()?;
        let Some(format) = *self.format.lock() else {
            return Ok(Vec::new());
        };

        let block = format.block_align().max(1);
        let wanted = format.bytes_for_duration(duration).min(self.buffer.len());
        let mut out = vec![0u8; wanted - wanted % block];
        let copied = self.buffer.read(&mut out);
        out.truncate(copied);
        Ok(out)
    }

    fn retained_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&self) {
        self.buffer.clear();
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.buffer.clear();
        self.buffer.set_capacity(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_in_order() {
        let buf = CircularBuffer::<u8>::new(10);
        buf.write(&[1, 2, 3]);
        buf.write(&[4, 5]);

        assert_eq!(buf.len(), 5);
        assert_eq!(buf.position(), 5);
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn overlong_write_keeps_tail() {
        let buf = CircularBuffer::<u8>::new(10);
        let source: Vec<u8> = (1..=15).collect();
        assert_eq!(buf.write(&source), 10);

        assert_eq!(buf.position(), 0);
        assert_eq!(buf.to_vec(), (6..=15).collect::<Vec<u8>>());
    }

    #[test]
    fn writes_across_wrap_boundary() {
        let buf = CircularBuffer::<u8>::new(4);
        buf.write(&[1, 2, 3]);
        buf.write(&[4, 5, 6]); // wraps: drops 1, 2

        assert_eq!(buf.len(), 4);
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.to_vec(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn many_small_writes_match_tail_of_input() {
        let buf = CircularBuffer::<u16>::new(7);
        let mut written = Vec::new();
        for i in 0..50u16 {
            let block: Vec<u16> = (0..(i % 4 + 1)).map(|j| i * 10 + j).collect();
            buf.write(&block);
            written.extend_from_slice(&block);
        }
        assert_eq!(buf.to_vec(), written[written.len() - 7..].to_vec());
    }

    #[test]
    fn read_is_bounded_by_length_and_does_not_consume() {
        let buf = CircularBuffer::<u8>::new(8);
        buf.write(&[1, 2, 3]);

        let mut target = [0u8; 6];
        assert_eq!(buf.read(&mut target), 3);
        assert_eq!(&target[..3], &[1, 2, 3]);

        let mut again = [0u8; 2];
        assert_eq!(buf.read(&mut again), 2);
        assert_eq!(again, [2, 3]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn read_offset_skips_newest_items() {
        let buf = CircularBuffer::<u8>::new(5);
        buf.write(&[1, 2, 3, 4, 5, 6, 7]);

        let mut target = [0u8; 2];
        assert_eq!(buf.read_offset(&mut target, 1), 2);
        assert_eq!(target, [5, 6]);

        let mut rest = [0u8; 10];
        assert_eq!(buf.read_offset(&mut rest, 3), 2);
        assert_eq!(&rest[..2], &[3, 4]);
    }

    #[test]
    fn write_range_clamps_to_source() {
        let buf = CircularBuffer::<u8>::new(8);
        assert_eq!(buf.write_range(&[1, 2, 3, 4], 2, 10), 2);
        assert_eq!(buf.to_vec(), vec![3, 4]);
    }

    #[test]
    fn shrinking_keeps_newest() {
        let buf = CircularBuffer::<u8>::new(6);
        buf.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buf.set_capacity(3);

        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf.to_vec(), vec![6, 7, 8]);

        buf.write(&[9]);
        assert_eq!(buf.to_vec(), vec![7, 8, 9]);
    }

    #[test]
    fn growing_keeps_everything() {
        let buf = CircularBuffer::<u8>::new(4);
        buf.write(&[1, 2, 3, 4, 5, 6]);
        buf.set_capacity(8);

        assert_eq!(buf.to_vec(), vec![3, 4, 5, 6]);
        buf.write(&[7, 8, 9]);
        assert_eq!(buf.to_vec(), vec![3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn clear_resets_state() {
        let buf = CircularBuffer::<u8>::new(4);
        buf.write(&[1, 2, 3]);
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.position(), 0);
        assert!(buf.to_vec().is_empty());
    }

    #[test]
    fn zero_capacity_is_a_no_op() {
        let buf = CircularBuffer::<u8>::new(0);
        assert_eq!(buf.write(&[1, 2, 3]), 0);
        let mut target = [0u8; 3];
        assert_eq!(buf.read(&mut target), 0);
        buf.set_capacity(0);
        assert!(buf.is_empty());
    }

    #[test]
    fn store_snapshot_is_frame_aligned() {
        let store = CircularClipStore::new();
        let format = WaveFormat::pcm16(1000, 2); // 4000 bytes per second
        store.configure(format, Duration::from_secs(1)).unwrap();
        assert_eq!(store.capacity(), 4000);

        let data: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();
        store.push(&data, Utc::now()).unwrap();

        let clip = store.snapshot(Duration::from_millis(250)).unwrap();
        assert_eq!(clip.len(), 1000);
        assert_eq!(clip, data[5000..].to_vec());

        let all = store.snapshot(Duration::from_secs(10)).unwrap();
        assert_eq!(all, data[2000..].to_vec());
    }

    #[test]
    fn store_format_change_discards_audio() {
        let store = CircularClipStore::new();
        store
            .configure(WaveFormat::pcm16(1000, 1), Duration::from_secs(1))
            .unwrap();
        store.push(&[1; 100], Utc::now()).unwrap();

        store
            .configure(WaveFormat::pcm16(1000, 1), Duration::from_secs(2))
            .unwrap();
        assert_eq!(store.retained_bytes(), 100);

        store
            .configure(WaveFormat::float32(1000, 1), Duration::from_secs(2))
            .unwrap();
        assert_eq!(store.retained_bytes(), 0);
    }

    #[test]
    fn disposed_store_rejects_use() {
        let store = CircularClipStore::new();
        store.dispose();
        assert!(matches!(
            store.push(&[1], Utc::now()),
            Err(ClipError::ObjectDisposed(_))
        ));
        assert!(store.snapshot(Duration::from_secs(1)).is_err());
    }
}
