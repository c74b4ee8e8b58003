//! Shared frame buffers.
//!
//! A [`SharedFrame`] is a fixed-size pixel region guarded by a lock and a
//! condition variable. The producer locks it, stamps a capture time, copies
//! pixels, unlocks and then wakes every waiting consumer. It never waits on
//! consumers.
//!
//! Frames backed by a file (normally under `/dev/shm`) start with a 16-byte
//! header so that other processes can read them without the in-process lock:
//!
//! | offset | type     | field                                   |
//! |--------|----------|-----------------------------------------|
//! | 0      | u64 LE   | sequence, odd while a write is underway |
//! | 8      | i64 LE   | capture time, µs since the Unix epoch   |
//! | 16     | [u8]     | pixels, `width * height * 4` bytes      |

use crate::error::Result;
use chrono::{DateTime, Utc};
use memmap2::MmapMut;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};

pub const HEADER_LEN: usize = 16;

enum Storage {
    Heap(Vec<u8>),
    Mapped(MmapMut),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Heap(v) => v.as_slice(),
            Storage::Mapped(map) => &map[..],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Heap(v) => v.as_mut_slice(),
            Storage::Mapped(map) => &mut map[..],
        }
    }
}

struct FrameSlot {
    sequence: u64,
    timestamp: Option<DateTime<Utc>>,
    storage: Storage,
}

impl FrameSlot {
    fn write_header(&mut self) {
        let micros = self.timestamp.map_or(0, |t| t.timestamp_micros());
        let header = &mut self.storage.bytes_mut()[..HEADER_LEN];
        header[..8].copy_from_slice(&self.sequence.to_le_bytes());
        header[8..].copy_from_slice(&micros.to_le_bytes());
    }
}

/// Owned copy of a published frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub pixels: Vec<u8>,
}

pub struct SharedFrame {
    name: String,
    len: usize,
    slot: Mutex<FrameSlot>,
    published: Condvar,
}

impl SharedFrame {
    /// Process-local frame of `len` pixel bytes.
    pub fn in_memory(name: impl Into<String>, len: usize) -> Self {
        Self::with_storage(name.into(), len, Storage::Heap(vec![0; HEADER_LEN + len]))
    }

    /// Frame backed by `dir/name`, created or resized to fit.
    pub fn mapped(dir: &Path, name: &str, len: usize) -> Result<Self> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.set_len((HEADER_LEN + len) as u64)?;

        // SAFETY: the file is sized above and outlives nothing we hand out;
        // other processes only ever read it.
        let map = unsafe { MmapMut::map_mut(&file)? };
        tracing::info!(path = %path.display(), bytes = HEADER_LEN + len, "Mapped shared frame");

        Ok(Self::with_storage(name.to_string(), len, Storage::Mapped(map)))
    }

    fn with_storage(name: String, len: usize, storage: Storage) -> Self {
        let mut slot = FrameSlot {
            sequence: 0,
            timestamp: None,
            storage,
        };
        slot.storage.bytes_mut().fill(0);
        slot.write_header();
        Self {
            name,
            len,
            slot: Mutex::new(slot),
            published: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixel bytes per frame.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Takes the frame lock for writing. Unlocks when the writer drops.
    pub fn lock(&self) -> FrameWriter<'_> {
        let mut slot = self.slot.lock();
        slot.sequence += 1;
        slot.write_header();
        FrameWriter { slot }
    }

    /// Wakes every consumer blocked in [`SharedFrame::wait_newer`].
    pub fn notify_all(&self) {
        self.published.notify_all();
    }

    /// Lock, stamp, copy, unlock, notify.
    pub fn publish(&self, timestamp: DateTime<Utc>, pixels: &[u8]) {
        {
            let mut writer = self.lock();
            writer.set_timestamp(timestamp);
            writer.data_mut().copy_from_slice(pixels);
        }
        self.notify_all();
    }

    pub fn latest(&self) -> Frame {
        let slot = self.slot.lock();
        Self::copy_out(&slot)
    }

    /// Blocks until a frame newer than `sequence` is published or `timeout`
    /// elapses.
    pub fn wait_newer(&self, sequence: u64, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.sequence <= sequence {
            if self.published.wait_until(&mut slot, deadline).timed_out() {
                return (slot.sequence > sequence).then(|| Self::copy_out(&slot));
            }
        }
        Some(Self::copy_out(&slot))
    }

    fn copy_out(slot: &FrameSlot) -> Frame {
        Frame {
            sequence: slot.sequence,
            timestamp: slot.timestamp,
            pixels: slot.storage.bytes()[HEADER_LEN..].to_vec(),
        }
    }
}

/// Write access to a locked frame.
pub struct FrameWriter<'a> {
    slot: MutexGuard<'a, FrameSlot>,
}

impl FrameWriter<'_> {
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.slot.timestamp = Some(timestamp);
        self.slot.write_header();
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.slot.storage.bytes_mut()[HEADER_LEN..]
    }
}

impl Drop for FrameWriter<'_> {
    fn drop(&mut self) {
        self.slot.sequence += 1;
        self.slot.write_header();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn publish_bumps_sequence_by_two() {
        let frame = SharedFrame::in_memory("test", 8);
        assert_eq!(frame.latest().sequence, 0);
        assert_eq!(frame.latest().timestamp, None);

        let now = Utc::now();
        frame.publish(now, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let latest = frame.latest();
        assert_eq!(latest.sequence, 2);
        assert_eq!(latest.timestamp, Some(now));
        assert_eq!(latest.pixels, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn wait_newer_times_out_without_publish() {
        let frame = SharedFrame::in_memory("test", 4);
        assert!(frame.wait_newer(0, Duration::from_millis(20)).is_none());
    }

    #[test]
    fn consumer_wakes_on_publish() {
        let frame = Arc::new(SharedFrame::in_memory("test", 4));
        let consumer = {
            let frame = frame.clone();
            thread::spawn(move || frame.wait_newer(0, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        frame.publish(Utc::now(), &[9, 9, 9, 9]);

        let got = consumer.join().unwrap().expect("frame");
        assert_eq!(got.sequence % 2, 0);
        assert_eq!(got.pixels, [9, 9, 9, 9]);
    }

    #[test]
    fn mapped_header_is_visible_in_file() {
        let dir = std::env::temp_dir().join(format!("sim_camera-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let frame = SharedFrame::mapped(&dir, "video0.argb", 4).unwrap();
        let t = DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        frame.publish(t, &[10, 20, 30, 40]);
        drop(frame);

        let bytes = std::fs::read(dir.join("video0.argb")).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(u64::from_le_bytes(bytes[..8].try_into().unwrap()), 2);
        assert_eq!(
            i64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            1_700_000_000_123_456
        );
        assert_eq!(&bytes[16..], &[10, 20, 30, 40]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
