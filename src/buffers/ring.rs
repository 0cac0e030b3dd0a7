//! Per-station circular sample buffer.
//!
//! One writer (the station receiver) appends packets at their timestamps; any
//! number of readers extract windows. The writer is never slowed down by
//! readers unless a [`SyncLock`] is attached: old samples are overwritten and
//! readers that come too late get those samples flagged instead of stale data.

use super::SyncLock;
use crate::core::{SparseSet, StationId, TimeStamp};
use crate::error::RingError;
use anyhow::{Context, Result};
use memmap2::MmapMut;
use parking_lot::{Condvar, Mutex};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const HEADER_SIZE: usize = 4096;
const MAGIC: &[u8; 8] = b"STNRING!";
const VERSION: u64 = 1;

/// Why a wait for samples returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    EndOfStream,
}

/// Result of a ring read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadStatus {
    /// Samples that could not be delivered, relative to the start of the read.
    /// They are zero-filled in the output buffer.
    pub flags: SparseSet,
    pub outcome: WaitOutcome,
}

impl ReadStatus {
    pub fn lost_samples(&self) -> u64 {
        self.flags.count()
    }

    pub fn data_loss(&self) -> bool {
        !self.flags.is_empty()
    }
}

pub struct RingSampleBuffer {
    station: StationId,
    nr_subbands: usize,
    /// Samples kept per subband.
    capacity: u64,
    bytes_per_sample: usize,

    #[allow(dead_code)]
    mmap: MmapMut,
    /// SAFETY: points `HEADER_SIZE` bytes into `mmap`, valid while `mmap` lives.
    data: *mut u8,

    /// One past the newest written timestamp.
    head: AtomicU64,
    /// Samples below this timestamp may have been overwritten.
    floor: AtomicU64,
    /// Timestamps currently held, within the retention window.
    valid: Mutex<SparseSet>,
    write_lock: Mutex<()>,
    wakeup: Mutex<()>,
    written: Condvar,
    ended: AtomicBool,
    stale_writes: AtomicU64,
    sync: Option<Arc<SyncLock>>,
}

// SAFETY: the sample region is only written under `write_lock`. Readers copy
// concurrently and validate against `floor` afterwards, discarding anything
// the writer may have touched meanwhile.
unsafe impl Send for RingSampleBuffer {}
unsafe impl Sync for RingSampleBuffer {}

impl std::fmt::Debug for RingSampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingSampleBuffer")
            .field("station", &self.station)
            .field("nr_subbands", &self.nr_subbands)
            .field("capacity", &self.capacity)
            .field("head", &self.head())
            .field("synchronised", &self.sync.is_some())
            .finish()
    }
}

impl RingSampleBuffer {
    /// Ring in anonymous memory.
    pub fn new(
        station: StationId,
        nr_subbands: usize,
        capacity: u64,
        bytes_per_sample: usize,
    ) -> Result<Self> {
        let size = HEADER_SIZE + Self::data_size(nr_subbands, capacity, bytes_per_sample);
        let mmap = MmapMut::map_anon(size).context("failed to map anonymous ring memory")?;
        Self::from_mmap(station, nr_subbands, capacity, bytes_per_sample, mmap)
    }

    /// Ring in a file mapping (e.g. under /dev/shm) so other processes can inspect it.
    pub fn create_shared(
        path: impl AsRef<Path>,
        station: StationId,
        nr_subbands: usize,
        capacity: u64,
        bytes_per_sample: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let size = HEADER_SIZE + Self::data_size(nr_subbands, capacity, bytes_per_sample);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open ring file {}", path.display()))?;
        file.set_len(size as u64)?;

        // SAFETY: the file was just created and sized by us; nothing else maps it mutably.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Self::from_mmap(station, nr_subbands, capacity, bytes_per_sample, mmap)
    }

    fn data_size(nr_subbands: usize, capacity: u64, bytes_per_sample: usize) -> usize {
        nr_subbands * capacity as usize * bytes_per_sample
    }

    fn from_mmap(
        station: StationId,
        nr_subbands: usize,
        capacity: u64,
        bytes_per_sample: usize,
        mut mmap: MmapMut,
    ) -> Result<Self> {
        anyhow::ensure!(nr_subbands > 0, "ring needs at least one subband");
        anyhow::ensure!(capacity > 0, "ring capacity must be non-zero");
        anyhow::ensure!(bytes_per_sample > 0, "sample size must be non-zero");

        mmap[0..8].copy_from_slice(MAGIC);
        mmap[8..16].copy_from_slice(&VERSION.to_le_bytes());
        mmap[16..24].copy_from_slice(&(nr_subbands as u64).to_le_bytes());
        mmap[24..32].copy_from_slice(&capacity.to_le_bytes());
        mmap[32..40].copy_from_slice(&(bytes_per_sample as u64).to_le_bytes());

        // SAFETY: the mapping is HEADER_SIZE + data_size bytes long.
        let data = unsafe { mmap.as_mut_ptr().add(HEADER_SIZE) };

        log::info!(
            "station {}: ring of {} samples x {} subbands ({} MiB)",
            station,
            capacity,
            nr_subbands,
            Self::data_size(nr_subbands, capacity, bytes_per_sample) / (1024 * 1024)
        );

        Ok(Self {
            station,
            nr_subbands,
            capacity,
            bytes_per_sample,
            mmap,
            data,
            head: AtomicU64::new(0),
            floor: AtomicU64::new(0),
            valid: Mutex::new(SparseSet::new()),
            write_lock: Mutex::new(()),
            wakeup: Mutex::new(()),
            written: Condvar::new(),
            ended: AtomicBool::new(false),
            stale_writes: AtomicU64::new(0),
            sync: None,
        })
    }

    /// Make the writer wait for registered readers (deterministic runs).
    pub fn with_sync_lock(mut self, sync: Arc<SyncLock>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn sync_lock(&self) -> Option<&Arc<SyncLock>> {
        self.sync.as_ref()
    }

    pub fn station(&self) -> &StationId {
        &self.station
    }

    pub fn nr_subbands(&self) -> usize {
        self.nr_subbands
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    pub fn head(&self) -> TimeStamp {
        TimeStamp(self.head.load(Ordering::Acquire))
    }

    /// Oldest timestamp that is guaranteed not to be overwritten yet.
    pub fn oldest_retained(&self) -> TimeStamp {
        TimeStamp(self.floor.load(Ordering::Acquire))
    }

    /// Packets dropped because they were older than the retention window.
    pub fn stale_writes(&self) -> u64 {
        self.stale_writes.load(Ordering::Relaxed)
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Written ranges within `[from, to)`.
    pub fn written_within(&self, from: TimeStamp, to: TimeStamp) -> SparseSet {
        self.valid.lock().subset(from.0, to.0)
    }

    /// Store one packet laid out as `[subband][sample][bytes_per_sample]`.
    ///
    /// Returns `false` if the packet was entirely older than the retention
    /// window and therefore discarded.
    pub fn write(&self, timestamp: TimeStamp, samples: &[u8]) -> Result<bool, RingError> {
        let frame = self.nr_subbands * self.bytes_per_sample;
        if samples.is_empty() || samples.len() % frame != 0 {
            return Err(RingError::PacketSize {
                len: samples.len(),
                frame,
            });
        }
        let nr_samples = (samples.len() / frame) as u64;
        let end = timestamp
            .checked_add(nr_samples)
            .ok_or(RingError::TimestampOverflow {
                timestamp: timestamp.0,
                nr_samples,
            })?
            .0;

        if let Some(sync) = &self.sync {
            sync.wait_for_readers(TimeStamp(end.saturating_sub(self.capacity)));
        }

        let _guard = self.write_lock.lock();

        let head = self.head.load(Ordering::Acquire);
        let new_head = head.max(end);
        let new_floor = new_head.saturating_sub(self.capacity);

        if end <= new_floor {
            self.stale_writes.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        // part of the packet that still fits in the window
        let first = timestamp.0.max(new_floor);
        let skip = (first - timestamp.0) as usize;

        // Publish the new floor before touching memory so readers racing with
        // this write discard what they copied from the recycled slots.
        {
            let mut valid = self.valid.lock();
            valid.truncate_below(new_floor);
            valid.exclude(first, end);
        }
        self.floor.fetch_max(new_floor, Ordering::AcqRel);
        fence(Ordering::Release);

        let bps = self.bytes_per_sample;
        let count = (end - first) as usize;
        for subband in 0..self.nr_subbands {
            let src_base = (subband * nr_samples as usize + skip) * bps;
            self.copy_in(subband, first, &samples[src_base..src_base + count * bps]);
        }

        self.valid.lock().include(first, end);
        self.head.fetch_max(end, Ordering::AcqRel);

        let _wakeup = self.wakeup.lock();
        self.written.notify_all();
        Ok(true)
    }

    /// Wake all readers and let them return with whatever has been written.
    pub fn no_more_data(&self) {
        self.ended.store(true, Ordering::Release);
        let _wakeup = self.wakeup.lock();
        self.written.notify_all();
        log::debug!("station {}: end of stream at {}", self.station, self.head());
    }

    /// Wait until `to` has been written, the stream ended, or `timeout` passed.
    pub fn wait_for(&self, to: TimeStamp, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.wakeup.lock();
        loop {
            if self.head.load(Ordering::Acquire) >= to.0 {
                return WaitOutcome::Ready;
            }
            if self.ended.load(Ordering::Acquire) {
                return WaitOutcome::EndOfStream;
            }
            match deadline {
                None => self.written.wait(&mut guard),
                Some(deadline) => {
                    if self.written.wait_until(&mut guard, deadline).timed_out() {
                        if self.head.load(Ordering::Acquire) >= to.0 {
                            return WaitOutcome::Ready;
                        }
                        return WaitOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// Copy `[from, to)` of `subband` into `out`, waiting for the samples first.
    ///
    /// Samples that were never written, already overwritten, or still missing
    /// when the wait ended are zero-filled and reported in the returned flags.
    pub fn read(
        &self,
        subband: usize,
        from: TimeStamp,
        to: TimeStamp,
        out: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<ReadStatus, RingError> {
        if subband >= self.nr_subbands {
            return Err(RingError::Subband {
                subband,
                nr_subbands: self.nr_subbands,
            });
        }
        if to <= from {
            return Err(RingError::EmptySpan {
                from: from.0,
                to: to.0,
            });
        }
        let span = to.0 - from.0;
        if span > self.capacity {
            return Err(RingError::SpanTooLarge {
                span,
                capacity: self.capacity,
            });
        }
        let expected = span as usize * self.bytes_per_sample;
        if out.len() != expected {
            return Err(RingError::BufferSize {
                expected,
                actual: out.len(),
            });
        }

        let outcome = self.wait_for(to, timeout);

        // Snapshot what was held before copying: ranges only disappear by the
        // floor moving up, which is checked again afterwards.
        let valid = self.valid.lock().subset(from.0, to.0);
        let copied_end = to.0.min(self.head.load(Ordering::Acquire));
        let floor_before = self.floor.load(Ordering::Acquire);
        let copy_from = from.0.max(floor_before);

        if copy_from < copied_end {
            let offset = (copy_from - from.0) as usize * self.bytes_per_sample;
            let len = (copied_end - copy_from) as usize * self.bytes_per_sample;
            self.copy_out(subband, TimeStamp(copy_from), &mut out[offset..offset + len]);
        }

        fence(Ordering::Acquire);
        let floor_after = self.floor.load(Ordering::Acquire);

        let delivered = valid.subset(from.0.max(floor_after), copied_end);
        let flags = delivered.complement_within(from.0, to.0).rebased(from.0);

        let bps = self.bytes_per_sample;
        for &(a, b) in flags.ranges() {
            out[a as usize * bps..b as usize * bps].fill(0);
        }

        if !flags.is_empty() {
            log::debug!(
                "station {} subband {}: {} of {} samples flagged in [{}, {})",
                self.station,
                subband,
                flags.count(),
                span,
                from.0,
                to.0
            );
        }

        Ok(ReadStatus { flags, outcome })
    }

    fn slot(&self, subband: usize, timestamp: u64) -> usize {
        subband * self.capacity as usize + (timestamp % self.capacity) as usize
    }

    fn copy_in(&self, subband: usize, first: u64, bytes: &[u8]) {
        let bps = self.bytes_per_sample;
        let count = (bytes.len() / bps) as u64;
        let start = first % self.capacity;
        let head_part = count.min(self.capacity - start) as usize;

        // SAFETY: both parts stay within this subband's `capacity` slots, and
        // `count <= capacity` because older samples were cut off above.
        unsafe {
            let dest = self.data.add(self.slot(subband, first) * bps);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dest, head_part * bps);
            if head_part < count as usize {
                let dest = self.data.add(self.slot(subband, 0) * bps);
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr().add(head_part * bps),
                    dest,
                    (count as usize - head_part) * bps,
                );
            }
        }
    }

    fn copy_out(&self, subband: usize, first: TimeStamp, out: &mut [u8]) {
        let bps = self.bytes_per_sample;
        let count = (out.len() / bps) as u64;
        let start = first.0 % self.capacity;
        let head_part = count.min(self.capacity - start) as usize;

        // SAFETY: same bounds as `copy_in`; `count <= capacity` is checked by `read`.
        unsafe {
            let src = self.data.add(self.slot(subband, first.0) * bps);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), head_part * bps);
            if head_part < count as usize {
                let src = self.data.add(self.slot(subband, 0) * bps);
                std::ptr::copy_nonoverlapping(
                    src,
                    out.as_mut_ptr().add(head_part * bps),
                    (count as usize - head_part) * bps,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_ring_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring");
        let ring = RingSampleBuffer::create_shared(&path, StationId::new("CS001", "LBA"), 2, 64, 4)
            .unwrap();
        drop(ring);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 64);
        assert_eq!(bytes.len(), HEADER_SIZE + 2 * 64 * 4);
    }
}
