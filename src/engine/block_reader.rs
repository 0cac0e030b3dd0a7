use crate::buffers::{ReaderId, RingSampleBuffer, WaitOutcome};
use crate::core::{BlockGeometry, SparseSet, SubbandInput};
use crate::error::RingError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one `read_block` call found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockRead {
    /// Samples flagged over all stations.
    pub lost_samples: u64,
    /// Stations whose read timed out before all samples arrived.
    pub timed_out: usize,
}

/// Extracts delay-compensated windows of one block from every station ring.
pub struct BlockReader {
    rings: Vec<Arc<RingSampleBuffer>>,
    geometry: BlockGeometry,
    max_offset: u64,
    timeout: Option<Duration>,
    /// Registration with each ring's sync lock, in deterministic runs.
    registrations: Vec<Option<ReaderId>>,
}

impl BlockReader {
    /// `timeout` bounds the wait for one block over all stations and
    /// subbands; `None` waits until the samples arrive or the station's
    /// stream ends.
    pub fn new(
        rings: Vec<Arc<RingSampleBuffer>>,
        geometry: BlockGeometry,
        max_offset: u64,
        timeout: Option<Duration>,
    ) -> Self {
        let registrations = rings
            .iter()
            .map(|ring| {
                ring.sync_lock()
                    .map(|sync| sync.register(Self::oldest_needed(&geometry, max_offset, 0)))
            })
            .collect();

        Self {
            rings,
            geometry,
            max_offset,
            timeout,
            registrations,
        }
    }

    pub fn nr_stations(&self) -> usize {
        self.rings.len()
    }

    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    fn oldest_needed(geometry: &BlockGeometry, max_offset: u64, block: u64) -> crate::core::TimeStamp {
        geometry.window(block, -(max_offset as i64)).0
    }

    /// Tell synchronised writers that nothing before `block` is needed anymore.
    pub fn release_before(&self, block: u64) {
        let position = Self::oldest_needed(&self.geometry, self.max_offset, block);
        for (ring, registration) in self.rings.iter().zip(&self.registrations) {
            if let (Some(sync), Some(id)) = (ring.sync_lock(), registration) {
                sync.advance(*id, position);
            }
        }
    }

    /// True once every station stream has ended before `block` could start.
    pub fn exhausted(&self, block: u64) -> bool {
        let earliest = Self::oldest_needed(&self.geometry, self.max_offset, block) + self.geometry.history;
        self.rings
            .iter()
            .all(|ring| ring.is_ended() && ring.head() <= earliest)
    }

    /// When waiting for a block started now has to give up.
    pub fn block_deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Read `subband` of `block` for all stations into `input`, waiting at
    /// most one timeout.
    pub fn read_block(
        &self,
        block: u64,
        subband: usize,
        offsets: &[i64],
        input: &mut SubbandInput,
    ) -> Result<BlockRead, RingError> {
        self.read_block_until(block, subband, offsets, self.block_deadline(), input)
    }

    /// Read `subband` of `block` for all stations into `input`.
    ///
    /// `offsets` holds one read offset per station. Reads for every subband of
    /// a block share `deadline`, so silent stations cost one timeout per block.
    /// Flags reported by the rings are merged into the metadata already in
    /// `input`.
    pub fn read_block_until(
        &self,
        block: u64,
        subband: usize,
        offsets: &[i64],
        deadline: Option<Instant>,
        input: &mut SubbandInput,
    ) -> Result<BlockRead, RingError> {
        let mut result = BlockRead::default();

        let span = self.geometry.span();
        let bps = input.bytes_per_sample;

        for (station, ring) in self.rings.iter().enumerate() {
            let offset = offsets.get(station).copied().unwrap_or(0);
            let (_, to) = self.geometry.window(block, offset);

            // Windows reaching before the first timestamp are clipped at zero;
            // the samples in front of it never existed.
            let clipped = span.saturating_sub(to.0);
            let out = input.station_mut(station);
            out[..clipped as usize * bps].fill(0);

            let mut flags = SparseSet::new();
            if clipped > 0 {
                flags.include(0, clipped);
            }
            if clipped < span {
                let status = ring.read(
                    subband,
                    to.shifted(-((span - clipped) as i64)),
                    to,
                    &mut out[clipped as usize * bps..],
                    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now())),
                )?;
                if status.outcome == WaitOutcome::TimedOut {
                    result.timed_out += 1;
                }
                flags.union_with(&status.flags.offset_by(clipped));
            }

            if !flags.is_empty() {
                result.lost_samples += flags.count();
                input.metadata[station].flags.union_with(&flags);
            }
        }

        Ok(result)
    }
}

impl Drop for BlockReader {
    fn drop(&mut self) {
        for (ring, registration) in self.rings.iter().zip(&self.registrations) {
            if let (Some(sync), Some(id)) = (ring.sync_lock(), registration) {
                sync.unregister(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StationId, TimeStamp};

    fn ring(capacity: u64) -> Arc<RingSampleBuffer> {
        Arc::new(RingSampleBuffer::new(StationId::new("CS001", "HBA0"), 1, capacity, 1).unwrap())
    }

    #[test]
    fn test_offset_shifts_window() {
        let ring = ring(64);
        let samples: Vec<u8> = (0..32).collect();
        ring.write(TimeStamp(0), &samples).unwrap();

        let geometry = BlockGeometry::new(TimeStamp(4), 8, 2);
        let reader = BlockReader::new(vec![ring], geometry, 4, Some(Duration::from_millis(10)));
        let mut input = SubbandInput::new(1, 10, 1);

        let read = reader.read_block(1, 0, &[-3], &mut input).unwrap();
        assert_eq!(read.lost_samples, 0);
        // block 1 begins at 12; history 2 and offset -3 start the window at 7
        assert_eq!(input.station(0), &[7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn test_missing_samples_become_flags() {
        let ring = ring(64);
        ring.write(TimeStamp(0), &[1; 6]).unwrap();
        ring.no_more_data();

        let geometry = BlockGeometry::new(TimeStamp(0), 8, 0);
        let reader = BlockReader::new(vec![ring], geometry, 0, None);
        let mut input = SubbandInput::new(1, 8, 1);

        let read = reader.read_block(0, 0, &[0], &mut input).unwrap();
        assert_eq!(read.lost_samples, 2);
        assert_eq!(input.metadata[0].flags.ranges(), &[(6, 8)]);
        assert!(reader.exhausted(1));
        assert!(!reader.exhausted(0));
    }

    #[test]
    fn test_window_before_first_sample_is_flagged() {
        let ring = ring(64);
        let samples: Vec<u8> = (1..=16).collect();
        ring.write(TimeStamp(0), &samples).unwrap();

        let geometry = BlockGeometry::new(TimeStamp(0), 8, 4);
        let reader = BlockReader::new(vec![ring], geometry, 0, None);
        let mut input = SubbandInput::new(1, 12, 1);
        input.station_mut(0).fill(0xff);

        let read = reader.read_block(0, 0, &[0], &mut input).unwrap();
        assert_eq!(read.lost_samples, 4);
        assert_eq!(input.metadata[0].flags.ranges(), &[(0, 4)]);
        assert_eq!(input.station(0), &[0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_silent_station_costs_one_timeout_per_block() {
        let live = Arc::new(RingSampleBuffer::new(StationId::new("CS001", "HBA0"), 8, 64, 1).unwrap());
        live.write(TimeStamp(0), &[1; 8 * 16]).unwrap();
        let silent = Arc::new(RingSampleBuffer::new(StationId::new("CS002", "HBA0"), 8, 64, 1).unwrap());

        let geometry = BlockGeometry::new(TimeStamp(0), 8, 0);
        let reader = BlockReader::new(vec![live, silent], geometry, 0, Some(Duration::from_millis(50)));

        let started = Instant::now();
        let deadline = reader.block_deadline();
        for subband in 0..8 {
            let mut input = SubbandInput::new(2, 8, 1);
            let read = reader
                .read_block_until(0, subband, &[0, 0], deadline, &mut input)
                .unwrap();
            assert_eq!(read.timed_out, 1);
            assert_eq!(read.lost_samples, 8);
            assert!(input.metadata[0].flags.is_empty());
            assert_eq!(input.metadata[1].flags.ranges(), &[(0, 8)]);
            assert_eq!(input.station(0), &[1; 8]);
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(300), "block took {:?}", elapsed);
    }
}
