use super::{BlockId, SubbandMetaData, TimeStamp};

/// Placement of blocks on the sample clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    pub start: TimeStamp,
    pub block_size: u64,
    /// Samples preceding each block that the channeliser needs as filter taps.
    pub history: u64,
}

impl BlockGeometry {
    pub fn new(start: TimeStamp, block_size: u64, history: u64) -> Self {
        Self {
            start,
            block_size,
            history,
        }
    }

    pub fn begin(&self, block: u64) -> TimeStamp {
        self.start + block * self.block_size
    }

    pub fn end(&self, block: u64) -> TimeStamp {
        self.begin(block + 1)
    }

    /// Samples read per station and subband, history included.
    pub fn span(&self) -> u64 {
        self.block_size + self.history
    }

    /// Ring window `[from, to)` for `block` shifted by `offset` samples.
    pub fn window(&self, block: u64, offset: i64) -> (TimeStamp, TimeStamp) {
        let to = self.end(block).shifted(offset);
        let from = self.begin(block).shifted(offset).shifted(-(self.history as i64));
        (from, to)
    }
}

/// One subband of one block, all stations, ready for the kernel chain.
#[derive(Debug, Clone)]
pub struct SubbandInput {
    pub block_id: BlockId,
    pub nr_stations: usize,
    pub samples_per_station: usize,
    pub bytes_per_sample: usize,
    /// `[station][sample][bytes_per_sample]`
    pub samples: Vec<u8>,
    /// One entry per station.
    pub metadata: Vec<SubbandMetaData>,
}

impl SubbandInput {
    pub fn new(nr_stations: usize, samples_per_station: usize, bytes_per_sample: usize) -> Self {
        Self {
            block_id: BlockId::default(),
            nr_stations,
            samples_per_station,
            bytes_per_sample,
            samples: vec![0u8; nr_stations * samples_per_station * bytes_per_sample],
            metadata: vec![SubbandMetaData::default(); nr_stations],
        }
    }

    pub fn station_bytes(&self) -> usize {
        self.samples_per_station * self.bytes_per_sample
    }

    pub fn station(&self, station: usize) -> &[u8] {
        let len = self.station_bytes();
        &self.samples[station * len..(station + 1) * len]
    }

    pub fn station_mut(&mut self, station: usize) -> &mut [u8] {
        let len = self.station_bytes();
        &mut self.samples[station * len..(station + 1) * len]
    }

    pub fn total_flagged(&self) -> u64 {
        self.metadata.iter().map(SubbandMetaData::nr_flagged).sum()
    }
}

/// Kernel chain result for one subband of one block.
#[derive(Debug, Clone)]
pub struct SubbandOutput {
    pub block_id: BlockId,
    pub metadata: Vec<SubbandMetaData>,
    pub data: Vec<u8>,
}

impl SubbandOutput {
    pub fn new(nr_stations: usize, payload_bytes: usize) -> Self {
        Self {
            block_id: BlockId::default(),
            metadata: vec![SubbandMetaData::default(); nr_stations],
            data: vec![0u8; payload_bytes],
        }
    }

    pub fn total_flagged(&self) -> u64 {
        self.metadata.iter().map(SubbandMetaData::nr_flagged).sum()
    }
}
