use super::SparseSet;
use serde::{Deserialize, Serialize};

pub const NR_POLARIZATIONS: usize = 2;

/// Geometric delay of one station at one instant, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StationDelay {
    pub polarizations: [f64; NR_POLARIZATIONS],
    /// Delay of the station beam (pointing centre) itself.
    pub beam: f64,
}

impl StationDelay {
    pub fn uniform(seconds: f64) -> Self {
        Self {
            polarizations: [seconds; NR_POLARIZATIONS],
            beam: seconds,
        }
    }

    pub fn mean(&self) -> f64 {
        self.polarizations.iter().sum::<f64>() / NR_POLARIZATIONS as f64
    }
}

/// Delays valid for exactly one block: at its first sample and just after its last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayPair {
    pub at_begin: [f64; NR_POLARIZATIONS],
    pub after_end: [f64; NR_POLARIZATIONS],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeamDelay {
    pub at_begin: f64,
    pub after_end: f64,
}

/// Per-subband, per-station annotation of one block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubbandMetaData {
    /// Flagged (missing or lost) samples, relative to the first sample of the
    /// read window (history included).
    pub flags: SparseSet,
    /// Residual delays left after the coarse integer-sample shift.
    pub delays: DelayPair,
    pub station_beam: BeamDelay,
    /// Coarse shift, in samples, applied when reading this block.
    pub read_offset: i64,
}

impl SubbandMetaData {
    pub fn nr_flagged(&self) -> u64 {
        self.flags.count()
    }
}
