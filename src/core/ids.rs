use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one station ring: station name plus antenna field ("CS001", "HBA0").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationId {
    pub name: String,
    pub antenna_field: String,
}

impl StationId {
    pub fn new(name: impl Into<String>, antenna_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            antenna_field: antenna_field.into(),
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.antenna_field)
    }
}

/// Tag carried by every object flowing through the pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    /// Block sequence number, monotonic per run.
    pub block: u64,
    pub global_subband: u32,
    /// Index within the owning work queue's share of subbands.
    pub local_subband: u32,
    /// Index of the work queue (subband processor) handling the block.
    pub subband_proc: u32,
}

impl BlockId {
    pub fn new(block: u64, global_subband: u32, local_subband: u32, subband_proc: u32) -> Self {
        Self {
            block,
            global_subband,
            local_subband,
            subband_proc,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[block {} subband {} (local {} proc {})]",
            self.block, self.global_subband, self.local_subband, self.subband_proc
        )
    }
}
