use crate::core::TimeStamp;
use crate::error::RingError;
use anyhow::{bail, Result};

/// One station packet: a run of consecutive samples for every subband.
///
/// Wire format: timestamp (u64 LE), sample count (u16 LE), two reserved
/// bytes, then the payload laid out `[subband][sample][bytes_per_sample]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationPacket {
    pub timestamp: TimeStamp,
    pub nr_samples: u16,
    pub payload: Vec<u8>,
}

impl StationPacket {
    pub const HEADER_SIZE: usize = 12;

    pub fn new(timestamp: TimeStamp, nr_samples: u16, payload: Vec<u8>) -> Self {
        Self {
            timestamp,
            nr_samples,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.timestamp.0.to_le_bytes());
        bytes.extend_from_slice(&self.nr_samples.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a datagram for a ring with `nr_subbands` subbands of
    /// `bytes_per_sample`-byte samples.
    pub fn decode(bytes: &[u8], nr_subbands: usize, bytes_per_sample: usize) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            bail!("packet of {} bytes is shorter than its header", bytes.len());
        }
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[0..8]);
        let nr_samples = u16::from_le_bytes([bytes[8], bytes[9]]);

        let payload = &bytes[Self::HEADER_SIZE..];
        let frame = nr_subbands * bytes_per_sample;
        if payload.len() != nr_samples as usize * frame {
            return Err(RingError::PacketSize {
                len: payload.len(),
                frame,
            }
            .into());
        }

        Ok(Self {
            timestamp: TimeStamp(u64::from_le_bytes(timestamp)),
            nr_samples,
            payload: payload.to_vec(),
        })
    }
}
