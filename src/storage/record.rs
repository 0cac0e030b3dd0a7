/// Fixed header in front of every output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub block: u64,
    pub subband: u32,
    pub nr_flagged: u32,
    pub payload_len: u32,
}

impl RecordHeader {
    pub const SIZE: usize = 20;

    /// Header for a record of `payload_len` bytes; `None` if the payload is
    /// too long for the header to describe. The flag count saturates.
    pub fn new(block: u64, subband: u32, nr_flagged: u64, payload_len: usize) -> Option<Self> {
        Some(Self {
            block,
            subband,
            nr_flagged: u32::try_from(nr_flagged).unwrap_or(u32::MAX),
            payload_len: u32::try_from(payload_len).ok()?,
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.block.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.subband.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.nr_flagged.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut block = [0u8; 8];
        block.copy_from_slice(&bytes[0..8]);
        Some(Self {
            block: u64::from_le_bytes(block),
            subband: u32_at(8),
            nr_flagged: u32_at(12),
            payload_len: u32_at(16),
        })
    }

    /// Header plus payload.
    pub fn record_len(&self) -> usize {
        Self::SIZE + self.payload_len as usize
    }
}

/// Walk a stream of records, skipping zero-filled holes left for dropped blocks.
pub fn parse_records(mut bytes: &[u8], record_len: usize) -> Vec<RecordHeader> {
    let mut headers = Vec::new();
    while bytes.len() >= record_len && record_len >= RecordHeader::SIZE {
        let (record, rest) = bytes.split_at(record_len);
        if record.iter().any(|&b| b != 0) {
            if let Some(header) = RecordHeader::decode(record) {
                headers.push(header);
            }
        }
        bytes = rest;
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_must_describe_its_payload() {
        let header = RecordHeader::new(3, 7, u64::MAX, 16).unwrap();
        assert_eq!(header.nr_flagged, u32::MAX);
        assert_eq!(header.record_len(), RecordHeader::SIZE + 16);
        assert_eq!(RecordHeader::decode(&header.encode()), Some(header));

        assert!(RecordHeader::new(3, 7, 0, u32::MAX as usize).is_some());
        assert!(RecordHeader::new(3, 7, 0, u32::MAX as usize + 1).is_none());
    }
}
