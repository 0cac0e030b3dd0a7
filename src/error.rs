use thiserror::Error;

/// Fatal configuration problems, reported before any streaming starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("requested {requested} work queues but only {available} GPU queues are available")]
    NotEnoughDevices { requested: usize, available: usize },
    #[error("ring capacity {capacity} samples is smaller than the maximum read span {span}")]
    RingTooSmall { capacity: u64, span: u64 },
    #[error("block size {block_size} is not a multiple of {channels} channels per subband")]
    BlockNotChannelAligned { block_size: u64, channels: u64 },
    #[error("unsupported sample width: {0} bits")]
    SampleBits(u32),
    #[error("station {index} is listed twice: {name}")]
    DuplicateStation { index: usize, name: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Invalid requests against a `RingSampleBuffer`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("read span of {span} samples exceeds ring capacity {capacity}")]
    SpanTooLarge { span: u64, capacity: u64 },
    #[error("empty or inverted read span [{from}, {to})")]
    EmptySpan { from: u64, to: u64 },
    #[error("output buffer holds {actual} bytes, {expected} needed")]
    BufferSize { expected: usize, actual: usize },
    #[error("subband {subband} out of range ({nr_subbands} subbands)")]
    Subband { subband: usize, nr_subbands: usize },
    #[error("packet of {len} bytes is not a whole number of {frame}-byte sample frames")]
    PacketSize { len: usize, frame: usize },
    #[error("packet at {timestamp} with {nr_samples} samples runs past the end of the sample clock")]
    TimestampOverflow { timestamp: u64, nr_samples: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool {0} has been closed")]
    Closed(String),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("output stream failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("output stream for subband {subband} could not be opened: {reason}")]
    Open { subband: u32, reason: String },
}
