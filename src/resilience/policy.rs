use serde::{Deserialize, Serialize};

/// What a full best-effort queue does with a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject immediately and hand the item back (real-time runs).
    #[default]
    Drop,

    /// Wait for room (deterministic runs).
    Block,
}

/// What a subband writer does when its output stream fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFailurePolicy {
    /// Replace the stream by a null sink and keep draining.
    #[default]
    SubstituteNull,

    /// Return the error to the writer, which stops.
    Propagate,
}
