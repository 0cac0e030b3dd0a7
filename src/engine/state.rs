use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline execution states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Initializing { progress: u8 }, // 0-100
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
    },
    /// Input has ended; queued blocks are still being written.
    Draining {
        #[serde(skip)]
        start_time: Option<Instant>,
        blocks_dispatched: u64,
    },
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
        total_blocks: u64,
    },
    Error {
        error_msg: String,
        recoverable: bool,
    },
}

impl PipelineState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Initializing { .. }) |
            (Initializing { .. }, Initializing { .. }) |
            (Initializing { .. }, Running { .. }) |
            (Initializing { .. }, Error { .. }) |
            (Running { .. }, Draining { .. }) |
            (Running { .. }, Error { .. }) |
            (Draining { .. }, Completed { .. }) |
            (Draining { .. }, Error { .. }) |
            (Completed { .. }, Idle) |
            (Error { recoverable: true, .. }, Idle)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing { .. } => "Initializing",
            Self::Running { .. } => "Running",
            Self::Draining { .. } => "Draining",
            Self::Completed { .. } => "Completed",
            Self::Error { .. } => "Error",
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Idle
    }
}
