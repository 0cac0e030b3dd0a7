pub mod buffers;
pub mod config;
pub mod core;
pub mod delays;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod observability;
pub mod resilience;
pub mod storage;
pub mod transport;

pub use config::PipelineConfig;
pub use engine::{ObservationRuntime, Pipeline};
