pub mod collector;
pub mod metrics;
pub mod monitor;

pub use collector::{MetricsCollector, MetricsSnapshot, QueueSnapshot, SubbandSnapshot};
pub use metrics::{QueueMetrics, SubbandMetrics};
pub use monitor::PipelineMonitor;
