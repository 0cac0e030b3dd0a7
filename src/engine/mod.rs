pub mod block_reader;
pub mod pipeline;
pub mod runtime;
pub mod sequencer;
pub mod state;
pub mod watchdog;
pub mod work_queue;
pub mod writer;

pub use block_reader::{BlockRead, BlockReader};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use runtime::{IngestStats, ObservationRuntime, RuntimeStatus};
pub use sequencer::{OrderBarrier, Sequencer};
pub use state::PipelineState;
pub use watchdog::Watchdog;
pub use work_queue::{OutputQueue, WorkQueue, WorkQueueLayout};
pub use writer::SubbandWriter;
