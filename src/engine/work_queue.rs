use super::Sequencer;
use crate::buffers::{BestEffortQueue, Pool, PoolEntry};
use crate::core::{SubbandInput, SubbandOutput};
use crate::gpu::KernelChain;
use crate::observability::{QueueMetrics, SubbandMetrics};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

pub type OutputQueue = BestEffortQueue<PoolEntry<SubbandOutput>>;

/// Shape of the objects a work queue preallocates.
#[derive(Debug, Clone, Copy)]
pub struct WorkQueueLayout {
    /// Objects per pool.
    pub capacity: usize,
    pub nr_stations: usize,
    pub samples_per_station: usize,
    pub bytes_per_sample: usize,
    pub output_bytes: usize,
}

/// One compute context: an input pool feeding its kernel chain and an output
/// pool feeding its post-processor.
pub struct WorkQueue {
    index: usize,
    inputs: Pool<SubbandInput>,
    outputs: Pool<SubbandOutput>,
    metrics: Arc<QueueMetrics>,
}

impl WorkQueue {
    pub fn new(index: usize, layout: WorkQueueLayout) -> Self {
        let inputs = Pool::new(format!("queue-{}-input", index), layout.capacity, || {
            SubbandInput::new(layout.nr_stations, layout.samples_per_station, layout.bytes_per_sample)
        });
        let outputs = Pool::new(format!("queue-{}-output", index), layout.capacity, || {
            SubbandOutput::new(layout.nr_stations, layout.output_bytes)
        });

        Self {
            index,
            inputs,
            outputs,
            metrics: Arc::new(QueueMetrics::new(index)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn inputs(&self) -> &Pool<SubbandInput> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Pool<SubbandOutput> {
        &self.outputs
    }

    pub fn metrics(&self) -> Arc<QueueMetrics> {
        self.metrics.clone()
    }

    /// Worker loop: run every filled input through `kernel` until the input
    /// pool signals end-of-stream, then pass end-of-stream on.
    ///
    /// With `output_timeout` set, a block that cannot get an output buffer in
    /// time is dropped and skipped in its subband's order barrier. A kernel
    /// failure drops only the block it happened on.
    pub fn process(
        &self,
        kernel: &mut dyn KernelChain,
        output_timeout: Option<Duration>,
        sequencer: &Sequencer,
        subbands: &[Arc<SubbandMetrics>],
    ) -> Result<()> {
        while let Some(input) = self.inputs.filled().remove() {
            let id = input.block_id;
            let subband = id.local_subband as usize;

            let output = match output_timeout {
                Some(timeout) => self.outputs.free().remove_timeout(timeout),
                None => Some(self.outputs.free().remove()?),
            };

            let Some(mut output) = output else {
                log::warn!("queue {}: no free output buffer for {}, dropping it", self.index, id);
                self.metrics.record_output_pool_drop();
                subbands[subband].record_dropped();
                sequencer.barrier(subband).skip(id.block);
                continue;
            };

            let start = self.metrics.start_processing();
            if let Err(e) = kernel.process(&input, &mut output) {
                log::error!("queue {}: {} failed on {}: {}", self.index, kernel.name(), id, e);
                subbands[subband].record_dropped();
                sequencer.barrier(subband).skip(id.block);
                continue;
            }
            self.metrics.finish_processing(start);
            self.metrics.record_processed();
            self.metrics.record_flagged_samples(input.total_flagged());

            // hand the input back before queueing the result
            drop(input);
            output.block_id = id;
            self.outputs.filled().append(output)?;
        }

        log::debug!("queue {}: input stream ended", self.index);
        self.outputs.filled().no_more();
        Ok(())
    }

    /// Post-processing loop: bring outputs back into order per subband and
    /// offer them to the subband writers, until the output pool signals
    /// end-of-stream.
    pub fn forward_outputs(
        &self,
        sequencer: &Sequencer,
        writers: &[Arc<OutputQueue>],
        subbands: &[Arc<SubbandMetrics>],
    ) {
        while let Some(output) = self.outputs.filled().remove() {
            let id = output.block_id;
            let subband = id.local_subband as usize;
            let barrier = sequencer.barrier(subband);
            let metrics = &subbands[subband];

            if !barrier.wait_for(id.block) {
                log::warn!("queue {}: {} arrived after its turn, dropping it", self.index, id);
                metrics.record_dropped();
                continue;
            }

            if output.total_flagged() > 0 {
                metrics.record_flagged();
            }

            match writers[subband].append(output) {
                Ok(()) => metrics.record_forwarded(),
                Err(output) => {
                    log::debug!("queue {}: writer queue full, dropping {}", self.index, id);
                    output.recycle();
                    metrics.record_dropped();
                }
            }

            barrier.advance_to(id.block + 1);
        }
        log::debug!("queue {}: output stream ended", self.index);
    }
}
