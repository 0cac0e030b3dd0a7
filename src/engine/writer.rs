use super::work_queue::OutputQueue;
use crate::observability::SubbandMetrics;
use crate::resilience::ResilientStream;
use crate::storage::RecordHeader;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Drains one subband's output queue into its stream.
pub struct SubbandWriter {
    global_subband: u32,
    queue: Arc<OutputQueue>,
    stream: ResilientStream,
    metrics: Arc<SubbandMetrics>,
    payload_bytes: usize,
    next_block: u64,
    log_interval: u64,
}

impl SubbandWriter {
    pub fn new(
        global_subband: u32,
        queue: Arc<OutputQueue>,
        stream: ResilientStream,
        metrics: Arc<SubbandMetrics>,
        payload_bytes: usize,
        first_block: u64,
        log_interval: u64,
    ) -> Self {
        Self {
            global_subband,
            queue,
            stream,
            metrics,
            payload_bytes,
            next_block: first_block,
            log_interval,
        }
    }

    fn record_len(&self) -> u64 {
        (RecordHeader::SIZE + self.payload_bytes) as u64
    }

    /// Write every block until the queue is closed and empty.
    ///
    /// Blocks missing from the sequence (dropped upstream) leave a zeroed
    /// hole of one record each, so record `k` always sits at the same offset.
    pub fn run(mut self) -> Result<()> {
        log::info!(
            "[subband {}] writing to {}",
            self.global_subband,
            self.stream.describe()
        );

        while let Some(output) = self.queue.remove() {
            let block = output.block_id.block;

            if block > self.next_block {
                let missing = block - self.next_block;
                self.stream.skip(missing * self.record_len())?;
            }

            let header = RecordHeader::new(block, self.global_subband, output.total_flagged(), output.data.len())
                .with_context(|| {
                    format!(
                        "[subband {}] payload of {} bytes does not fit a record",
                        self.global_subband,
                        output.data.len()
                    )
                })?;
            self.stream.write_block(&header, &output.data)?;
            drop(output);

            self.next_block = block + 1;
            if self.log_interval > 0 && self.next_block % self.log_interval == 0 {
                self.log_summary();
            }
        }

        self.stream.flush()?;
        self.log_summary();
        Ok(())
    }

    fn log_summary(&self) {
        let dropped = self.metrics.dropped();
        if dropped > 0 {
            log::warn!(
                "[subband {}] forwarded {} blocks, dropped {} blocks, written {}",
                self.global_subband,
                self.metrics.forwarded(),
                dropped,
                self.metrics.written()
            );
        } else {
            log::info!(
                "[subband {}] forwarded {} blocks, dropped 0 blocks, written {}",
                self.global_subband,
                self.metrics.forwarded(),
                self.metrics.written()
            );
        }
    }
}
