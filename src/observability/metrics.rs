use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one subband's path from the order barrier to storage.
pub struct SubbandMetrics {
    subband: u32,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    bytes_written: AtomicU64,
    flagged_blocks: AtomicU64,
    sink_failures: AtomicU64,
    total_write_latency_us: AtomicU64,
    write_samples: AtomicU64,
}

impl SubbandMetrics {
    pub fn new(subband: u32) -> Self {
        Self {
            subband,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            flagged_blocks: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            total_write_latency_us: AtomicU64::new(0),
            write_samples: AtomicU64::new(0),
        }
    }

    pub fn subband(&self) -> u32 {
        self.subband
    }

    /// Blocks handed to the writer's queue.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Blocks the writer pushed into its stream (a null sink included).
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Blocks carrying at least one flagged sample.
    pub fn flagged_blocks(&self) -> u64 {
        self.flagged_blocks.load(Ordering::Relaxed)
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flagged(&self) {
        self.flagged_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self, bytes: usize) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_write(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_write(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_write_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.write_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_write_latency_us(&self) -> u64 {
        let samples = self.write_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_write_latency_us.load(Ordering::Relaxed) / samples
    }
}

/// Counters for one work queue (GPU context).
pub struct QueueMetrics {
    queue: usize,
    processed: AtomicU64,
    output_pool_drops: AtomicU64,
    flagged_samples: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl QueueMetrics {
    pub fn new(queue: usize) -> Self {
        Self {
            queue,
            processed: AtomicU64::new(0),
            output_pool_drops: AtomicU64::new(0),
            flagged_samples: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> usize {
        self.queue
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Blocks abandoned because no output buffer became free in time.
    pub fn output_pool_drops(&self) -> u64 {
        self.output_pool_drops.load(Ordering::Relaxed)
    }

    pub fn flagged_samples(&self) -> u64 {
        self.flagged_samples.load(Ordering::Relaxed)
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_output_pool_drop(&self) {
        self.output_pool_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flagged_samples(&self, samples: u64) {
        self.flagged_samples.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}
