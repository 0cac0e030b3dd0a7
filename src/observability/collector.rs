use super::{QueueMetrics, SubbandMetrics};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubbandSnapshot {
    pub subband: u32,
    pub forwarded: u64,
    pub dropped: u64,
    pub written: u64,
    pub bytes_written: u64,
    pub flagged_blocks: u64,
    pub sink_failures: u64,
    pub avg_write_latency_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue: usize,
    pub processed: u64,
    pub output_pool_drops: u64,
    pub flagged_samples: u64,
    pub avg_latency_us: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub subbands: BTreeMap<u32, SubbandSnapshot>,
    pub queues: BTreeMap<usize, QueueSnapshot>,
}

impl MetricsSnapshot {
    pub fn total_forwarded(&self) -> u64 {
        self.subbands.values().map(|s| s.forwarded).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.subbands.values().map(|s| s.dropped).sum()
    }

    pub fn total_written(&self) -> u64 {
        self.subbands.values().map(|s| s.written).sum()
    }
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    subbands: BTreeMap<u32, Arc<SubbandMetrics>>,
    queues: BTreeMap<usize, Arc<QueueMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_subband(&mut self, metrics: Arc<SubbandMetrics>) {
        self.subbands.insert(metrics.subband(), metrics);
    }

    pub fn register_queue(&mut self, metrics: Arc<QueueMetrics>) {
        self.queues.insert(metrics.queue(), metrics);
    }

    pub fn subband(&self, subband: u32) -> Option<Arc<SubbandMetrics>> {
        self.subbands.get(&subband).cloned()
    }

    pub fn queue(&self, queue: usize) -> Option<Arc<QueueMetrics>> {
        self.queues.get(&queue).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let subbands = self
            .subbands
            .iter()
            .map(|(&id, m)| {
                (
                    id,
                    SubbandSnapshot {
                        subband: id,
                        forwarded: m.forwarded(),
                        dropped: m.dropped(),
                        written: m.written(),
                        bytes_written: m.bytes_written(),
                        flagged_blocks: m.flagged_blocks(),
                        sink_failures: m.sink_failures(),
                        avg_write_latency_us: m.avg_write_latency_us(),
                    },
                )
            })
            .collect();

        let queues = self
            .queues
            .iter()
            .map(|(&id, m)| {
                (
                    id,
                    QueueSnapshot {
                        queue: id,
                        processed: m.processed(),
                        output_pool_drops: m.output_pool_drops(),
                        flagged_samples: m.flagged_samples(),
                        avg_latency_us: m.avg_latency_us(),
                    },
                )
            })
            .collect();

        MetricsSnapshot { subbands, queues }
    }
}
