use super::MetricsCollector;

pub struct PipelineMonitor {
    collector: MetricsCollector,
}

impl PipelineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.subbands.is_empty() && snapshot.queues.is_empty() {
            return "No subbands registered".to_string();
        }

        let mut report = String::from("=== Pipeline Metrics ===\n");

        for (queue, m) in &snapshot.queues {
            report.push_str(&format!(
                "\n[queue {}]\n  Processed: {} blocks\n  Output pool drops: {}\n  Flagged samples: {}\n  Avg Latency: {}μs\n",
                queue, m.processed, m.output_pool_drops, m.flagged_samples, m.avg_latency_us
            ));
        }

        for (subband, m) in &snapshot.subbands {
            report.push_str(&format!(
                "\n[subband {}]\n  Forwarded: {} blocks\n  Dropped: {}\n  Written: {} ({} bytes)\n  Flagged blocks: {}\n  Sink: {}\n",
                subband,
                m.forwarded,
                if m.dropped > 0 {
                    format!("{} block{}", m.dropped, if m.dropped == 1 { "" } else { "s" })
                } else {
                    "0 blocks".to_string()
                },
                m.written,
                m.bytes_written,
                m.flagged_blocks,
                if m.sink_failures > 0 { "failed, output discarded" } else { "ok" }
            ));
        }

        report.push_str(&format!(
            "\nTotal: {} forwarded, {} dropped\n",
            snapshot.total_forwarded(),
            snapshot.total_dropped()
        ));

        report
    }

    /// One log line per subband with forwarded/dropped counts.
    pub fn log_summary(&self) {
        for (subband, m) in self.collector.snapshot().subbands {
            if m.dropped > 0 {
                log::warn!(
                    "[subband {}] forwarded {} blocks, dropped {} blocks",
                    subband,
                    m.forwarded,
                    m.dropped
                );
            } else {
                log::info!("[subband {}] forwarded {} blocks, dropped 0 blocks", subband, m.forwarded);
            }
        }
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
