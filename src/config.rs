//! Run configuration, loaded from JSON and checked before anything starts.

use crate::core::{BlockGeometry, SparseSet, StationId, TimeStamp, NR_POLARIZATIONS};
use crate::delays::{LinearDelay, LinearDelayModel};
use crate::error::ConfigError;
use crate::gpu::DeviceInventory;
use crate::resilience::{OverflowPolicy, SinkFailurePolicy};
use crate::storage::StorageSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Where a station's samples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Simulated {
        #[serde(default = "default_amplitude")]
        amplitude: f64,
        /// Leave out every n-th packet.
        #[serde(default)]
        lose_every: Option<u64>,
        /// Emit packets at the nominal sample rate instead of as fast as possible.
        #[serde(default)]
        paced: bool,
    },
    Udp {
        bind: String,
    },
}

fn default_amplitude() -> f64 {
    16.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulated {
            amplitude: default_amplitude(),
            lose_every: None,
            paced: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    pub antenna_field: String,
    #[serde(default)]
    pub delay: LinearDelay,
    /// Flag all of this station's samples.
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub source: SourceConfig,
}

impl StationConfig {
    pub fn new(name: impl Into<String>, antenna_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            antenna_field: antenna_field.into(),
            delay: LinearDelay::default(),
            flagged: false,
            source: SourceConfig::default(),
        }
    }

    pub fn id(&self) -> StationId {
        StationId::new(self.name.clone(), self.antenna_field.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stations: Vec<StationConfig>,
    /// Global indices of the subbands handled by this pipeline.
    pub subbands: Vec<u32>,
    pub sample_rate_hz: f64,
    /// Samples per block, excluding history.
    pub block_size: u64,
    pub fir_taps: u64,
    pub channels_per_subband: u64,
    pub sample_bits: u32,
    /// Samples per subband kept in each station ring; 0 picks twice the minimum.
    pub ring_capacity_samples: u64,
    /// Largest read offset, in samples, a delay may cause.
    pub max_delay_samples: u64,
    /// Samples per subband in one station packet.
    pub packet_samples: u64,
    pub nr_work_queues: usize,
    /// Objects in each work queue's input and output pool.
    pub nr_subbands_per_subband_proc: usize,
    pub best_effort_capacity: usize,
    /// Drop late data instead of waiting for it.
    pub realtime: bool,
    pub read_timeout_ms: u64,
    pub output_pool_timeout_ms: u64,
    pub start_time: u64,
    /// Stop after this many blocks; otherwise run until every station ends.
    pub nr_blocks: Option<u64>,
    pub deadline_grace_secs: u64,
    pub log_interval_blocks: u64,
    pub storage: StorageSpec,
    pub sink_failure: SinkFailurePolicy,
    pub gpu: DeviceInventory,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            subbands: Vec::new(),
            sample_rate_hz: 200e6 / 1024.0,
            block_size: 4096,
            fir_taps: 16,
            channels_per_subband: 64,
            sample_bits: 16,
            ring_capacity_samples: 0,
            max_delay_samples: 64,
            packet_samples: 16,
            nr_work_queues: 2,
            nr_subbands_per_subband_proc: 4,
            best_effort_capacity: 8,
            realtime: true,
            read_timeout_ms: 1000,
            output_pool_timeout_ms: 100,
            start_time: 0,
            nr_blocks: None,
            deadline_grace_secs: 30,
            log_interval_blocks: 100,
            storage: StorageSpec::default(),
            sink_failure: SinkFailurePolicy::default(),
            gpu: DeviceInventory::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(config: Value) -> Result<Self> {
        serde_json::from_value(config).context("invalid pipeline configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        Self::from_json(value)
    }

    pub fn nr_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn nr_subbands(&self) -> usize {
        self.subbands.len()
    }

    /// Samples in front of each block needed by the channeliser's filter taps.
    pub fn history_samples(&self) -> u64 {
        self.fir_taps.saturating_sub(1).saturating_mul(self.channels_per_subband)
    }

    /// Bytes of one dual-polarisation complex sample.
    pub fn bytes_per_sample(&self) -> usize {
        NR_POLARIZATIONS * 2 * (self.sample_bits as usize / 8)
    }

    pub fn geometry(&self) -> BlockGeometry {
        BlockGeometry::new(TimeStamp(self.start_time), self.block_size, self.history_samples())
    }

    /// Longest span any block read may cover in a ring, delays included.
    pub fn max_read_span(&self) -> u64 {
        self.checked_read_span().unwrap_or(u64::MAX)
    }

    fn checked_read_span(&self) -> Option<u64> {
        self.max_delay_samples
            .checked_mul(2)?
            .checked_add(self.history_samples())?
            .checked_add(self.block_size)
    }

    pub fn ring_capacity(&self) -> u64 {
        self.checked_ring_capacity().unwrap_or(u64::MAX)
    }

    fn checked_ring_capacity(&self) -> Option<u64> {
        if self.ring_capacity_samples == 0 {
            self.checked_read_span()?
                .checked_add(self.packet_samples)?
                .checked_mul(2)
        } else {
            Some(self.ring_capacity_samples)
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.realtime.then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn output_pool_timeout(&self) -> Option<Duration> {
        self.realtime.then(|| Duration::from_millis(self.output_pool_timeout_ms))
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        if self.realtime {
            OverflowPolicy::Drop
        } else {
            OverflowPolicy::Block
        }
    }

    /// Wall-clock length of the observation, if it has a fixed number of blocks.
    pub fn observation_duration(&self) -> Option<Duration> {
        self.nr_blocks.and_then(|blocks| {
            let samples = blocks.saturating_mul(self.block_size);
            Duration::try_from_secs_f64(samples as f64 / self.sample_rate_hz).ok()
        })
    }

    /// Time after which the run is abandoned.
    pub fn deadline(&self) -> Option<Duration> {
        self.observation_duration()?
            .checked_add(Duration::from_secs(self.deadline_grace_secs))
    }

    pub fn delay_model(&self) -> LinearDelayModel {
        LinearDelayModel::new(self.stations.iter().map(|s| s.delay).collect())
    }

    /// Flags known before reading, per station, relative to a read window.
    pub fn station_flags(&self) -> Vec<SparseSet> {
        let span = self.block_size + self.history_samples();
        self.stations
            .iter()
            .map(|s| {
                if s.flagged {
                    SparseSet::from_range(0, span)
                } else {
                    SparseSet::new()
                }
            })
            .collect()
    }

    /// Fatal configuration errors, checked before any thread starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stations.is_empty() {
            return Err(ConfigError::Zero("stations"));
        }
        if self.subbands.is_empty() {
            return Err(ConfigError::Zero("subbands"));
        }
        for (value, name) in [
            (self.block_size, "block_size"),
            (self.fir_taps, "fir_taps"),
            (self.channels_per_subband, "channels_per_subband"),
            (self.packet_samples, "packet_samples"),
            (self.nr_work_queues as u64, "nr_work_queues"),
            (self.nr_subbands_per_subband_proc as u64, "nr_subbands_per_subband_proc"),
            (self.best_effort_capacity as u64, "best_effort_capacity"),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.realtime && self.read_timeout_ms == 0 {
            return Err(ConfigError::Zero("read_timeout_ms"));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sample rate {} Hz",
                self.sample_rate_hz
            )));
        }
        if self.sample_bits != 8 && self.sample_bits != 16 {
            return Err(ConfigError::SampleBits(self.sample_bits));
        }
        if self.block_size % self.channels_per_subband != 0 {
            return Err(ConfigError::BlockNotChannelAligned {
                block_size: self.block_size,
                channels: self.channels_per_subband,
            });
        }
        self.fir_taps
            .checked_sub(1)
            .and_then(|taps| taps.checked_mul(self.channels_per_subband))
            .and_then(|history| history.checked_add(self.block_size))
            .ok_or_else(|| ConfigError::Invalid("history samples overflow".to_string()))?;

        let mut seen = HashSet::new();
        for (index, station) in self.stations.iter().enumerate() {
            if !seen.insert(station.id()) {
                return Err(ConfigError::DuplicateStation {
                    index,
                    name: station.id().to_string(),
                });
            }
        }
        let mut subbands = HashSet::new();
        if let Some(dup) = self.subbands.iter().find(|&&sb| !subbands.insert(sb)) {
            return Err(ConfigError::Invalid(format!("subband {} listed twice", dup)));
        }

        self.gpu.check(self.nr_work_queues)?;

        let span = self
            .checked_read_span()
            .and_then(|span| span.checked_add(self.packet_samples))
            .ok_or_else(|| ConfigError::Invalid("read span overflows the sample clock".to_string()))?;
        let capacity = self
            .checked_ring_capacity()
            .ok_or_else(|| ConfigError::Invalid("ring capacity overflows".to_string()))?;
        if capacity < span {
            return Err(ConfigError::RingTooSmall { capacity, span });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> PipelineConfig {
        PipelineConfig {
            stations: vec![StationConfig::new("CS001", "HBA0")],
            subbands: vec![100],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert_eq!(minimal().validate(), Ok(()));
        assert_eq!(minimal().history_samples(), 15 * 64);
        assert_eq!(minimal().bytes_per_sample(), 8);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = PipelineConfig::from_json(json!({
            "stations": [
                {"name": "CS001", "antenna_field": "HBA0"},
                {"name": "CS002", "antenna_field": "HBA0", "delay": {"offset": 1e-6},
                 "source": {"type": "udp", "bind": "127.0.0.1:4346"}}
            ],
            "subbands": [0, 1, 2],
            "realtime": false,
            "storage": {"type": "file", "directory": "/tmp/out"}
        }))
        .unwrap();

        assert_eq!(config.nr_stations(), 2);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.stations[1].delay.offset, 1e-6);
        assert_eq!(config.overflow_policy(), OverflowPolicy::Block);
        assert!(config.read_timeout().is_none());
        assert!(matches!(config.stations[1].source, SourceConfig::Udp { .. }));
    }

    #[test]
    fn test_ring_must_hold_largest_read() {
        let config = PipelineConfig {
            ring_capacity_samples: 4096,
            ..minimal()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RingTooSmall { capacity: 4096, .. })
        ));
    }

    #[test]
    fn test_huge_delays_are_rejected_not_overflowed() {
        let config = PipelineConfig {
            max_delay_samples: u64::MAX / 2 + 1,
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = PipelineConfig {
            max_delay_samples: u64::MAX / 4,
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.ring_capacity(), u64::MAX);
    }
}
