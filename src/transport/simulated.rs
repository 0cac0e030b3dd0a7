use super::{StationPacket, StationSource};
use crate::core::{StationId, TimeStamp};
use anyhow::Result;
use async_trait::async_trait;
use std::f64::consts::PI;
use std::time::Duration;

/// Station that synthesises a tone per subband.
pub struct SimulatedStation {
    station: StationId,
    nr_subbands: usize,
    sample_bits: u32,
    packet_samples: u16,
    amplitude: f64,
    next: TimeStamp,
    end: Option<TimeStamp>,
    lose_every: Option<u64>,
    pace: Option<Duration>,
    packets: u64,
}

impl SimulatedStation {
    pub fn new(station: StationId, nr_subbands: usize, sample_bits: u32, packet_samples: u16) -> Self {
        Self {
            station,
            nr_subbands,
            sample_bits,
            packet_samples,
            amplitude: 16.0,
            next: TimeStamp::ZERO,
            end: None,
            lose_every: None,
            pace: None,
            packets: 0,
        }
    }

    /// Produce samples for `[start, end)` only.
    pub fn with_span(mut self, start: TimeStamp, end: Option<TimeStamp>) -> Self {
        self.next = start;
        self.end = end;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Leave out every `n`-th packet, as if lost on the network.
    pub fn with_loss(mut self, every: Option<u64>) -> Self {
        self.lose_every = every.filter(|&n| n > 0);
        self
    }

    /// Emit packets at `sample_rate_hz` instead of as fast as possible.
    pub fn paced(mut self, sample_rate_hz: f64) -> Self {
        self.pace = Some(Duration::from_secs_f64(self.packet_samples as f64 / sample_rate_hz));
        self
    }

    fn bytes_per_sample(&self) -> usize {
        4 * (self.sample_bits as usize / 8)
    }

    fn fill(&self, timestamp: TimeStamp, nr_samples: usize) -> Vec<u8> {
        let bps = self.bytes_per_sample();
        let mut payload = Vec::with_capacity(self.nr_subbands * nr_samples * bps);
        for subband in 0..self.nr_subbands {
            let step = 2.0 * PI * (subband + 1) as f64 / 64.0;
            for i in 0..nr_samples {
                let phase = step * (timestamp.0 + i as u64) as f64;
                let re = self.amplitude * phase.cos();
                let im = self.amplitude * phase.sin();
                // same signal on both polarisations
                for value in [re, im, re, im] {
                    match self.sample_bits {
                        8 => payload.push(value.round().clamp(-128.0, 127.0) as i8 as u8),
                        _ => payload.extend_from_slice(
                            &(value.round().clamp(-32768.0, 32767.0) as i16).to_le_bytes(),
                        ),
                    }
                }
            }
        }
        payload
    }
}

#[async_trait]
impl StationSource for SimulatedStation {
    fn station(&self) -> &StationId {
        &self.station
    }

    async fn next_packet(&mut self) -> Result<Option<StationPacket>> {
        loop {
            let timestamp = self.next;
            let mut nr_samples = self.packet_samples as u64;
            if let Some(end) = self.end {
                if timestamp >= end {
                    return Ok(None);
                }
                nr_samples = nr_samples.min(end.since(timestamp));
            }

            self.next += nr_samples;
            self.packets += 1;

            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }

            if matches!(self.lose_every, Some(n) if self.packets % n == 0) {
                continue;
            }

            let payload = self.fill(timestamp, nr_samples as usize);
            return Ok(Some(StationPacket::new(timestamp, nr_samples as u16, payload)));
        }
    }
}
