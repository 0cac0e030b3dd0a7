//! CPU stand-in for the device kernels: integrates the power of every station.

use super::{KernelChain, KernelFactory};
use crate::core::{SubbandInput, SubbandOutput, NR_POLARIZATIONS};
use anyhow::{bail, Result};
use num_complex::Complex32;
use std::time::Duration;

/// Bytes of one station's result: power (f32 LE) then unflagged samples (u32 LE).
pub const STATION_RESULT_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationPower {
    pub power: f32,
    pub unflagged: u32,
}

impl StationPower {
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STATION_RESULT_BYTES {
            return None;
        }
        Some(Self {
            power: f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            unflagged: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Results of all stations in one output payload.
    pub fn decode_all(payload: &[u8]) -> Vec<Self> {
        payload
            .chunks_exact(STATION_RESULT_BYTES)
            .filter_map(Self::decode)
            .collect()
    }
}

/// Decode one dual-polarisation sample: `[x.re, x.im, y.re, y.im]` as 8 or
/// 16 bit signed integers.
pub fn decode_sample(bytes: &[u8], sample_bits: u32) -> [Complex32; NR_POLARIZATIONS] {
    let value = |i: usize| -> f32 {
        match sample_bits {
            8 => bytes[i] as i8 as f32,
            _ => i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]) as f32,
        }
    };
    [
        Complex32::new(value(0), value(1)),
        Complex32::new(value(2), value(3)),
    ]
}

pub struct PowerKernel {
    name: String,
    sample_bits: u32,
    history: usize,
    delay: Duration,
}

impl PowerKernel {
    pub fn new(queue: usize, sample_bits: u32, history: usize) -> Self {
        Self {
            name: format!("power-{}", queue),
            sample_bits,
            history,
            delay: Duration::ZERO,
        }
    }

    /// Pretend every block takes `delay` of device time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl KernelChain for PowerKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: &SubbandInput, output: &mut SubbandOutput) -> Result<()> {
        let needed = input.nr_stations * STATION_RESULT_BYTES;
        if output.data.len() < needed {
            bail!(
                "{}: output holds {} bytes, {} stations need {}",
                self.name,
                output.data.len(),
                input.nr_stations,
                needed
            );
        }
        if self.history > input.samples_per_station {
            bail!("{}: history exceeds block", self.name);
        }

        let bps = input.bytes_per_sample;
        for station in 0..input.nr_stations {
            // history samples only feed the filter taps
            let samples = &input.station(station)[self.history * bps..];
            let power: f32 = samples
                .chunks_exact(bps)
                .map(|raw| {
                    decode_sample(raw, self.sample_bits)
                        .iter()
                        .map(|c| c.norm_sqr())
                        .sum::<f32>()
                })
                .sum();

            let span = input.samples_per_station as u64;
            let flagged = input.metadata[station]
                .flags
                .subset(self.history as u64, span)
                .count();
            let unflagged = (span - self.history as u64).saturating_sub(flagged) as u32;

            let at = station * STATION_RESULT_BYTES;
            output.data[at..at + 4].copy_from_slice(&power.to_le_bytes());
            output.data[at + 4..at + 8].copy_from_slice(&unflagged.to_le_bytes());
        }

        output.block_id = input.block_id;
        output.metadata.clone_from(&input.metadata);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }
}

/// Creates a `PowerKernel` per work queue, optionally with per-queue device
/// time to make queues finish out of order.
#[derive(Debug, Clone)]
pub struct PowerKernelFactory {
    nr_stations: usize,
    sample_bits: u32,
    history: usize,
    delays: Vec<Duration>,
}

impl PowerKernelFactory {
    pub fn new(nr_stations: usize, sample_bits: u32, history: usize) -> Self {
        Self {
            nr_stations,
            sample_bits,
            history,
            delays: Vec::new(),
        }
    }

    pub fn with_queue_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }
}

impl KernelFactory for PowerKernelFactory {
    fn output_bytes(&self) -> usize {
        self.nr_stations * STATION_RESULT_BYTES
    }

    fn create(&self, queue: usize, device: usize) -> Result<Box<dyn KernelChain>> {
        log::debug!("power kernel for queue {} on device {}", queue, device);
        let delay = self.delays.get(queue).copied().unwrap_or(Duration::ZERO);
        Ok(Box::new(
            PowerKernel::new(queue, self.sample_bits, self.history).with_delay(delay),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockId;

    #[test]
    fn test_decode_sample_widths() {
        let [x, y] = decode_sample(&[1, 0xff, 3, 4], 8);
        assert_eq!(x, Complex32::new(1.0, -1.0));
        assert_eq!(y, Complex32::new(3.0, 4.0));

        let [x, _] = decode_sample(&[0x00, 0x01, 0xfe, 0xff, 0, 0, 0, 0], 16);
        assert_eq!(x, Complex32::new(256.0, -2.0));
    }

    #[test]
    fn test_power_skips_history_and_counts_flags() {
        let mut input = SubbandInput::new(2, 6, 4);
        input.block_id = BlockId::new(7, 1, 0, 0);
        input.station_mut(0).fill(1);
        // station 1: history is loud, block is (3,4) on x only
        for (i, raw) in input.station_mut(1).chunks_exact_mut(4).enumerate() {
            if i < 2 {
                raw.copy_from_slice(&[100, 100, 100, 100]);
            } else {
                raw.copy_from_slice(&[3, 4, 0, 0]);
            }
        }
        input.metadata[1].flags.include(4, 5);

        let mut output = SubbandOutput::new(2, 16);
        let mut kernel = PowerKernel::new(0, 8, 2);
        kernel.process(&input, &mut output).unwrap();

        let results = StationPower::decode_all(&output.data);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].power, 16.0);
        assert_eq!(results[0].unflagged, 4);
        assert_eq!(results[1].power, 100.0);
        assert_eq!(results[1].unflagged, 3);
        assert_eq!(output.block_id, input.block_id);
        assert_eq!(output.total_flagged(), 1);
    }
}
