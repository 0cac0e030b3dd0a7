//! Delays computed one block ahead of the block reader.
//!
//! A background thread evaluates the delay model at every block boundary and
//! hands the result over a single-slot channel, so it is never more than one
//! boundary ahead. The consumer keeps the boundary it already has: the delay
//! after the end of block `k` is the delay at the start of block `k + 1`, so
//! every boundary is computed once.

use super::{DelayModel, DelaySet};
use crate::core::{BlockGeometry, StationDelay};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, never, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct DelayTrack {
    boundaries: Receiver<(u64, Vec<StationDelay>)>,
    current: Option<(u64, Vec<StationDelay>)>,
    worker: Option<JoinHandle<()>>,
}

impl DelayTrack {
    /// Start computing delays for blocks `first_block..`.
    pub fn start(
        model: Arc<dyn DelayModel>,
        geometry: BlockGeometry,
        sample_rate_hz: f64,
        first_block: u64,
    ) -> Result<Self> {
        let (tx, rx) = bounded(1);
        let nr_stations = model.nr_stations();

        let worker = thread::Builder::new()
            .name("delay-track".to_string())
            .spawn(move || {
                let mut boundary = first_block;
                loop {
                    let seconds = geometry.begin(boundary).since(geometry.start) as f64 / sample_rate_hz;
                    let mut delays = vec![StationDelay::default(); nr_stations];
                    model.delays_at(seconds, &mut delays);
                    if tx.send((boundary, delays)).is_err() {
                        break;
                    }
                    boundary += 1;
                }
                log::debug!("delay track stopped after boundary {}", boundary);
            })
            .map_err(|e| anyhow!("Failed to spawn delay thread: {}", e))?;

        Ok(Self {
            boundaries: rx,
            current: None,
            worker: Some(worker),
        })
    }

    /// Fill `out` with the delays of the next block.
    pub fn get_next_delays(&mut self, out: &mut DelaySet) -> Result<()> {
        let (block, at_begin) = match self.current.take() {
            Some(current) => current,
            None => self.next_boundary()?,
        };
        let (next_block, after_end) = self.next_boundary()?;
        debug_assert_eq!(next_block, block + 1);

        out.block = block;
        out.at_begin.clone_from(&at_begin);
        out.after_end.clone_from(&after_end);

        self.current = Some((next_block, after_end));
        Ok(())
    }

    fn next_boundary(&self) -> Result<(u64, Vec<StationDelay>)> {
        self.boundaries
            .recv()
            .map_err(|_| anyhow!("Delay computation stopped"))
    }
}

impl Drop for DelayTrack {
    fn drop(&mut self) {
        // Disconnect so the worker's next send fails and it exits.
        self.boundaries = never();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
