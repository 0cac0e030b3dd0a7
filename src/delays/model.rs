use crate::core::{StationDelay, NR_POLARIZATIONS};
use serde::{Deserialize, Serialize};

/// Source of geometric delays, one [`StationDelay`] per station at a given
/// time (seconds since the start of the observation).
pub trait DelayModel: Send + Sync {
    fn nr_stations(&self) -> usize;

    fn delays_at(&self, seconds: f64, out: &mut [StationDelay]);
}

/// Delay of one station as a straight line in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearDelay {
    /// Delay at t = 0, in seconds.
    pub offset: f64,
    /// Change of delay per second.
    pub rate: f64,
    /// Extra delay of the second polarisation.
    pub polarization_skew: f64,
    /// Delay of the station beam relative to the station delay.
    pub beam_offset: f64,
}

impl LinearDelay {
    pub fn constant(offset: f64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn at(&self, seconds: f64) -> StationDelay {
        let base = self.offset + self.rate * seconds;
        let mut polarizations = [base; NR_POLARIZATIONS];
        polarizations[NR_POLARIZATIONS - 1] += self.polarization_skew;
        StationDelay {
            polarizations,
            beam: base + self.beam_offset,
        }
    }
}

/// Stand-in for an astrometric delay model: every station drifts linearly.
#[derive(Debug, Clone, Default)]
pub struct LinearDelayModel {
    stations: Vec<LinearDelay>,
}

impl LinearDelayModel {
    pub fn new(stations: Vec<LinearDelay>) -> Self {
        Self { stations }
    }

    /// All delays zero.
    pub fn zero(nr_stations: usize) -> Self {
        Self::new(vec![LinearDelay::default(); nr_stations])
    }
}

impl DelayModel for LinearDelayModel {
    fn nr_stations(&self) -> usize {
        self.stations.len()
    }

    fn delays_at(&self, seconds: f64, out: &mut [StationDelay]) {
        for (delay, station) in out.iter_mut().zip(&self.stations) {
            *delay = station.at(seconds);
        }
    }
}

/// Delays of all stations for one block: at its first sample and just after
/// its last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelaySet {
    pub block: u64,
    pub at_begin: Vec<StationDelay>,
    pub after_end: Vec<StationDelay>,
}

impl DelaySet {
    pub fn new(nr_stations: usize) -> Self {
        Self {
            block: 0,
            at_begin: vec![StationDelay::default(); nr_stations],
            after_end: vec![StationDelay::default(); nr_stations],
        }
    }

    pub fn nr_stations(&self) -> usize {
        self.at_begin.len()
    }
}
