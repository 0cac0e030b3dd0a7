use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Sample-clock tick. One tick is one subband sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(pub u64);

impl TimeStamp {
    pub const ZERO: TimeStamp = TimeStamp(0);

    pub fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Shift by a signed number of samples, clamping at zero.
    pub fn shifted(self, delta: i64) -> Self {
        if delta >= 0 {
            Self(self.0.saturating_add(delta as u64))
        } else {
            Self(self.0.saturating_sub(delta.unsigned_abs()))
        }
    }

    /// Samples from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: TimeStamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// `None` when the sum does not fit the sample clock.
    pub fn checked_add(self, samples: u64) -> Option<Self> {
        self.0.checked_add(samples).map(Self)
    }
}

/// Saturates at the end of the sample clock.
impl Add<u64> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: u64) -> TimeStamp {
        TimeStamp(self.0.saturating_add(rhs))
    }
}

impl AddAssign<u64> for TimeStamp {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl Sub for TimeStamp {
    type Output = i64;

    fn sub(self, rhs: TimeStamp) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

impl From<u64> for TimeStamp {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_clamps_at_zero() {
        assert_eq!(TimeStamp(10).shifted(-4), TimeStamp(6));
        assert_eq!(TimeStamp(3).shifted(-4), TimeStamp(0));
        assert_eq!(TimeStamp(3).shifted(4), TimeStamp(7));
    }

    #[test]
    fn test_difference_is_signed() {
        assert_eq!(TimeStamp(5) - TimeStamp(8), -3);
        assert_eq!(TimeStamp(8).since(TimeStamp(5)), 3);
        assert_eq!(TimeStamp(5).since(TimeStamp(8)), 0);
    }

    #[test]
    fn test_addition_near_end_of_clock() {
        assert_eq!(TimeStamp(u64::MAX - 2).checked_add(2), Some(TimeStamp(u64::MAX)));
        assert_eq!(TimeStamp(u64::MAX - 2).checked_add(3), None);
        assert_eq!(TimeStamp(u64::MAX - 2) + 8, TimeStamp(u64::MAX));

        let mut timestamp = TimeStamp(u64::MAX);
        timestamp += 1;
        assert_eq!(timestamp, TimeStamp(u64::MAX));
    }
}
