use super::DelaySet;
use crate::core::{BeamDelay, DelayPair, SparseSet, StationDelay, SubbandMetaData, NR_POLARIZATIONS};

/// Read offset, in samples, that compensates the integer part of a station's
/// delay over one block.
///
/// The delay is interpolated to the middle of the block. A positive delay
/// means the station's signal has to be delayed, so its block is read that
/// many samples earlier. The result is clamped to `±max_offset`.
pub fn coarse_offset(
    at_begin: &StationDelay,
    after_end: &StationDelay,
    sample_rate_hz: f64,
    max_offset: u64,
) -> i64 {
    let mid = (at_begin.mean() + after_end.mean()) / 2.0;
    let limit = max_offset as f64;
    let samples = (mid * sample_rate_hz).round().clamp(-limit, limit);
    -(samples as i64)
}

/// Fill block metadata and read offsets for every subband and station.
///
/// `out_meta` and `out_offsets` are indexed `[subband * nr_stations + station]`.
/// `station_flags` holds flags already known before reading (e.g. a station
/// switched off), relative to the read window; it may be empty.
///
/// Does no I/O and reuses the flag storage already present in `out_meta`.
pub fn generate_metadata(
    delays: &DelaySet,
    sample_rate_hz: f64,
    max_offset: u64,
    station_flags: &[SparseSet],
    out_meta: &mut [SubbandMetaData],
    out_offsets: &mut [i64],
) {
    let nr_stations = delays.nr_stations();
    debug_assert_eq!(out_meta.len(), out_offsets.len());
    if nr_stations == 0 {
        return;
    }
    debug_assert_eq!(out_meta.len() % nr_stations, 0);

    for station in 0..nr_stations {
        let begin = &delays.at_begin[station];
        let end = &delays.after_end[station];
        let offset = coarse_offset(begin, end, sample_rate_hz, max_offset);
        let compensated = offset as f64 / sample_rate_hz;

        let mut pair = DelayPair::default();
        for pol in 0..NR_POLARIZATIONS {
            pair.at_begin[pol] = begin.polarizations[pol] + compensated;
            pair.after_end[pol] = end.polarizations[pol] + compensated;
        }
        let beam = BeamDelay {
            at_begin: begin.beam,
            after_end: end.beam,
        };

        let slots = out_meta
            .iter_mut()
            .zip(out_offsets.iter_mut())
            .skip(station)
            .step_by(nr_stations);
        for (meta, out_offset) in slots {
            match station_flags.get(station) {
                Some(flags) => meta.flags.clone_from(flags),
                None => meta.flags.clear(),
            }
            meta.delays = pair;
            meta.station_beam = beam;
            meta.read_offset = offset;
            *out_offset = offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 200e6 / 1024.0;

    #[test]
    fn test_integer_part_becomes_offset() {
        let samples = 3.4 / RATE;
        let begin = StationDelay::uniform(samples);
        let end = StationDelay::uniform(samples);
        assert_eq!(coarse_offset(&begin, &end, RATE, 100), -3);
        assert_eq!(coarse_offset(&begin, &end, RATE, 2), -2);
    }

    #[test]
    fn test_residual_delay_stays_below_one_sample() {
        let mut delays = DelaySet::new(2);
        delays.at_begin[1] = StationDelay::uniform(10.2 / RATE);
        delays.after_end[1] = StationDelay::uniform(10.6 / RATE);

        let mut meta = vec![SubbandMetaData::default(); 4];
        let mut offsets = vec![99; 4];
        generate_metadata(&delays, RATE, 64, &[], &mut meta, &mut offsets);

        // two subbands, two stations
        assert_eq!(offsets, vec![0, -10, 0, -10]);
        let residual = meta[3].delays.at_begin[0] * RATE;
        assert!((residual - 0.2).abs() < 1e-9);
        let residual = meta[3].delays.after_end[1] * RATE;
        assert!((residual - 0.6).abs() < 1e-9);
        assert_eq!(meta[1].read_offset, -10);
    }

    #[test]
    fn test_known_flags_are_copied_per_station() {
        let delays = DelaySet::new(2);
        let flags = vec![SparseSet::new(), SparseSet::from_range(0, 16)];
        let mut meta = vec![SubbandMetaData::default(); 2];
        meta[0].flags.include(1, 2);
        let mut offsets = vec![0; 2];

        generate_metadata(&delays, RATE, 0, &flags, &mut meta, &mut offsets);

        assert!(meta[0].flags.is_empty());
        assert_eq!(meta[1].nr_flagged(), 16);
    }
}
