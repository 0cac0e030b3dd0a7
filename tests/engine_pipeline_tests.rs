use stationflow::buffers::RingSampleBuffer;
use stationflow::config::StationConfig;
use stationflow::core::TimeStamp;
use stationflow::engine::{Pipeline, PipelineState};
use stationflow::error::StreamError;
use stationflow::gpu::StationPower;
use stationflow::storage::{parse_records, MemoryStream, MemoryStreams, OutputStream, RecordHeader, StreamFactory};
use stationflow::PipelineConfig;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SUBBANDS: [u32; 3] = [10, 11, 12];
const BLOCKS: u64 = 1000;
// two stations, 8 bytes of power result each
const RECORD_LEN: usize = RecordHeader::SIZE + 2 * 8;

fn config(realtime: bool) -> PipelineConfig {
    PipelineConfig {
        stations: vec![StationConfig::new("CS001", "HBA0"), StationConfig::new("CS002", "HBA0")],
        subbands: SUBBANDS.to_vec(),
        block_size: 64,
        fir_taps: 2,
        channels_per_subband: 16,
        sample_bits: 8,
        max_delay_samples: 8,
        packet_samples: 16,
        start_time: 64,
        nr_work_queues: 2,
        nr_subbands_per_subband_proc: 4,
        best_effort_capacity: 8,
        realtime,
        read_timeout_ms: 50,
        nr_blocks: Some(BLOCKS),
        log_interval_blocks: 0,
        ..PipelineConfig::default()
    }
}

/// Everything the pipeline reads for `BLOCKS` blocks, with room for delays.
fn feed_end(config: &PipelineConfig) -> u64 {
    config.geometry().end(BLOCKS - 1).0 + config.max_delay_samples + config.packet_samples
}

/// Write packets `[0, end)` to `ring`, leaving out the packet starting at `hole`.
fn feed(ring: Arc<RingSampleBuffer>, packet_samples: u64, end: u64, hole: Option<u64>) -> JoinHandle<()> {
    thread::spawn(move || {
        let frame = ring.nr_subbands() * ring.bytes_per_sample();
        let payload = vec![1u8; packet_samples as usize * frame];
        let mut timestamp = 0;
        while timestamp < end {
            if hole != Some(timestamp) {
                ring.write(TimeStamp(timestamp), &payload).unwrap();
            }
            timestamp += packet_samples;
        }
        ring.no_more_data();
    })
}

fn feed_all(pipeline: &Pipeline, hole: Option<(usize, u64)>) -> Vec<JoinHandle<()>> {
    let end = feed_end(pipeline.config());
    let packet = pipeline.config().packet_samples;
    pipeline
        .rings()
        .iter()
        .enumerate()
        .map(|(station, ring)| {
            let hole = hole.filter(|&(s, _)| s == station).map(|(_, t)| t);
            feed(ring.clone(), packet, end, hole)
        })
        .collect()
}

fn blocks_written(stream: &MemoryStream) -> Vec<RecordHeader> {
    parse_records(&stream.contents(), RECORD_LEN)
}

#[test]
fn test_deterministic_run_writes_every_block_in_order() {
    let streams = Arc::new(MemoryStreams::new());
    let mut pipeline = Pipeline::builder(config(false)).streams(streams.clone()).build().unwrap();
    pipeline.start().unwrap();

    let feeders = feed_all(&pipeline, None);
    let snapshot = pipeline.join().unwrap();
    for feeder in feeders {
        feeder.join().unwrap();
    }

    assert!(matches!(
        pipeline.state(),
        PipelineState::Completed { total_blocks: BLOCKS, .. }
    ));

    for subband in SUBBANDS {
        let stats = &snapshot.subbands[&subband];
        assert_eq!(stats.forwarded, BLOCKS, "subband {}", subband);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.written, BLOCKS);
        assert_eq!(stats.flagged_blocks, 0);

        let records = blocks_written(&streams.stream(subband));
        assert_eq!(records.len(), BLOCKS as usize);
        for (expected, record) in records.iter().enumerate() {
            assert_eq!(record.block, expected as u64);
            assert_eq!(record.subband, subband);
            assert_eq!(record.nr_flagged, 0);
        }
    }

    // every pooled object is back where it started
    for queue in pipeline.work_queues() {
        assert_eq!(queue.inputs().free().len(), queue.inputs().capacity());
        assert_eq!(queue.outputs().free().len(), queue.outputs().capacity());
    }
    let processed: u64 = snapshot.queues.values().map(|q| q.processed).sum();
    assert_eq!(processed, BLOCKS * SUBBANDS.len() as u64);
}

#[test]
fn test_lost_packet_is_flagged_in_metadata() {
    let streams = Arc::new(MemoryStreams::new());
    let mut pipeline = Pipeline::builder(config(false)).streams(streams.clone()).build().unwrap();
    pipeline.start().unwrap();

    // Block 10 covers [704, 768) after 16 history samples; station 1 loses [704, 720).
    let feeders = feed_all(&pipeline, Some((1, 704)));
    let snapshot = pipeline.join().unwrap();
    for feeder in feeders {
        feeder.join().unwrap();
    }

    for subband in SUBBANDS {
        assert_eq!(snapshot.subbands[&subband].flagged_blocks, 1);
        assert_eq!(snapshot.subbands[&subband].forwarded, BLOCKS);

        let contents = streams.stream(subband).contents();
        let records = parse_records(&contents, RECORD_LEN);
        let flagged: Vec<_> = records.iter().filter(|r| r.nr_flagged > 0).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].block, 10);
        assert_eq!(flagged[0].nr_flagged, 16);

        let payload = &contents[10 * RECORD_LEN + RecordHeader::SIZE..11 * RECORD_LEN];
        let powers = StationPower::decode_all(payload);
        assert_eq!(powers[0].unflagged, 64);
        assert_eq!(powers[1].unflagged, 48);
    }

    let flagged_samples: u64 = snapshot.queues.values().map(|q| q.flagged_samples).sum();
    assert_eq!(flagged_samples, 16 * SUBBANDS.len() as u64);
}

/// Records land in memory, each write taking a while.
struct SlowStream {
    inner: MemoryStream,
    delay: Duration,
}

impl OutputStream for SlowStream {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        thread::sleep(self.delay);
        self.inner.write(data)
    }

    fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        self.inner.skip(bytes)
    }

    fn describe(&self) -> String {
        "slow memory".to_string()
    }
}

struct SlowStreams {
    streams: MemoryStreams,
    delay: Duration,
}

impl StreamFactory for SlowStreams {
    fn open(&self, subband: u32) -> Result<Box<dyn OutputStream>, StreamError> {
        Ok(Box::new(SlowStream {
            inner: self.streams.stream(subband),
            delay: self.delay,
        }))
    }
}

#[test]
fn test_realtime_run_drops_instead_of_stalling() {
    let factory = Arc::new(SlowStreams {
        streams: MemoryStreams::new(),
        delay: Duration::from_millis(1),
    });
    let config = PipelineConfig {
        best_effort_capacity: 1,
        ..config(true)
    };
    let mut pipeline = Pipeline::builder(config).streams(factory.clone()).build().unwrap();
    pipeline.start().unwrap();

    let feeders = feed_all(&pipeline, None);
    let snapshot = pipeline.join().unwrap();
    for feeder in feeders {
        feeder.join().unwrap();
    }

    assert!(snapshot.total_dropped() > 0);
    for subband in SUBBANDS {
        let stats = &snapshot.subbands[&subband];
        assert_eq!(stats.forwarded + stats.dropped, BLOCKS, "subband {}", subband);
        assert_eq!(stats.written, stats.forwarded);

        let records = blocks_written(&factory.streams.stream(subband));
        assert_eq!(records.len() as u64, stats.written);
        assert!(records.windows(2).all(|pair| pair[0].block < pair[1].block));
    }
}

/// Keeps the first `records` records, then fails every write.
struct BreaksAfter {
    inner: MemoryStream,
    writes_left: usize,
}

impl OutputStream for BreaksAfter {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if self.writes_left == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "receiver gone").into());
        }
        self.writes_left -= 1;
        self.inner.write(data)
    }

    fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        self.inner.skip(bytes)
    }

    fn describe(&self) -> String {
        "breaks after a while".to_string()
    }
}

/// Memory streams, except for one subband whose sink breaks mid-run.
struct OneBreaks {
    streams: MemoryStreams,
    broken: u32,
    records: usize,
}

impl StreamFactory for OneBreaks {
    fn open(&self, subband: u32) -> Result<Box<dyn OutputStream>, StreamError> {
        let inner = self.streams.stream(subband);
        if subband == self.broken {
            // header and payload are written separately
            Ok(Box::new(BreaksAfter {
                inner,
                writes_left: 2 * self.records,
            }))
        } else {
            Ok(Box::new(inner))
        }
    }
}

#[test]
fn test_sink_breaking_mid_run_does_not_hold_up_other_subbands() {
    let factory = Arc::new(OneBreaks {
        streams: MemoryStreams::new(),
        broken: 11,
        records: 100,
    });
    let mut pipeline = Pipeline::builder(config(false)).streams(factory.clone()).build().unwrap();
    pipeline.start().unwrap();

    let feeders = feed_all(&pipeline, None);
    let snapshot = pipeline.join().unwrap();
    for feeder in feeders {
        feeder.join().unwrap();
    }

    let broken = &snapshot.subbands[&11];
    assert_eq!(broken.sink_failures, 1);
    assert_eq!(broken.forwarded, BLOCKS);
    assert_eq!(broken.dropped, 0);
    assert_eq!(broken.written, 100);

    let records = blocks_written(&factory.streams.stream(11));
    assert_eq!(records.len(), 100);
    for (expected, record) in records.iter().enumerate() {
        assert_eq!(record.block, expected as u64);
    }

    for subband in [10, 12] {
        assert_eq!(snapshot.subbands[&subband].sink_failures, 0);
        assert_eq!(snapshot.subbands[&subband].written, BLOCKS);
        assert_eq!(blocks_written(&factory.streams.stream(subband)).len(), BLOCKS as usize);
    }
}

#[test]
fn test_overwritten_windows_are_flagged_in_realtime() {
    const RUN: u64 = 20;
    let streams = Arc::new(MemoryStreams::new());
    let config = PipelineConfig {
        nr_blocks: Some(RUN),
        // room for every block, so nothing is dropped
        best_effort_capacity: 32,
        ..config(true)
    };
    let capacity = config.ring_capacity();
    let end = config.geometry().end(RUN - 1).0 + config.max_delay_samples + config.packet_samples;
    let mut pipeline = Pipeline::builder(config).streams(streams.clone()).build().unwrap();

    // The stations run far ahead: only the last `capacity` samples survive.
    for ring in pipeline.rings() {
        feed(ring.clone(), 16, end, None).join().unwrap();
        assert!(ring.head().0 > capacity + 16 * 64);
    }
    let floor = pipeline.rings()[0].oldest_retained().0;

    pipeline.start().unwrap();
    let snapshot = pipeline.join().unwrap();

    for subband in SUBBANDS {
        let stats = &snapshot.subbands[&subband];
        assert_eq!(stats.forwarded, RUN);
        assert_eq!(stats.written, RUN);

        let records = blocks_written(&streams.stream(subband));
        assert_eq!(records.len(), RUN as usize);
        for record in &records {
            // window of block k ends at most 8 delay samples after 64 * (k + 2)
            if 64 * (record.block + 2) + 8 <= floor {
                assert_eq!(record.nr_flagged, 2 * 80, "block {}", record.block);
            }
        }
        assert_eq!(records[RUN as usize - 1].nr_flagged, 0);
        assert!(stats.flagged_blocks >= 16);
    }
}

#[test]
fn test_join_before_start_is_rejected() {
    let mut pipeline = Pipeline::builder(config(false)).build().unwrap();
    assert!(pipeline.join().is_err());
    assert_eq!(pipeline.state(), &PipelineState::Idle);
}

#[test]
fn test_invalid_configuration_fails_build() {
    let config = PipelineConfig {
        ring_capacity_samples: 32,
        ..config(false)
    };
    assert!(Pipeline::builder(config).build().is_err());
}

#[test]
fn test_run_without_block_count_ends_with_input() {
    let streams = Arc::new(MemoryStreams::new());
    let config = PipelineConfig {
        nr_blocks: None,
        ..config(false)
    };
    let mut pipeline = Pipeline::builder(config).streams(streams.clone()).build().unwrap();
    pipeline.start().unwrap();

    // Samples for blocks 0..5 only: [0, 384) covers block 4's window [304, 384).
    let feeders: Vec<_> = pipeline
        .rings()
        .iter()
        .map(|ring| feed(ring.clone(), 16, 384, None))
        .collect();
    for feeder in feeders {
        feeder.join().unwrap();
    }
    let snapshot = pipeline.join().unwrap();

    let written = snapshot.subbands[&10].written;
    assert!(written >= 5, "only {} blocks written", written);
    assert_eq!(pipeline.blocks_dispatched(), written);
}
