//! The static thread topology of a run.
//!
//! ```text
//! station rings ─► dispatcher ─► work queue i % N ─► worker ─► post-processor
//!                  (delays,       (input pool)        (kernel)  (order barrier)
//!                   block reads)                                     │
//!                                               subband writer ◄─ best-effort queue
//! ```

use super::block_reader::BlockReader;
use super::state::PipelineState;
use super::work_queue::{OutputQueue, WorkQueue, WorkQueueLayout};
use super::writer::SubbandWriter;
use super::Sequencer;
use crate::buffers::{RingSampleBuffer, SyncLock};
use crate::config::PipelineConfig;
use crate::core::{BlockId, SparseSet, SubbandMetaData};
use crate::delays::{generate_metadata, DelayModel, DelaySet, DelayTrack};
use crate::gpu::{KernelFactory, PowerKernelFactory};
use crate::observability::{MetricsCollector, MetricsSnapshot, PipelineMonitor, SubbandMetrics};
use crate::resilience::ResilientStream;
use crate::storage::StreamFactory;
use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub struct PipelineBuilder {
    config: PipelineConfig,
    delay_model: Option<Arc<dyn DelayModel>>,
    kernels: Option<Arc<dyn KernelFactory>>,
    streams: Option<Arc<dyn StreamFactory>>,
}

impl PipelineBuilder {
    /// Replace the delay model derived from the station configuration.
    pub fn delay_model(mut self, model: Arc<dyn DelayModel>) -> Self {
        self.delay_model = Some(model);
        self
    }

    /// Replace the default `PowerKernel` chains.
    pub fn kernels(mut self, kernels: Arc<dyn KernelFactory>) -> Self {
        self.kernels = Some(kernels);
        self
    }

    /// Replace the storage configured in `storage`.
    pub fn streams(mut self, streams: Arc<dyn StreamFactory>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// Validate the configuration and allocate every ring, pool and queue.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        let delay_model: Arc<dyn DelayModel> = match self.delay_model {
            Some(model) => model,
            None => Arc::new(config.delay_model()),
        };
        if delay_model.nr_stations() != config.nr_stations() {
            bail!(
                "delay model covers {} stations, configuration has {}",
                delay_model.nr_stations(),
                config.nr_stations()
            );
        }

        let kernels: Arc<dyn KernelFactory> = match self.kernels {
            Some(kernels) => kernels,
            None => Arc::new(PowerKernelFactory::new(
                config.nr_stations(),
                config.sample_bits,
                config.history_samples() as usize,
            )),
        };
        let streams: Arc<dyn StreamFactory> = match self.streams {
            Some(streams) => streams,
            None => Arc::new(config.storage.clone()),
        };

        let mut rings = Vec::with_capacity(config.nr_stations());
        for station in &config.stations {
            let ring = RingSampleBuffer::new(
                station.id(),
                config.nr_subbands(),
                config.ring_capacity(),
                config.bytes_per_sample(),
            )?;
            let ring = if config.realtime {
                ring
            } else {
                ring.with_sync_lock(Arc::new(SyncLock::new()))
            };
            rings.push(Arc::new(ring));
        }

        let layout = WorkQueueLayout {
            capacity: config.nr_subbands_per_subband_proc,
            nr_stations: config.nr_stations(),
            samples_per_station: (config.block_size + config.history_samples()) as usize,
            bytes_per_sample: config.bytes_per_sample(),
            output_bytes: kernels.output_bytes(),
        };

        let mut collector = MetricsCollector::new();
        let queues: Vec<Arc<WorkQueue>> = (0..config.nr_work_queues)
            .map(|index| {
                let queue = Arc::new(WorkQueue::new(index, layout));
                collector.register_queue(queue.metrics());
                queue
            })
            .collect();

        let subband_metrics: Vec<Arc<SubbandMetrics>> = config
            .subbands
            .iter()
            .map(|&subband| {
                let metrics = Arc::new(SubbandMetrics::new(subband));
                collector.register_subband(metrics.clone());
                metrics
            })
            .collect();

        let writer_queues = config
            .subbands
            .iter()
            .map(|subband| {
                Arc::new(OutputQueue::new(
                    format!("subband-{}", subband),
                    config.best_effort_capacity,
                    config.overflow_policy(),
                ))
            })
            .collect();

        log::info!(
            "pipeline: {} stations, {} subbands, {} work queues, block {} + {} history samples, {} mode",
            config.nr_stations(),
            config.nr_subbands(),
            config.nr_work_queues,
            config.block_size,
            config.history_samples(),
            if config.realtime { "real-time" } else { "deterministic" }
        );

        Ok(Pipeline {
            sequencer: Arc::new(Sequencer::new(config.nr_subbands(), 0)),
            config,
            rings,
            delay_model,
            kernels,
            streams,
            queues,
            writer_queues,
            subband_metrics,
            collector,
            state: PipelineState::Idle,
            dispatched: Arc::new(AtomicU64::new(0)),
            threads: Threads::default(),
        })
    }
}

#[derive(Default)]
struct Threads {
    dispatcher: Option<JoinHandle<Result<u64>>>,
    workers: Vec<JoinHandle<Result<()>>>,
    post_processors: Vec<JoinHandle<()>>,
    writers: Vec<JoinHandle<Result<()>>>,
}

pub struct Pipeline {
    config: PipelineConfig,
    rings: Vec<Arc<RingSampleBuffer>>,
    delay_model: Arc<dyn DelayModel>,
    kernels: Arc<dyn KernelFactory>,
    streams: Arc<dyn StreamFactory>,
    queues: Vec<Arc<WorkQueue>>,
    sequencer: Arc<Sequencer>,
    writer_queues: Vec<Arc<OutputQueue>>,
    subband_metrics: Vec<Arc<SubbandMetrics>>,
    collector: MetricsCollector,
    state: PipelineState,
    dispatched: Arc<AtomicU64>,
    threads: Threads,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            delay_model: None,
            kernels: None,
            streams: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ring of the station at `index` in the configuration.
    pub fn ring(&self, index: usize) -> Option<Arc<RingSampleBuffer>> {
        self.rings.get(index).cloned()
    }

    pub fn rings(&self) -> &[Arc<RingSampleBuffer>] {
        &self.rings
    }

    pub fn work_queues(&self) -> &[Arc<WorkQueue>] {
        &self.queues
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Get current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn blocks_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(self.collector.clone())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }

    /// Transition to a new state with validation
    fn transition_to(&mut self, new_state: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        log::debug!("pipeline: {} -> {}", self.state.name(), new_state.name());
        self.state = new_state;
        Ok(())
    }

    /// Spawn writers, workers, post-processors and the dispatcher.
    pub fn start(&mut self) -> Result<()> {
        self.transition_to(PipelineState::Initializing { progress: 0 })?;

        match self.spawn_all() {
            Ok(()) => self.transition_to(PipelineState::Running {
                start_time: Some(Instant::now()),
            }),
            Err(e) => {
                // Let anything already running wind down.
                for queue in &self.queues {
                    queue.inputs().filled().no_more();
                }
                for queue in &self.writer_queues {
                    queue.no_more();
                }
                self.state = PipelineState::Error {
                    error_msg: e.to_string(),
                    recoverable: false,
                };
                Err(e)
            }
        }
    }

    fn spawn_all(&mut self) -> Result<()> {
        let payload_bytes = self.kernels.output_bytes();

        for (local, &subband) in self.config.subbands.iter().enumerate() {
            let metrics = self.subband_metrics[local].clone();
            let stream = ResilientStream::open(
                self.streams.as_ref(),
                subband,
                self.config.sink_failure,
                metrics.clone(),
            )?;
            let writer = SubbandWriter::new(
                subband,
                self.writer_queues[local].clone(),
                stream,
                metrics,
                payload_bytes,
                0,
                self.config.log_interval_blocks,
            );
            self.threads
                .writers
                .push(spawn(format!("writer-sb{}", subband), move || writer.run())?);
        }
        self.transition_to(PipelineState::Initializing { progress: 30 })?;

        for queue in &self.queues {
            let device = self.config.gpu.device_for_queue(queue.index());
            let mut kernel = self.kernels.create(queue.index(), device)?;

            let worker_queue = queue.clone();
            let sequencer = self.sequencer.clone();
            let metrics = self.subband_metrics.clone();
            let timeout = self.config.output_pool_timeout();
            self.threads.workers.push(spawn(
                format!("queue-{}-worker", queue.index()),
                move || {
                    let result = worker_queue.process(kernel.as_mut(), timeout, &sequencer, &metrics);
                    if result.is_err() {
                        worker_queue.outputs().filled().no_more();
                    }
                    result
                },
            )?);

            let post_queue = queue.clone();
            let sequencer = self.sequencer.clone();
            let writers = self.writer_queues.clone();
            let metrics = self.subband_metrics.clone();
            self.threads.post_processors.push(spawn(
                format!("queue-{}-post", queue.index()),
                move || post_queue.forward_outputs(&sequencer, &writers, &metrics),
            )?);
        }
        self.transition_to(PipelineState::Initializing { progress: 60 })?;

        // Registers with the rings' sync locks before any station writes.
        let reader = BlockReader::new(
            self.rings.clone(),
            self.config.geometry(),
            self.config.max_delay_samples,
            self.config.read_timeout(),
        );
        let track = DelayTrack::start(
            self.delay_model.clone(),
            self.config.geometry(),
            self.config.sample_rate_hz,
            0,
        )?;
        let dispatcher = Dispatcher {
            reader,
            track,
            queues: self.queues.clone(),
            subbands: self.config.subbands.clone(),
            station_flags: self.config.station_flags(),
            sample_rate_hz: self.config.sample_rate_hz,
            max_offset: self.config.max_delay_samples,
            nr_blocks: self.config.nr_blocks,
            log_interval: self.config.log_interval_blocks,
            dispatched: self.dispatched.clone(),
        };
        self.threads.dispatcher = Some(spawn("dispatch".to_string(), move || dispatcher.run())?);

        Ok(())
    }

    /// Mark every station stream as ended, so a run without a fixed block
    /// count finishes once the rings are drained.
    pub fn end_of_input(&self) {
        for ring in &self.rings {
            ring.no_more_data();
        }
    }

    /// Wait for the run to finish: dispatcher, then workers and
    /// post-processors, then the writers once their queues are closed.
    pub fn join(&mut self) -> Result<MetricsSnapshot> {
        let started = match self.state {
            PipelineState::Running { start_time } => start_time,
            _ => bail!("Pipeline is not running ({})", self.state.name()),
        };

        let mut first_error: Option<anyhow::Error> = None;
        let mut keep = |result: Result<()>| {
            if let Err(e) = result {
                log::error!("pipeline: {:#}", e);
                first_error.get_or_insert(e);
            }
        };

        let blocks = match self.threads.dispatcher.take() {
            Some(handle) => match join_thread("dispatcher", handle) {
                Ok(blocks) => blocks,
                Err(e) => {
                    keep(Err(e));
                    self.blocks_dispatched()
                }
            },
            None => 0,
        };
        self.transition_to(PipelineState::Draining {
            start_time: started,
            blocks_dispatched: blocks,
        })?;

        for handle in self.threads.workers.drain(..) {
            keep(join_thread("worker", handle));
        }
        for handle in self.threads.post_processors.drain(..) {
            keep(handle.join().map_err(|_| anyhow!("post-processor thread panicked")));
        }
        for queue in &self.writer_queues {
            queue.no_more();
        }
        for handle in self.threads.writers.drain(..) {
            keep(join_thread("writer", handle));
        }

        self.monitor().log_summary();

        match first_error {
            Some(e) => {
                self.state = PipelineState::Error {
                    error_msg: e.to_string(),
                    recoverable: false,
                };
                Err(e)
            }
            None => {
                self.transition_to(PipelineState::Completed {
                    duration: started.map(|t| t.elapsed()),
                    total_blocks: blocks,
                })?;
                Ok(self.collector.snapshot())
            }
        }
    }
}

fn spawn<T, F>(name: String, body: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|e| anyhow!("Failed to spawn {}: {}", name, e))
}

fn join_thread<T>(role: &str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{} thread panicked", role))?
}

/// Body of the dispatcher thread.
struct Dispatcher {
    reader: BlockReader,
    track: DelayTrack,
    queues: Vec<Arc<WorkQueue>>,
    subbands: Vec<u32>,
    station_flags: Vec<SparseSet>,
    sample_rate_hz: f64,
    max_offset: u64,
    nr_blocks: Option<u64>,
    log_interval: u64,
    dispatched: Arc<AtomicU64>,
}

impl Dispatcher {
    fn run(mut self) -> Result<u64> {
        let result = self.dispatch();
        for queue in &self.queues {
            queue.inputs().filled().no_more();
        }
        if let Ok(blocks) = &result {
            log::info!("dispatcher: {} blocks dispatched", blocks);
        }
        result
    }

    fn dispatch(&mut self) -> Result<u64> {
        let nr_stations = self.reader.nr_stations();
        let nr_subbands = self.subbands.len();
        let mut delays = DelaySet::new(nr_stations);
        let mut metadata = vec![SubbandMetaData::default(); nr_subbands * nr_stations];
        let mut offsets = vec![0i64; nr_subbands * nr_stations];

        let mut next_queue = 0usize;
        let mut block = 0u64;
        let mut lossy_blocks = 0u64;

        loop {
            match self.nr_blocks {
                Some(nr_blocks) if block >= nr_blocks => break,
                None if self.reader.exhausted(block) => break,
                _ => {}
            }

            self.track.get_next_delays(&mut delays)?;
            generate_metadata(
                &delays,
                self.sample_rate_hz,
                self.max_offset,
                &self.station_flags,
                &mut metadata,
                &mut offsets,
            );
            self.reader.release_before(block);

            let deadline = self.reader.block_deadline();
            let mut lost = 0;
            for local in 0..nr_subbands {
                let queue = &self.queues[next_queue % self.queues.len()];
                next_queue += 1;

                let mut input = queue.inputs().free().remove()?;
                input.block_id = BlockId::new(block, self.subbands[local], local as u32, queue.index() as u32);

                let slots = local * nr_stations..(local + 1) * nr_stations;
                input.metadata.clone_from_slice(&metadata[slots.clone()]);
                let read = self.reader.read_block_until(block, local, &offsets[slots], deadline, &mut input)?;
                lost += read.lost_samples;

                queue.inputs().filled().append(input)?;
            }

            if lost > 0 {
                lossy_blocks += 1;
            }
            block += 1;
            self.dispatched.store(block, Ordering::Relaxed);

            if self.log_interval > 0 && block % self.log_interval == 0 && lossy_blocks > 0 {
                log::warn!(
                    "dispatcher: {} of the last {} blocks had flagged samples",
                    lossy_blocks,
                    self.log_interval
                );
                lossy_blocks = 0;
            }
        }

        Ok(block)
    }
}
