use crate::buffers::RingSampleBuffer;
use crate::transport::StationSource;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Runtime status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    Stopped,
    Running,
    Error,
}

/// What one station's ingest task did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub station: String,
    pub packets: u64,
    /// Packets older than the ring's retention window.
    pub stale: u64,
    pub rejected: u64,
}

/// Pumps station sources into their rings, one tokio task per station.
pub struct ObservationRuntime {
    status: RuntimeStatus,

    /// Shutdown signal broadcaster
    shutdown_tx: Option<broadcast::Sender<()>>,

    /// Ingest task handles
    ingest_handles: Vec<JoinHandle<Result<IngestStats>>>,
}

impl ObservationRuntime {
    pub fn new() -> Self {
        Self {
            status: RuntimeStatus::Stopped,
            shutdown_tx: None,
            ingest_handles: Vec::new(),
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        self.status
    }

    pub fn active_station_count(&self) -> usize {
        self.ingest_handles.len()
    }

    /// Start one ingest task per `(source, ring)` pair.
    pub fn start(&mut self, stations: Vec<(Box<dyn StationSource>, Arc<RingSampleBuffer>)>) -> Result<()> {
        if self.status == RuntimeStatus::Running {
            return Err(anyhow!("Runtime is already running"));
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        for (source, ring) in stations {
            let handle = tokio::spawn(ingest(source, ring, shutdown_tx.subscribe()));
            self.ingest_handles.push(handle);
        }

        self.shutdown_tx = Some(shutdown_tx);
        self.status = RuntimeStatus::Running;
        Ok(())
    }

    /// Wait for every source to run out of packets.
    pub async fn wait(&mut self) -> Result<Vec<IngestStats>> {
        let mut stats = Vec::with_capacity(self.ingest_handles.len());
        let mut failure = None;

        // Handles are removed only once finished, so a cancelled wait loses nothing.
        while let Some(handle) = self.ingest_handles.first_mut() {
            let outcome = handle.await;
            self.ingest_handles.remove(0);
            match outcome {
                Ok(Ok(station)) => stats.push(station),
                Ok(Err(e)) => {
                    log::error!("ingest failed: {:#}", e);
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(anyhow!("ingest task panicked: {}", e));
                }
            }
        }

        self.shutdown_tx = None;
        match failure {
            Some(e) => {
                self.status = RuntimeStatus::Error;
                Err(e)
            }
            None => {
                self.status = RuntimeStatus::Stopped;
                Ok(stats)
            }
        }
    }

    /// Stop all ingest tasks and wait for them.
    pub async fn shutdown(&mut self) -> Result<Vec<IngestStats>> {
        if self.status == RuntimeStatus::Stopped {
            return Ok(Vec::new());
        }
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
        self.wait().await
    }
}

impl Default for ObservationRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObservationRuntime {
    fn drop(&mut self) {
        // Can't await in Drop; signal the tasks and let them end on their own.
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
    }
}

async fn ingest(
    mut source: Box<dyn StationSource>,
    ring: Arc<RingSampleBuffer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<IngestStats> {
    let mut stats = IngestStats {
        station: source.station().to_string(),
        ..IngestStats::default()
    };
    // A synchronised ring may stall its writer; keep that off the async workers.
    let synchronised = ring.sync_lock().is_some();

    let result = loop {
        let packet = tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            packet = source.next_packet() => packet,
        };

        let packet = match packet {
            Ok(Some(packet)) => packet,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let written = if synchronised {
            let ring = ring.clone();
            match tokio::task::spawn_blocking(move || ring.write(packet.timestamp, &packet.payload)).await {
                Ok(written) => written,
                Err(e) => break Err(e.into()),
            }
        } else {
            ring.write(packet.timestamp, &packet.payload)
        };

        stats.packets += 1;
        match written {
            Ok(true) => {}
            Ok(false) => stats.stale += 1,
            Err(e) => {
                stats.rejected += 1;
                log::warn!("station {}: packet rejected: {}", stats.station, e);
            }
        }
    };

    ring.no_more_data();
    log::info!(
        "station {}: {} packets ingested, {} stale, {} rejected",
        stats.station,
        stats.packets,
        stats.stale,
        stats.rejected
    );
    result.map(|_| stats)
}
