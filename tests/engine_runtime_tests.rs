use stationflow::buffers::RingSampleBuffer;
use stationflow::config::StationConfig;
use stationflow::core::{StationId, TimeStamp};
use stationflow::engine::RuntimeStatus;
use stationflow::storage::{parse_records, MemoryStreams, RecordHeader};
use stationflow::transport::{open_sources, StationPacket, StationSource, UdpStationSource};
use stationflow::{ObservationRuntime, Pipeline, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

#[tokio::test]
async fn test_shutdown_stops_endless_sources() {
    let station = StationId::new("CS001", "HBA0");
    let source = UdpStationSource::bind("127.0.0.1:0", station.clone(), 1, 4).await.unwrap();
    let target = source.local_addr().unwrap();
    let ring = Arc::new(RingSampleBuffer::new(station, 1, 64, 4).unwrap());

    let mut runtime = ObservationRuntime::new();
    let sources: Vec<(Box<dyn StationSource>, Arc<RingSampleBuffer>)> = vec![(Box::new(source), ring.clone())];
    runtime.start(sources).unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Running);
    assert_eq!(runtime.active_station_count(), 1);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // stamped so late that the packet would run off the end of the sample clock
    let bogus = StationPacket::new(TimeStamp(u64::MAX - 2), 8, vec![1; 8 * 4]);
    sender.send_to(&bogus.encode(), target).await.unwrap();
    let packet = StationPacket::new(TimeStamp(0), 8, vec![1; 8 * 4]);
    sender.send_to(&packet.encode(), target).await.unwrap();

    for _ in 0..100 {
        if ring.head() == TimeStamp(8) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ring.head(), TimeStamp(8));

    let stats = runtime.shutdown().await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].packets, 2);
    assert_eq!(stats[0].rejected, 1);
    assert!(ring.is_ended());
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
}

#[tokio::test]
async fn test_runtime_rejects_second_start() {
    let mut runtime = ObservationRuntime::new();
    runtime.start(Vec::new()).unwrap();
    assert!(runtime.start(Vec::new()).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_simulated_observation_end_to_end() {
    let config = PipelineConfig {
        stations: vec![StationConfig::new("CS001", "HBA0"), StationConfig::new("RS106", "HBA")],
        subbands: vec![200, 201],
        block_size: 256,
        fir_taps: 4,
        channels_per_subband: 16,
        sample_bits: 16,
        packet_samples: 16,
        realtime: false,
        nr_blocks: Some(50),
        log_interval_blocks: 10,
        ..PipelineConfig::default()
    };

    let streams = Arc::new(MemoryStreams::new());
    let mut pipeline = Pipeline::builder(config.clone()).streams(streams.clone()).build().unwrap();
    pipeline.start().unwrap();

    let sources = open_sources(&config).await.unwrap();
    let stations = sources.into_iter().zip(pipeline.rings().iter().cloned()).collect();
    let mut runtime = ObservationRuntime::new();
    runtime.start(stations).unwrap();

    let ingest = runtime.wait().await.unwrap();
    assert_eq!(ingest.len(), 2);
    assert!(ingest.iter().all(|s| s.stale == 0 && s.rejected == 0));

    pipeline.end_of_input();
    let snapshot = tokio::task::spawn_blocking(move || pipeline.join()).await.unwrap().unwrap();

    let record_len = RecordHeader::SIZE + 2 * 8;
    for subband in [200, 201] {
        assert_eq!(snapshot.subbands[&subband].forwarded, 50);
        let records = parse_records(&streams.stream(subband).contents(), record_len);
        assert_eq!(records.len(), 50);
        assert!(records.iter().enumerate().all(|(i, r)| r.block == i as u64));
    }
}
