use stationflow::config::{SourceConfig, StationConfig};
use stationflow::core::{StationId, TimeStamp};
use stationflow::transport::{open_sources, SimulatedStation, StationPacket, StationSource, UdpStationSource};
use stationflow::PipelineConfig;
use tokio::net::UdpSocket;

fn station() -> StationId {
    StationId::new("CS001", "HBA0")
}

#[test]
fn test_simulated_station_covers_its_span() {
    let mut source = SimulatedStation::new(station(), 2, 8, 16).with_span(TimeStamp(32), Some(TimeStamp(72)));

    let packets: Vec<StationPacket> = tokio_test::block_on(async {
        let mut packets = Vec::new();
        while let Some(packet) = source.next_packet().await.unwrap() {
            packets.push(packet);
        }
        packets
    });

    let starts: Vec<u64> = packets.iter().map(|p| p.timestamp.0).collect();
    assert_eq!(starts, vec![32, 48, 64]);
    // last packet is cut at the end of the span
    assert_eq!(packets[2].nr_samples, 8);
    assert_eq!(packets[2].payload.len(), 2 * 8 * 4);
    assert_eq!(packets[0].payload.len(), 2 * 16 * 4);
}

#[test]
fn test_simulated_loss_leaves_gaps() {
    let mut source = SimulatedStation::new(station(), 1, 16, 4)
        .with_span(TimeStamp(0), Some(TimeStamp(24)))
        .with_loss(Some(3));

    let starts: Vec<u64> = tokio_test::block_on(async {
        let mut starts = Vec::new();
        while let Some(packet) = source.next_packet().await.unwrap() {
            starts.push(packet.timestamp.0);
        }
        starts
    });

    assert_eq!(starts, vec![0, 4, 12, 16]);
}

#[tokio::test]
async fn test_udp_source_skips_malformed_datagrams() {
    let mut source = UdpStationSource::bind("127.0.0.1:0", station(), 2, 4).await.unwrap();
    let target = source.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&[1, 2, 3], target).await.unwrap();
    let packet = StationPacket::new(TimeStamp(1000), 3, vec![7; 2 * 3 * 4]);
    sender.send_to(&packet.encode(), target).await.unwrap();

    let received = source.next_packet().await.unwrap().unwrap();
    assert_eq!(received, packet);
    assert_eq!(source.invalid_packets(), 1);
}

#[tokio::test]
async fn test_open_sources_follows_configuration() {
    let mut udp = StationConfig::new("CS002", "HBA0");
    udp.source = SourceConfig::Udp {
        bind: "127.0.0.1:0".to_string(),
    };
    let config = PipelineConfig {
        stations: vec![StationConfig::new("CS001", "HBA0"), udp],
        subbands: vec![0, 1],
        nr_blocks: Some(2),
        ..PipelineConfig::default()
    };

    let mut sources = open_sources(&config).await.unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].station().name, "CS002");

    let first = sources[0].next_packet().await.unwrap().unwrap();
    assert_eq!(first.timestamp, TimeStamp(config.start_time));
    assert_eq!(first.nr_samples as u64, config.packet_samples);
}
