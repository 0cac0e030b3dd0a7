use super::{SimulatedStation, StationPacket, UdpStationSource};
use crate::config::{PipelineConfig, SourceConfig};
use crate::core::{StationId, TimeStamp};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Delivers one station's sample packets, in arrival order.
#[async_trait]
pub trait StationSource: Send {
    fn station(&self) -> &StationId;

    /// Next packet, or `None` once the station has nothing more to send.
    async fn next_packet(&mut self) -> Result<Option<StationPacket>>;
}

/// Open the source configured for every station, in configuration order.
pub async fn open_sources(config: &PipelineConfig) -> Result<Vec<Box<dyn StationSource>>> {
    let start = TimeStamp(config.start_time);
    // enough samples for the last block's window, delays included
    let end = config.nr_blocks.map(|blocks| {
        config.geometry().end(blocks) + config.max_delay_samples + config.packet_samples
    });
    let packet_samples = u16::try_from(config.packet_samples)
        .map_err(|_| anyhow!("packet_samples {} does not fit a packet", config.packet_samples))?;

    let mut sources: Vec<Box<dyn StationSource>> = Vec::with_capacity(config.nr_stations());
    for station in &config.stations {
        let source: Box<dyn StationSource> = match &station.source {
            SourceConfig::Simulated {
                amplitude,
                lose_every,
                paced,
            } => {
                let simulated = SimulatedStation::new(
                    station.id(),
                    config.nr_subbands(),
                    config.sample_bits,
                    packet_samples,
                )
                .with_span(start, end)
                .with_amplitude(*amplitude)
                .with_loss(*lose_every);
                if *paced {
                    Box::new(simulated.paced(config.sample_rate_hz))
                } else {
                    Box::new(simulated)
                }
            }
            SourceConfig::Udp { bind } => Box::new(
                UdpStationSource::bind(bind, station.id(), config.nr_subbands(), config.bytes_per_sample())
                    .await?,
            ),
        };
        sources.push(source);
    }
    Ok(sources)
}
