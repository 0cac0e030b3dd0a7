use super::{StationPacket, StationSource};
use crate::core::StationId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

const MAX_DATAGRAM: usize = 65_536;

/// Receives one station's packets as UDP datagrams.
pub struct UdpStationSource {
    station: StationId,
    socket: UdpSocket,
    nr_subbands: usize,
    bytes_per_sample: usize,
    buffer: Vec<u8>,
    invalid: u64,
}

impl UdpStationSource {
    pub async fn bind(
        addr: &str,
        station: StationId,
        nr_subbands: usize,
        bytes_per_sample: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("station {}: failed to bind {}", station, addr))?;
        log::info!("station {}: listening on {}", station, socket.local_addr()?);

        Ok(Self {
            station,
            socket,
            nr_subbands,
            bytes_per_sample,
            buffer: vec![0u8; MAX_DATAGRAM],
            invalid: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Datagrams discarded because they did not parse.
    pub fn invalid_packets(&self) -> u64 {
        self.invalid
    }
}

#[async_trait]
impl StationSource for UdpStationSource {
    fn station(&self) -> &StationId {
        &self.station
    }

    /// Never returns `None`: a UDP station ends when the runtime shuts down.
    async fn next_packet(&mut self) -> Result<Option<StationPacket>> {
        loop {
            let len = self.socket.recv(&mut self.buffer).await?;
            match StationPacket::decode(&self.buffer[..len], self.nr_subbands, self.bytes_per_sample) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => {
                    self.invalid += 1;
                    log::warn!("station {}: dropping malformed packet: {}", self.station, e);
                }
            }
        }
    }
}
