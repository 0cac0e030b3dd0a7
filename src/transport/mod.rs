pub mod packet;
pub mod simulated;
pub mod source;
pub mod udp;

pub use packet::StationPacket;
pub use simulated::SimulatedStation;
pub use source::{open_sources, StationSource};
pub use udp::UdpStationSource;
