pub mod model;
pub mod offsets;
pub mod track;

pub use model::{DelayModel, DelaySet, LinearDelay, LinearDelayModel};
pub use offsets::{coarse_offset, generate_metadata};
pub use track::DelayTrack;
