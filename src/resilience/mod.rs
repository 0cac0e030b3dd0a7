pub mod policy;
pub mod resilient_stream;

pub use policy::{OverflowPolicy, SinkFailurePolicy};
pub use resilient_stream::ResilientStream;
