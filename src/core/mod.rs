pub mod block;
pub mod ids;
pub mod metadata;
pub mod sparse_set;
pub mod timestamp;

pub use block::{BlockGeometry, SubbandInput, SubbandOutput};
pub use ids::{BlockId, StationId};
pub use metadata::{BeamDelay, DelayPair, StationDelay, SubbandMetaData, NR_POLARIZATIONS};
pub use sparse_set::SparseSet;
pub use timestamp::TimeStamp;
