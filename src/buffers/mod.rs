pub mod best_effort;
pub mod pool;
pub mod ring;
pub mod sync_lock;

pub use best_effort::BestEffortQueue;
pub use pool::{FilledQueue, FreeQueue, Pool, PoolEntry};
pub use ring::{ReadStatus, RingSampleBuffer, WaitOutcome};
pub use sync_lock::{ReaderId, SyncLock};
