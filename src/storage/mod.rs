pub mod factory;
pub mod record;
pub mod stream;

pub use factory::{MemoryStreams, StorageSpec, StreamFactory};
pub use record::{parse_records, RecordHeader};
pub use stream::{FileStream, MemoryStream, NullStream, OutputStream, TcpOutputStream};
