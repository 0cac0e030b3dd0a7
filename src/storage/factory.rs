use super::{FileStream, MemoryStream, NullStream, OutputStream, TcpOutputStream};
use crate::error::StreamError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Opens the output stream of a subband.
pub trait StreamFactory: Send + Sync {
    fn open(&self, subband: u32) -> Result<Box<dyn OutputStream>, StreamError>;
}

/// Where subband output goes, as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageSpec {
    Null,
    /// One file per subband, `SB<nnn>.raw` under `directory`.
    File { directory: PathBuf },
    /// One connection per subband, to `base_port + subband`.
    Tcp { host: String, base_port: u16 },
}

impl Default for StorageSpec {
    fn default() -> Self {
        StorageSpec::Null
    }
}

impl StreamFactory for StorageSpec {
    fn open(&self, subband: u32) -> Result<Box<dyn OutputStream>, StreamError> {
        match self {
            StorageSpec::Null => Ok(Box::new(NullStream)),
            StorageSpec::File { directory } => {
                let path = directory.join(format!("SB{:03}.raw", subband));
                Ok(Box::new(FileStream::create(path)?))
            }
            StorageSpec::Tcp { host, base_port } => {
                let port = u32::from(*base_port) + subband;
                let port = u16::try_from(port).map_err(|_| StreamError::Open {
                    subband,
                    reason: format!("port {} out of range", port),
                })?;
                Ok(Box::new(TcpOutputStream::connect(format!("{}:{}", host, port))?))
            }
        }
    }
}

/// Hands out one `MemoryStream` per subband and keeps a handle to each.
#[derive(Default)]
pub struct MemoryStreams {
    streams: Mutex<HashMap<u32, MemoryStream>>,
}

impl MemoryStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, subband: u32) -> MemoryStream {
        self.streams.lock().entry(subband).or_default().clone()
    }
}

impl StreamFactory for MemoryStreams {
    fn open(&self, subband: u32) -> Result<Box<dyn OutputStream>, StreamError> {
        Ok(Box::new(self.stream(subband)))
    }
}
