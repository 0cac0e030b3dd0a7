use crate::error::StreamError;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sink for one subband's output records.
pub trait OutputStream: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// Leave a hole of `bytes` (records that were dropped).
    fn skip(&mut self, bytes: u64) -> Result<(), StreamError>;

    fn flush(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStream;

impl OutputStream for NullStream {
    fn write(&mut self, _data: &[u8]) -> Result<(), StreamError> {
        Ok(())
    }

    fn skip(&mut self, _bytes: u64) -> Result<(), StreamError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "null".to_string()
    }
}

pub struct FileStream {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileStream {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }
}

impl OutputStream for FileStream {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        self.writer.seek(SeekFrom::Current(bytes as i64))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        self.writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

pub struct TcpOutputStream {
    peer: String,
    writer: BufWriter<TcpStream>,
}

impl TcpOutputStream {
    pub fn connect(peer: impl Into<String>) -> Result<Self, StreamError> {
        let peer = peer.into();
        let stream = TcpStream::connect(&peer)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            peer,
            writer: BufWriter::new(stream),
        })
    }
}

impl OutputStream for TcpOutputStream {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        // a socket cannot seek; pad with zeros
        const ZEROS: [u8; 4096] = [0u8; 4096];
        let mut left = bytes;
        while left > 0 {
            let n = left.min(ZEROS.len() as u64) as usize;
            self.writer.write_all(&ZEROS[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        self.writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.peer)
    }
}

/// In-memory sink whose contents stay reachable through clones.
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutputStream for MemoryStream {
    fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.buffer.lock().extend_from_slice(data);
        Ok(())
    }

    fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        let mut buffer = self.buffer.lock();
        let len = buffer.len() + bytes as usize;
        buffer.resize(len, 0);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
