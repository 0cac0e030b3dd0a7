use super::SinkFailurePolicy;
use crate::error::StreamError;
use crate::observability::SubbandMetrics;
use crate::storage::{NullStream, OutputStream, RecordHeader, StreamFactory};
use std::sync::Arc;

/// Output stream of one subband that survives its sink breaking.
///
/// After the first failure the inner stream is replaced by a [`NullStream`]
/// (unless the policy says to propagate), so the writer keeps draining its
/// queue and the rest of the pipeline is not held up.
pub struct ResilientStream {
    subband: u32,
    inner: Box<dyn OutputStream>,
    policy: SinkFailurePolicy,
    metrics: Arc<SubbandMetrics>,
    substituted: bool,
}

impl ResilientStream {
    pub fn new(
        subband: u32,
        inner: Box<dyn OutputStream>,
        policy: SinkFailurePolicy,
        metrics: Arc<SubbandMetrics>,
    ) -> Self {
        Self {
            subband,
            inner,
            policy,
            metrics,
            substituted: false,
        }
    }

    /// Open the subband's stream; a sink that cannot be opened is treated
    /// like one that failed on its first write.
    pub fn open(
        factory: &dyn StreamFactory,
        subband: u32,
        policy: SinkFailurePolicy,
        metrics: Arc<SubbandMetrics>,
    ) -> Result<Self, StreamError> {
        match factory.open(subband) {
            Ok(inner) => Ok(Self::new(subband, inner, policy, metrics)),
            Err(e) => {
                let mut stream = Self::new(subband, Box::new(NullStream), policy, metrics);
                stream.handle_failure(e)?;
                Ok(stream)
            }
        }
    }

    pub fn is_substituted(&self) -> bool {
        self.substituted
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    /// Write one record: header followed by `payload`.
    pub fn write_block(&mut self, header: &RecordHeader, payload: &[u8]) -> Result<(), StreamError> {
        let start = self.metrics.start_write();
        let result = self
            .inner
            .write(&header.encode())
            .and_then(|_| self.inner.write(payload));

        match result {
            Ok(()) => {
                self.metrics.finish_write(start);
                self.metrics.record_written(header.record_len());
                Ok(())
            }
            Err(e) => self.handle_failure(e),
        }
    }

    /// Leave room for `bytes` of records that will never arrive.
    pub fn skip(&mut self, bytes: u64) -> Result<(), StreamError> {
        match self.inner.skip(bytes) {
            Ok(()) => Ok(()),
            Err(e) => self.handle_failure(e),
        }
    }

    pub fn flush(&mut self) -> Result<(), StreamError> {
        match self.inner.flush() {
            Ok(()) => Ok(()),
            Err(e) => self.handle_failure(e),
        }
    }

    fn handle_failure(&mut self, error: StreamError) -> Result<(), StreamError> {
        self.metrics.record_sink_failure();
        match self.policy {
            SinkFailurePolicy::Propagate => Err(error),
            SinkFailurePolicy::SubstituteNull => {
                if !self.substituted {
                    log::error!(
                        "[subband {}] output to {} failed ({}), discarding further output",
                        self.subband,
                        self.inner.describe(),
                        error
                    );
                }
                self.inner = Box::new(NullStream);
                self.substituted = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenStream;

    impl OutputStream for BrokenStream {
        fn write(&mut self, _data: &[u8]) -> Result<(), StreamError> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away").into())
        }

        fn skip(&mut self, _bytes: u64) -> Result<(), StreamError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn header(block: u64) -> RecordHeader {
        RecordHeader {
            block,
            subband: 3,
            nr_flagged: 0,
            payload_len: 4,
        }
    }

    #[test]
    fn test_failure_substitutes_null_sink() {
        let metrics = Arc::new(SubbandMetrics::new(3));
        let mut stream = ResilientStream::new(
            3,
            Box::new(BrokenStream),
            SinkFailurePolicy::SubstituteNull,
            metrics.clone(),
        );

        assert!(stream.write_block(&header(0), &[1, 2, 3, 4]).is_ok());
        assert!(stream.is_substituted());
        assert_eq!(stream.describe(), "null");

        // later blocks go to the null sink and count as written
        assert!(stream.write_block(&header(1), &[1, 2, 3, 4]).is_ok());
        assert_eq!(metrics.sink_failures(), 1);
        assert_eq!(metrics.written(), 1);
    }

    #[test]
    fn test_failure_propagates_when_asked() {
        let metrics = Arc::new(SubbandMetrics::new(3));
        let mut stream = ResilientStream::new(
            3,
            Box::new(BrokenStream),
            SinkFailurePolicy::Propagate,
            metrics.clone(),
        );

        assert!(stream.write_block(&header(0), &[0; 4]).is_err());
        assert!(!stream.is_substituted());
        assert_eq!(metrics.sink_failures(), 1);
    }
}
