use crate::core::{SubbandInput, SubbandOutput};
use anyhow::Result;

/// The processing run on one block of one subband (channeliser, delay
/// compensation, correlator or beamformer on a real device).
///
/// `process` may block while the device works; each work queue owns its own
/// chain, so implementations need not be `Sync`.
pub trait KernelChain: Send {
    fn name(&self) -> &str;

    fn process(&mut self, input: &SubbandInput, output: &mut SubbandOutput) -> Result<()>;
}

/// Builds one kernel chain per work queue.
pub trait KernelFactory: Send + Sync {
    /// Payload bytes of every `SubbandOutput` the chains produce.
    fn output_bytes(&self) -> usize;

    fn create(&self, queue: usize, device: usize) -> Result<Box<dyn KernelChain>>;
}
