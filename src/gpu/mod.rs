pub mod devices;
pub mod kernel;
pub mod power;

pub use devices::DeviceInventory;
pub use kernel::{KernelChain, KernelFactory};
pub use power::{decode_sample, PowerKernel, PowerKernelFactory, StationPower};
