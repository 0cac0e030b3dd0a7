use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Compute devices available to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInventory {
    pub devices: usize,
    /// Work queues (contexts) that may share one device.
    pub queues_per_device: usize,
}

impl Default for DeviceInventory {
    fn default() -> Self {
        Self {
            devices: 1,
            queues_per_device: 2,
        }
    }
}

impl DeviceInventory {
    pub fn new(devices: usize, queues_per_device: usize) -> Self {
        Self {
            devices,
            queues_per_device,
        }
    }

    pub fn available_queues(&self) -> usize {
        self.devices * self.queues_per_device
    }

    /// Fails when more work queues are requested than the devices can host.
    pub fn check(&self, requested: usize) -> Result<(), ConfigError> {
        let available = self.available_queues();
        if requested > available {
            return Err(ConfigError::NotEnoughDevices {
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Queues are spread over the devices round-robin.
    pub fn device_for_queue(&self, queue: usize) -> usize {
        if self.devices == 0 {
            return 0;
        }
        queue % self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_queues_is_fatal() {
        let inventory = DeviceInventory::new(2, 2);
        assert!(inventory.check(4).is_ok());
        assert_eq!(
            inventory.check(5),
            Err(ConfigError::NotEnoughDevices {
                requested: 5,
                available: 4
            })
        );
        assert_eq!(inventory.device_for_queue(3), 1);
    }
}
