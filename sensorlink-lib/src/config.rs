use crate::bus::BusSpeed;
use crate::constants::{DEFAULT_ADDRESS, MAX_ADDRESS};
use crate::error::{Result, SensorError};
use serde::{Deserialize, Serialize};

/// Where and how to reach the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 7-bit device address
    pub address: u8,
    pub speed: BusSpeed,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            speed: BusSpeed::Fast,
        }
    }
}

impl ClientConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_speed(mut self, speed: BusSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.address > MAX_ADDRESS {
            return Err(SensorError::InvalidAddress(self.address));
        }
        Ok(())
    }
}
