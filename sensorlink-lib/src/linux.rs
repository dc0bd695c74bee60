//! I2C access through the Linux `i2c-dev` character devices.

use crate::bus::{BusBackend, BusHandle, BusSpeed, ControllerInfo};
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_DEV_DIR: &str = "/dev";

/// Discovers `/dev/i2c-N` adapters and opens them with `linux-embedded-hal`.
#[derive(Debug, Clone)]
pub struct LinuxI2cBackend {
    dev_dir: PathBuf,
}

impl LinuxI2cBackend {
    pub fn new(dev_dir: impl Into<PathBuf>) -> Self {
        Self { dev_dir: dev_dir.into() }
    }

    pub fn dev_dir(&self) -> &Path {
        &self.dev_dir
    }
}

impl Default for LinuxI2cBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DEV_DIR)
    }
}

/// Bus number of an `i2c-N` device node name
fn bus_number(name: &str) -> Option<u32> {
    name.strip_prefix("i2c-")?.parse().ok()
}

impl BusBackend for LinuxI2cBackend {
    fn controllers(&self) -> io::Result<Vec<ControllerInfo>> {
        let entries = match fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut buses = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(number) = name.to_str().and_then(bus_number) {
                buses.push((number, entry.path()));
            }
        }
        buses.sort_by_key(|(number, _)| *number);

        Ok(buses
            .into_iter()
            .map(|(_, path)| ControllerInfo {
                id: path.display().to_string(),
            })
            .collect())
    }

    fn claim(&self, controller: &ControllerInfo, address: u8, speed: BusSpeed) -> io::Result<Box<dyn BusHandle>> {
        let dev = I2cdev::new(&controller.id).map_err(|e| io::Error::other(e.to_string()))?;
        // The adapter driver owns the clock; i2c-dev cannot change it per device.
        debug!(
            controller = %controller,
            requested_hz = speed.as_hz(),
            "Opened i2c-dev adapter; bus speed is fixed by the adapter configuration"
        );
        Ok(Box::new(LinuxI2cDevice { dev, address }))
    }
}

struct LinuxI2cDevice {
    dev: I2cdev,
    address: u8,
}

fn to_io<E: embedded_hal::i2c::Error>(e: E) -> io::Error {
    io::Error::other(format!("{:?}: {:?}", e.kind(), e))
}

impl BusHandle for LinuxI2cDevice {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.dev.write(self.address, bytes).map_err(to_io)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.dev.read(self.address, buf).map_err(to_io)
    }
}
