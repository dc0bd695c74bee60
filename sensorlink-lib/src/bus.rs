use crate::constants::MAX_ADDRESS;
use crate::error::{Result, SensorError};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use strum_macros::Display;
use tracing::{debug, info, trace};

/// I2C signaling speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusSpeed {
    #[strum(to_string = "standard mode (100 kHz)")]
    Standard,
    #[default]
    #[strum(to_string = "fast mode (400 kHz)")]
    Fast,
}

impl BusSpeed {
    pub fn as_hz(&self) -> u32 {
        match self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
        }
    }
}

/// A bus controller as reported by a [`BusBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    /// Backend-specific identifier, e.g. `/dev/i2c-1`
    pub id: String,
}

impl fmt::Display for ControllerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Raw transfers to one claimed device.
pub trait BusHandle: Send {
    /// Write all bytes in a single transaction.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Fill `buf` completely in a single transaction.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// Controller discovery and device claiming.
pub trait BusBackend: Send + Sync {
    /// List every controller available on this system, in a stable order.
    fn controllers(&self) -> io::Result<Vec<ControllerInfo>>;

    /// Claim the device at `address` on `controller`.
    fn claim(&self, controller: &ControllerInfo, address: u8, speed: BusSpeed) -> io::Result<Box<dyn BusHandle>>;
}

/// One addressed, speed-configured channel to the sensor.
pub struct BusConnection {
    address: u8,
    speed: BusSpeed,
    controller: ControllerInfo,
    handle: Option<Box<dyn BusHandle>>,
}

impl BusConnection {
    /// Open a channel to `address` on the first controller the backend reports.
    ///
    /// Only the first controller is tried. If the device cannot be claimed there,
    /// other controllers are not searched.
    pub fn open(backend: &dyn BusBackend, address: u8, speed: BusSpeed) -> Result<Self> {
        if address > MAX_ADDRESS {
            return Err(SensorError::InvalidAddress(address));
        }

        info!("Searching for I2C bus controllers...");
        let controller = backend
            .controllers()?
            .into_iter()
            .next()
            .ok_or(SensorError::NoControllerFound)?;
        info!(controller = %controller, "Found bus controller");

        let handle = backend
            .claim(&controller, address, speed)
            .map_err(|source| SensorError::DeviceUnavailable {
                controller: controller.id.clone(),
                source,
            })?;
        info!(address = format_args!("{:#04x}", address), %speed, "Device claimed successfully.");

        Ok(Self {
            address,
            speed,
            controller,
            handle: Some(handle),
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn speed(&self) -> BusSpeed {
        self.speed
    }

    pub fn controller(&self) -> &ControllerInfo {
        &self.controller
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(SensorError::ConnectionClosed)?;
        trace!(bytes = %hex::encode(bytes), "write");
        handle.write(bytes)?;
        Ok(())
    }

    pub fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        let handle = self.handle.as_mut().ok_or(SensorError::ConnectionClosed)?;
        let mut buf = BytesMut::zeroed(len);
        handle.read(&mut buf)?;
        trace!(bytes = %hex::encode(&buf), "read");
        Ok(buf.freeze())
    }

    /// Release the underlying handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            debug!(controller = %self.controller, "Bus handle released");
        }
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConnection")
            .field("address", &format_args!("{:#04x}", self.address))
            .field("speed", &self.speed)
            .field("controller", &self.controller)
            .field("open", &self.is_open())
            .finish()
    }
}
