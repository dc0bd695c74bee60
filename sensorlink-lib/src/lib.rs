pub mod bus;
pub mod client;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod payload;
pub mod sim;

#[cfg(test)]
mod tests;

pub use bus::{BusBackend, BusConnection, BusHandle, BusSpeed, ControllerInfo};
pub use client::SensorClient;
pub use command::{Command, Frame};
pub use config::ClientConfig;
pub use error::{Result, SensorError};
#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBackend;
pub use payload::{BlockLayout, ReadingPayload};
pub use sim::{SimFaults, SimulatedSensor};
