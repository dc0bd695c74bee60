use std::io;
use thiserror::Error;

/// The primary error type for the `sensorlink` library.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("No I2C bus controller found")]
    NoControllerFound,

    #[error("Device could not be claimed on controller {controller}: {source}")]
    DeviceUnavailable {
        controller: String,
        #[source]
        source: io::Error,
    },

    #[error("I2C bus error: {0}")]
    BusIo(#[from] io::Error),

    #[error("Failed to lock data (device answered {response})")]
    LockAcquisitionFailed { response: u8 },

    #[error("The JSON string was not equal to the expected length: expected {expected}, got {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    #[error("Payload of {len} bytes does not fit the protocol's {max}-byte limit")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Bus connection is closed")]
    ConnectionClosed,

    #[error("Sensor client is not initialized")]
    NotInitialized,

    #[error("Invalid 7-bit I2C address: {0:#04x}")]
    InvalidAddress(u8),

    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

pub type Result<T, E = SensorError> = std::result::Result<T, E>;
