// Wire constants shared by the host client and the sensor firmware

use std::time::Duration;

/// I2C address the sensor firmware listens on
pub const DEFAULT_ADDRESS: u8 = 0x26;

/// Highest valid 7-bit I2C address
pub const MAX_ADDRESS: u8 = 0x7F;

/// Every request is `[command, argument]`
pub const FRAME_LEN: usize = 2;

/// Size of one GetBlock response
pub const BLOCK_LEN: usize = 32;

/// Longest payload the one-byte StringLength answer can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Size of every non-block response
pub const PARAMETER_LEN: usize = 1;

/// Time the firmware needs between a request and its response.
/// This is a property of the firmware, not a tunable.
pub const SETTLE_DELAY: Duration = Duration::from_millis(150);

/// SetLock response meaning "done"
pub const LOCK_ACQUIRED: u8 = 1;

/// SetLock arguments
pub const LOCK_ON: u8 = 1;
pub const LOCK_OFF: u8 = 0;

/// Argument byte for parameter queries, ignored by the firmware
pub const NO_ARGUMENT: u8 = 0;

/// GetBlock indices start at 1
pub const FIRST_BLOCK: u8 = 1;
