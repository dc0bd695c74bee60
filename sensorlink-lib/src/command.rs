use crate::constants::{BLOCK_LEN, FRAME_LEN, PARAMETER_LEN};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Command byte sent as the first byte of every request.
///
/// The values are fixed by the sensor firmware and must never be renumbered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Command {
    /// Acquire (1) or release (0) the remote data lock
    SetLock = 1,
    /// Size of each block in bytes (informational)
    BlockSize = 2,
    /// Number of blocks holding the current payload
    BlockCount = 3,
    /// Length of the payload once padding is trimmed
    StringLength = 4,
    /// One block, 1-based index in the argument byte
    GetBlock = 5,
    /// Current lock state
    GetLock = 6,
}

impl Command {
    /// Number of bytes the firmware answers with
    pub fn response_len(self) -> usize {
        match self {
            Command::GetBlock => BLOCK_LEN,
            _ => PARAMETER_LEN,
        }
    }

    /// Build the request frame for this command
    pub fn frame(self, argument: u8) -> Frame {
        Frame {
            command: self,
            argument,
        }
    }
}

/// A single 2-byte request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub argument: u8,
}

impl Frame {
    pub fn to_bytes(self) -> [u8; FRAME_LEN] {
        [self.command.into(), self.argument]
    }

    /// Parse a frame as seen on the wire. Returns `None` for unknown command bytes
    /// or a wrong frame length.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let [command, argument]: [u8; FRAME_LEN] = bytes.try_into().ok()?;
        let command = Command::try_from(command).ok()?;
        Some(Self { command, argument })
    }
}
