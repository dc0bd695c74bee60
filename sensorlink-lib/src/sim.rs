//! Software model of the sensor firmware.
//!
//! `SimulatedSensor` answers the six protocol commands the way the device does,
//! records every frame written to it, and can be told to misbehave. It is used
//! by the integration tests and by the CLI's `--simulate` mode.

use crate::bus::{BusBackend, BusHandle, BusSpeed, ControllerInfo};
use crate::command::{Command, Frame};
use crate::constants::{BLOCK_LEN, DEFAULT_ADDRESS, FRAME_LEN, LOCK_ACQUIRED, LOCK_ON, MAX_PAYLOAD_LEN, SETTLE_DELAY};
use crate::error::{Result, SensorError};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::trace;

pub const SIM_CONTROLLER_ID: &str = "sim-i2c-0";

/// Ways the simulated firmware can be told to fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Answer SetLock(1) with 0 and stay unlocked
    pub refuse_lock: bool,
    /// NACK the read that follows GetBlock for this index
    pub fail_block: Option<u8>,
    /// Report this StringLength instead of the real one
    pub string_length_override: Option<u8>,
    /// Report this BlockCount instead of the real one; blocks past the payload are all NUL
    pub block_count_override: Option<u8>,
    /// NACK every write of this command
    pub fail_write_of: Option<Command>,
    /// NACK SetLock(0) writes only
    pub fail_unlock: bool,
}

#[derive(Debug)]
struct Firmware {
    address: u8,
    payload: String,
    staged_payload: Option<String>,
    locked: bool,
    response: Option<Vec<u8>>,
    ready_at: Option<Instant>,
    fail_next_read: bool,
    faults: SimFaults,
    frames: Vec<[u8; FRAME_LEN]>,
    controllers: Vec<ControllerInfo>,
    claimable: bool,
    claims: usize,
    releases: usize,
}

impl Firmware {
    // Payloads are checked against MAX_PAYLOAD_LEN on entry, so neither count saturates.
    fn block_count(&self) -> u8 {
        u8::try_from(self.payload.len().div_ceil(BLOCK_LEN)).unwrap_or(u8::MAX)
    }

    fn string_length(&self) -> u8 {
        u8::try_from(self.payload.len()).unwrap_or(u8::MAX)
    }

    fn block(&self, index: u8) -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_LEN];
        if index == 0 {
            return block;
        }
        let start = (usize::from(index) - 1) * BLOCK_LEN;
        let bytes = self.payload.as_bytes();
        if start < bytes.len() {
            let end = (start + BLOCK_LEN).min(bytes.len());
            block[..end - start].copy_from_slice(&bytes[start..end]);
        }
        block
    }

    fn set_lock(&mut self, argument: u8) -> u8 {
        if argument == LOCK_ON {
            if self.faults.refuse_lock {
                return 0;
            }
            self.locked = true;
        } else {
            self.locked = false;
            if let Some(staged) = self.staged_payload.take() {
                self.payload = staged;
            }
        }
        LOCK_ACQUIRED
    }

    fn respond(&mut self, frame: Frame) -> Vec<u8> {
        match frame.command {
            Command::SetLock => vec![self.set_lock(frame.argument)],
            Command::BlockSize => vec![BLOCK_LEN as u8],
            Command::BlockCount => vec![self.faults.block_count_override.unwrap_or(self.block_count())],
            Command::StringLength => vec![self.faults.string_length_override.unwrap_or(self.string_length())],
            Command::GetBlock => {
                if self.faults.fail_block == Some(frame.argument) {
                    self.fail_next_read = true;
                }
                self.block(frame.argument)
            }
            Command::GetLock => vec![u8::from(self.locked)],
        }
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> io::Result<()> {
        if address != self.address {
            return Err(io::Error::other(format!("no ACK from address {address:#04x}")));
        }
        let raw: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "request must be 2 bytes"))?;
        self.frames.push(raw);
        trace!(frame = %hex::encode(raw), "firmware received");

        let Some(frame) = Frame::parse(&raw) else {
            self.response = Some(vec![0]);
            self.ready_at = Some(Instant::now() + SETTLE_DELAY);
            return Ok(());
        };
        let unlock = frame.command == Command::SetLock && frame.argument != LOCK_ON;
        if self.faults.fail_write_of == Some(frame.command) || (unlock && self.faults.fail_unlock) {
            self.response = None;
            return Err(io::Error::other(format!("NACK on {} write", frame.command)));
        }

        self.response = Some(self.respond(frame));
        self.ready_at = Some(Instant::now() + SETTLE_DELAY);
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> io::Result<()> {
        if address != self.address {
            return Err(io::Error::other(format!("no ACK from address {address:#04x}")));
        }
        if let Some(ready_at) = self.ready_at {
            if Instant::now() < ready_at {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "response not ready"));
            }
        }
        if std::mem::take(&mut self.fail_next_read) {
            self.response = None;
            return Err(io::Error::other("NACK on block read"));
        }
        let response = self
            .response
            .take()
            .ok_or_else(|| io::Error::other("read without a pending request"))?;
        if response.len() != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, device sent {}", buf.len(), response.len()),
            ));
        }
        buf.copy_from_slice(&response);
        Ok(())
    }
}

fn checked_payload(payload: String) -> Result<String> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(SensorError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(payload)
}

/// Shared handle to one simulated sensor. Clones observe the same device.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<Firmware>>,
}

impl SimulatedSensor {
    /// A sensor at the default address on a single controller, serving `payload`.
    ///
    /// Fails with [`SensorError::PayloadTooLong`] if the payload is longer than
    /// StringLength can report.
    pub fn new(payload: impl Into<String>) -> Result<Self> {
        let firmware = Firmware {
            address: DEFAULT_ADDRESS,
            payload: checked_payload(payload.into())?,
            staged_payload: None,
            locked: false,
            response: None,
            ready_at: None,
            fail_next_read: false,
            faults: SimFaults::default(),
            frames: Vec::new(),
            controllers: vec![ControllerInfo {
                id: SIM_CONTROLLER_ID.to_string(),
            }],
            claimable: true,
            claims: 0,
            releases: 0,
        };
        Ok(Self {
            state: Arc::new(Mutex::new(firmware)),
        })
    }

    fn firmware(&self) -> MutexGuard<'_, Firmware> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_address(self, address: u8) -> Self {
        self.firmware().address = address;
        self
    }

    /// Report no bus controllers at all
    pub fn without_controllers(self) -> Self {
        self.firmware().controllers.clear();
        self
    }

    /// Report an extra controller after the existing ones
    pub fn with_controller(self, id: impl Into<String>) -> Self {
        self.firmware().controllers.push(ControllerInfo { id: id.into() });
        self
    }

    /// Refuse to be claimed
    pub fn unclaimable(self) -> Self {
        self.firmware().claimable = false;
        self
    }

    pub fn with_faults(self, faults: SimFaults) -> Self {
        self.set_faults(faults);
        self
    }

    pub fn set_faults(&self, faults: SimFaults) {
        self.firmware().faults = faults;
    }

    /// Replace the payload. While the lock is held the new payload is staged
    /// and only becomes visible after unlock. An oversized payload is rejected
    /// and the current one is kept.
    pub fn set_payload(&self, payload: impl Into<String>) -> Result<()> {
        let payload = checked_payload(payload.into())?;
        let mut firmware = self.firmware();
        if firmware.locked {
            firmware.staged_payload = Some(payload);
        } else {
            firmware.payload = payload;
        }
        Ok(())
    }

    pub fn payload(&self) -> String {
        self.firmware().payload.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.firmware().locked
    }

    /// Every frame written so far, in order
    pub fn frames(&self) -> Vec<[u8; FRAME_LEN]> {
        self.firmware().frames.clone()
    }

    pub fn count_frames(&self, frame: [u8; FRAME_LEN]) -> usize {
        self.firmware().frames.iter().filter(|f| **f == frame).count()
    }

    pub fn clear_frames(&self) {
        self.firmware().frames.clear();
    }

    /// Number of handles handed out by `claim`
    pub fn claims(&self) -> usize {
        self.firmware().claims
    }

    /// Number of claimed handles that have been dropped
    pub fn releases(&self) -> usize {
        self.firmware().releases
    }
}

impl BusBackend for SimulatedSensor {
    fn controllers(&self) -> io::Result<Vec<ControllerInfo>> {
        Ok(self.firmware().controllers.clone())
    }

    fn claim(&self, controller: &ControllerInfo, address: u8, _speed: BusSpeed) -> io::Result<Box<dyn BusHandle>> {
        let mut firmware = self.firmware();
        if !firmware.claimable || !firmware.controllers.contains(controller) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "device busy"));
        }
        firmware.claims += 1;
        Ok(Box::new(SimulatedChannel {
            state: Arc::clone(&self.state),
            address,
        }))
    }
}

struct SimulatedChannel {
    state: Arc<Mutex<Firmware>>,
    address: u8,
}

impl SimulatedChannel {
    fn firmware(&self) -> MutexGuard<'_, Firmware> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusHandle for SimulatedChannel {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let address = self.address;
        self.firmware().write(address, bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let address = self.address;
        self.firmware().read(address, buf)
    }
}

impl Drop for SimulatedChannel {
    fn drop(&mut self) {
        self.firmware().releases += 1;
    }
}
