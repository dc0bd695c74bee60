use crate::bus::{BusBackend, BusConnection, ControllerInfo};
use crate::command::Command;
use crate::config::ClientConfig;
use crate::constants::{FIRST_BLOCK, LOCK_ACQUIRED, LOCK_OFF, LOCK_ON, NO_ARGUMENT, SETTLE_DELAY};
use crate::error::{Result, SensorError};
use crate::payload::{BlockLayout, ReadingPayload};
use bytes::Bytes;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Progress of a single `fetch_reading` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum FetchState {
    Idle,
    LockRequested,
    Locked,
    ReadingBlocks,
    Validated,
    Invalid,
    Unlocking,
    Done,
}

/// Where the client is in its connection lifecycle
#[derive(Debug)]
enum Link {
    Uninitialized,
    Open(BusConnection),
    Closed,
}

impl Link {
    fn connection(&mut self) -> Result<&mut BusConnection> {
        match self {
            Link::Open(conn) => Ok(conn),
            Link::Uninitialized => Err(SensorError::NotInitialized),
            Link::Closed => Err(SensorError::ConnectionClosed),
        }
    }
}

/// Client for the sensor's lock/block-transfer protocol.
///
/// The connection sits behind an async mutex that is held for a whole
/// sequence, so two lock/unlock sequences never interleave on the bus.
pub struct SensorClient {
    config: ClientConfig,
    backend: Arc<dyn BusBackend>,
    link: Mutex<Link>,
}

impl SensorClient {
    pub fn new(config: ClientConfig, backend: Arc<dyn BusBackend>) -> Self {
        Self {
            config,
            backend,
            link: Mutex::new(Link::Uninitialized),
        }
    }

    pub fn with_backend<B: BusBackend + 'static>(config: ClientConfig, backend: B) -> Self {
        Self::new(config, Arc::new(backend))
    }

    /// Client using the Linux `i2c-dev` interface under `/dev`
    #[cfg(target_os = "linux")]
    pub fn linux(config: ClientConfig) -> Self {
        Self::with_backend(config, crate::linux::LinuxI2cBackend::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Find the bus controller and open the connection to the sensor.
    ///
    /// Must succeed once before [`fetch_reading`](Self::fetch_reading). Calling it
    /// again replaces the current connection, and reopens a closed client.
    pub async fn initialize(&self) -> Result<()> {
        self.config.validate()?;
        let mut link = self.link.lock().await;
        if let Link::Open(mut previous) = std::mem::replace(&mut *link, Link::Uninitialized) {
            previous.close();
        }

        let opened = BusConnection::open(self.backend.as_ref(), self.config.address, self.config.speed)?;
        *link = Link::Open(opened);
        info!("Sensor client initialized and ready for polling.");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.link.lock().await, Link::Open(_))
    }

    /// Controller the current connection was opened on
    pub async fn controller(&self) -> Option<ControllerInfo> {
        match &*self.link.lock().await {
            Link::Open(conn) => Some(conn.controller().clone()),
            _ => None,
        }
    }

    /// Send one parameter command and return the single response byte.
    pub async fn send_command(&self, command: Command, argument: u8) -> Result<u8> {
        let mut link = self.link.lock().await;
        let conn = link.connection()?;
        exchange(conn, command, argument).await
    }

    /// Read one 32-byte block. `index` is 1-based.
    pub async fn read_block(&self, index: u8) -> Result<Bytes> {
        let mut link = self.link.lock().await;
        let conn = link.connection()?;
        read_block(conn, index).await
    }

    /// Lock the sensor's buffer, read the whole payload, validate it and unlock.
    ///
    /// The unlock step runs on every path once the lock has been requested.
    /// If both the read and the unlock fail, the read error is returned.
    pub async fn fetch_reading(&self) -> Result<ReadingPayload> {
        let mut link = self.link.lock().await;
        let conn = link.connection()?;
        debug!(state = %FetchState::Idle, "Starting fetch");

        let was_locked = exchange(conn, Command::GetLock, NO_ARGUMENT).await?;
        debug!(was_locked, "Lock state before fetch");

        let outcome = read_locked(conn).await;
        debug!(state = %FetchState::Unlocking, "Releasing remote lock");
        let release = release_lock(conn).await;
        debug!(state = %FetchState::Done, ok = outcome.is_ok(), "Fetch complete");

        match (outcome, release) {
            (Ok(payload), Ok(())) => Ok(payload),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!(error = %release_error, "Failed to release remote lock after an earlier error");
                Err(e)
            }
        }
    }

    /// Close the bus connection. Safe to call more than once.
    ///
    /// Afterwards every operation fails with [`SensorError::ConnectionClosed`]
    /// until [`initialize`](Self::initialize) is called again.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if let Link::Open(mut conn) = std::mem::replace(&mut *link, Link::Closed) {
            conn.close();
            info!("Sensor client closed.");
        }
    }
}

/// Write a request, give the firmware time to prepare, read the response.
async fn transact(conn: &mut BusConnection, command: Command, argument: u8) -> Result<Bytes> {
    conn.write(&command.frame(argument).to_bytes())?;
    sleep(SETTLE_DELAY).await;
    conn.read_exact(command.response_len())
}

async fn exchange(conn: &mut BusConnection, command: Command, argument: u8) -> Result<u8> {
    let response = transact(conn, command, argument).await?;
    let value = response[0];
    debug!(%command, argument, value, "Parameter exchanged");
    Ok(value)
}

async fn read_block(conn: &mut BusConnection, index: u8) -> Result<Bytes> {
    let block = transact(conn, Command::GetBlock, index).await?;
    debug!(index, "Block received");
    Ok(block)
}

/// Everything between requesting the lock and validating the payload.
async fn read_locked(conn: &mut BusConnection) -> Result<ReadingPayload> {
    debug!(state = %FetchState::LockRequested, "Requesting remote lock");
    let response = exchange(conn, Command::SetLock, LOCK_ON).await?;
    if response != LOCK_ACQUIRED {
        return Err(SensorError::LockAcquisitionFailed { response });
    }
    debug!(state = %FetchState::Locked, "Remote lock acquired");

    // BlockSize is part of the firmware's expected sequence even though blocks are fixed-size.
    let layout = BlockLayout {
        block_size: exchange(conn, Command::BlockSize, NO_ARGUMENT).await?,
        block_count: exchange(conn, Command::BlockCount, NO_ARGUMENT).await?,
        string_length: exchange(conn, Command::StringLength, NO_ARGUMENT).await?,
    };
    debug!(state = %FetchState::ReadingBlocks, ?layout, "Reading blocks");

    let mut blocks = Vec::with_capacity(usize::from(layout.block_count));
    for index in FIRST_BLOCK..=layout.block_count {
        blocks.push(read_block(conn, index).await?);
    }

    match ReadingPayload::assemble(layout, &blocks) {
        Ok(payload) => {
            debug!(state = %FetchState::Validated, len = payload.expected_len(), "Payload validated");
            Ok(payload)
        }
        Err(e) => {
            debug!(state = %FetchState::Invalid, error = %e, "Payload rejected");
            Err(e)
        }
    }
}

/// Unlock so the sensor can update its buffer, then re-check the lock state.
///
/// Sent even when the lock was refused; the firmware expects the release.
async fn release_lock(conn: &mut BusConnection) -> Result<()> {
    let response = exchange(conn, Command::SetLock, LOCK_OFF).await?;
    if response != LOCK_ACQUIRED {
        debug!(response, "Unlock not acknowledged");
    }
    let still_locked = exchange(conn, Command::GetLock, NO_ARGUMENT).await?;
    debug!(still_locked, "Lock state after fetch");
    Ok(())
}
