//! Connection lifecycle.
//!
//! A [`Connection`] identifies one open transport session. It owns the
//! read loop and the write path, and carries the single-writer guard that
//! keeps at most one command in flight.
//!
//! # Closing
//!
//! [`Connection::close`] runs in a fixed order:
//!
//! 1. Raise the close signal (aborts a write stuck on a dead port)
//! 2. Stop the reader (every waiting subscriber gets `TransportDropped`)
//! 3. Shut the writer down (releases the write lock and the port)

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::reader::{OutputStream, StreamReader, Subscription};
use super::writer::StreamWriter;
use super::{DeviceInfo, TransportIo};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No port open.
    Closed,
    /// Adapter is opening the port.
    Opening,
    /// Port open and read loop running.
    Open,
    /// Close in progress.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// InFlightGuard
// ============================================================================

/// Held by the executor while one command awaits its pattern.
pub(crate) struct InFlightGuard<'a> {
    /// Flag cleared on drop.
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One open transport session.
///
/// Exactly one read loop and one write path share the connection.
pub struct Connection {
    /// Connection ID.
    id: ConnectionId,
    /// Identity reported by the adapter.
    device: Option<DeviceInfo>,
    /// Read loop.
    reader: StreamReader,
    /// Write path.
    writer: StreamWriter,
    /// Close signal shared with the writer.
    close_tx: watch::Sender<bool>,
    /// Lifecycle state.
    state: Mutex<ConnectionState>,
    /// Single-writer flag.
    in_flight: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection from an opened port.
    ///
    /// Spawns the read loop; must be called inside a tokio runtime.
    pub fn new(io: TransportIo) -> Self {
        let id = ConnectionId::generate();
        let (close_tx, close_rx) = watch::channel(false);

        let reader = StreamReader::start(io.reader, id);
        let writer = StreamWriter::new(io.writer, id, close_rx);

        debug!(connection_id = %id, device = ?io.device, "Connection created");

        Self {
            id,
            device: io.device,
            reader,
            writer,
            close_tx,
            state: Mutex::new(ConnectionState::Open),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the device identity reported by the adapter.
    #[inline]
    #[must_use]
    pub fn device(&self) -> Option<DeviceInfo> {
        self.device
    }

    /// Returns the lifecycle state.
    ///
    /// A connection whose stream ended on its own reports `Closed`.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let state = *self.state.lock();
        if state == ConnectionState::Open && self.reader.is_finished() {
            ConnectionState::Closed
        } else {
            state
        }
    }

    /// Returns `true` while the port is open and the stream alive.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribes to the output text from this point on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the stream has ended.
    pub fn subscribe(&self) -> Result<Subscription> {
        self.reader.subscribe()
    }

    /// Returns a passive output stream, e.g. for a terminal echo view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the stream has ended.
    pub fn output_stream(&self) -> Result<OutputStream> {
        self.reader.subscribe().map(Subscription::into_stream)
    }

    /// Writes text through the serialized write path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the port is closed.
    pub async fn write(&self, text: &str) -> Result<()> {
        self.writer.write(text).await
    }

    /// Writes raw bytes through the serialized write path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the port is closed.
    pub async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.writer.write_bytes(bytes).await
    }

    /// Returns `true` if a command is awaiting its pattern.
    #[inline]
    #[must_use]
    pub fn has_command_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the single-writer slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandInFlight`] if another command holds it.
    pub(crate) fn begin_command(&self) -> Result<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::CommandInFlight)?;
        Ok(InFlightGuard {
            flag: &self.in_flight,
        })
    }

    /// Closes the connection.
    ///
    /// Idempotent. Pending command waits resolve with
    /// [`Error::TransportDropped`] without waiting for their timeouts.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }
        debug!(connection_id = %self.id, "Closing connection");

        let _ = self.close_tx.send(true);
        self.reader.stop("connection closed").await;
        self.writer.shutdown().await;

        *self.state.lock() = ConnectionState::Closed;
        info!(connection_id = %self.id, "Connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close_tx.send(true);
    }
}

// ============================================================================
// Tests
// ============================================================================
