//! In-process pipe adapter.
//!
//! Connects the engine to a simulated device over a tokio duplex pipe.
//! The test suite drives its fake shell through the [`DeviceEnd`]; the same
//! adapter suits local simulators.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut device) = MemoryTransport::pair();
//! let session = Session::builder().transport(transport).build()?;
//! session.connect().await?;
//! device.write_all(b"raspberrypi login: ").await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{DuplexStream, duplex};
use tracing::debug;

use crate::config::PortConfig;
use crate::error::{Error, Result};

use super::{DeviceInfo, Transport, TransportIo};

// ============================================================================
// Constants
// ============================================================================

/// Pipe capacity per direction.
const PIPE_CAPACITY: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

/// The simulated device's side of the pipe.
pub type DeviceEnd = DuplexStream;

// ============================================================================
// MemoryTransport
// ============================================================================

/// Adapter handing out pre-attached in-memory pipes, one per `open`.
///
/// Clones share the same queue of attached devices.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    /// Engine ends waiting to be opened, oldest first.
    attached: Arc<Mutex<VecDeque<DuplexStream>>>,
    /// Identity reported for every opened pipe.
    device: Option<DeviceInfo>,
}

impl MemoryTransport {
    /// Creates an adapter with no device attached.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter with one device attached.
    #[must_use]
    pub fn pair() -> (Self, DeviceEnd) {
        let transport = Self::new();
        let device = transport.attach();
        (transport, device)
    }

    /// Reports `device` as the identity of opened pipes.
    #[inline]
    #[must_use]
    pub fn with_device_info(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    /// Attaches another device, consumed by the next `open`.
    pub fn attach(&self) -> DeviceEnd {
        let (engine_side, device_side) = duplex(PIPE_CAPACITY);
        self.attached.lock().push_back(engine_side);
        device_side
    }

    /// Returns the number of attached devices not yet opened.
    #[inline]
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.attached.lock().len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, config: &PortConfig) -> Result<TransportIo> {
        let stream = self
            .attached
            .lock()
            .pop_front()
            .ok_or_else(|| Error::open_failed("no in-memory device attached"))?;

        debug!(baud_rate = config.baud_rate, "Opened in-memory device");

        let (reader, writer) = tokio::io::split(stream);
        let io = TransportIo::new(reader, writer);
        Ok(match self.device {
            Some(device) => io.with_device(device),
            None => io,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
