//! Serial-over-TCP bridge adapter.
//!
//! Talks to a device whose console is exposed on a TCP port by a bridge
//! such as `ser2net`. The bridge fixes the line settings; the configured
//! baud rate is only logged.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::PortConfig;
use crate::error::{Error, Result};

use super::{DeviceInfo, Transport, TransportIo};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for establishing the TCP connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// TcpTransport
// ============================================================================

/// Adapter for serial consoles reachable over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Connect deadline.
    connect_timeout: Duration,
    /// Identity to report for the bridged device.
    device: Option<DeviceInfo>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    /// Creates an adapter with the default connect timeout.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            device: None,
        }
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Declares the identity of the bridged device.
    ///
    /// TCP cannot discover USB identity; set this when the bridge is known
    /// to front a specific adapter and a device filter is configured.
    #[inline]
    #[must_use]
    pub fn with_device_info(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, config: &PortConfig) -> Result<TransportIo> {
        let address = config
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(Error::NoDeviceSelected)?;

        debug!(address, baud_rate = config.baud_rate, "Connecting to serial bridge");

        let stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::open_failed(format!("{address}: {e}"))),
            Err(_) => {
                return Err(Error::open_failed(format!(
                    "{address}: timed out after {}ms",
                    self.connect_timeout.as_millis()
                )));
            }
        };
        stream.set_nodelay(true)?;

        info!(address, "Serial bridge connected");

        let (reader, writer) = stream.into_split();
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
