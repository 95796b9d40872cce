//! Byte-stream transport layer.
//!
//! This module owns the physical link to the device and turns it into
//! one ordered text stream plus one serialized write path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  open()   ┌──────────────┐        ┌──────────────┐
//! │  Transport   │──────────►│  Connection  │◄──────►│  Device      │
//! │  (adapter)   │           │              │ bytes  │  (shell)     │
//! └──────────────┘           │ StreamReader │        └──────────────┘
//!                            │ StreamWriter │
//!                            └──────┬───────┘
//!                                   │ Subscription (text)
//!                      ┌────────────┴────────────┐
//!                      ▼                         ▼
//!               CommandExecutor            OutputStream
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`Transport::open`] - Adapter opens the port and hands back [`TransportIo`]
//! 2. [`Connection::new`] - Spawns the read loop
//! 3. [`Connection::subscribe`] / [`Connection::write`] - Traffic
//! 4. [`Connection::close`] - Stops the reader, fails waiters, releases the writer
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection lifecycle and in-flight guard |
//! | `reader` | Read loop and multicast subscriber registry |
//! | `writer` | Serialized write path |
//! | `decoder` | Incremental UTF-8 decoding |
//! | `tcp` | Serial-over-TCP bridge adapter |
//! | `memory` | In-process pipe adapter |

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle.
pub mod connection;

/// Incremental UTF-8 decoding.
pub mod decoder;

/// In-process pipe adapter.
pub mod memory;

/// Read loop and subscriber registry.
pub mod reader;

/// Serial-over-TCP bridge adapter.
pub mod tcp;

/// Serialized write path.
pub mod writer;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{DeviceFilter, PortConfig};
use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState};
pub use memory::{DeviceEnd, MemoryTransport};
pub use reader::{OutputStream, Subscription};
pub use tcp::TcpTransport;

// ============================================================================
// Types
// ============================================================================

/// Read half handed over by an adapter.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half handed over by an adapter.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// DeviceInfo
// ============================================================================

/// Identity reported by an adapter for the device it opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
}

impl DeviceInfo {
    /// Returns `true` if this device satisfies `filter`.
    #[must_use]
    pub fn matches(&self, filter: &DeviceFilter) -> bool {
        self.vendor_id == filter.vendor_id
            && filter.product_id.is_none_or(|p| p == self.product_id)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

// ============================================================================
// TransportIo
// ============================================================================

/// An opened port: byte-stream read, byte-stream write, identity.
///
/// Dropping both halves closes the port.
pub struct TransportIo {
    /// Byte-stream read primitive.
    pub reader: BoxedReader,
    /// Byte-stream write primitive.
    pub writer: BoxedWriter,
    /// Identity of the opened device, if the adapter knows it.
    pub device: Option<DeviceInfo>,
}

impl TransportIo {
    /// Wraps an already split stream.
    #[must_use]
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            device: None,
        }
    }

    /// Attaches the device identity.
    #[must_use]
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }
}

impl fmt::Debug for TransportIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportIo")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Adapter that owns the physical connection to a device.
///
/// The engine only needs `open`; closing is done by dropping the returned
/// halves, which [`Connection::close`] does deterministically.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the port described by `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoDeviceSelected`](crate::Error::NoDeviceSelected) if no address is configured
    /// - [`Error::OpenFailed`](crate::Error::OpenFailed) if the port cannot be opened
    async fn open(&self, config: &PortConfig) -> Result<TransportIo>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_matches_filter() {
        let device = DeviceInfo {
            vendor_id: 0x0403,
            product_id: 0x6001,
        };
        assert!(device.matches(&DeviceFilter {
            vendor_id: 0x0403,
            product_id: Some(0x6001),
        }));
        assert!(device.matches(&DeviceFilter {
            vendor_id: 0x0403,
            product_id: None,
        }));
        assert!(!device.matches(&DeviceFilter {
            vendor_id: 0x10c4,
            product_id: None,
        }));
    }

    #[test]
    fn test_device_display() {
        let device = DeviceInfo {
            vendor_id: 0x2e8a,
            product_id: 0x000a,
        };
        assert_eq!(device.to_string(), "2e8a:000a");
    }
}
