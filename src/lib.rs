//! Serial Shell - automation engine for headless boards on a serial console.
//!
//! This library drives a device's shell over a byte stream as if a person
//! were typing at it: commands with pattern-based completion and
//! deadlines, an automated console login, and file transfer through
//! `base64` and heredocs.
//!
//! # Architecture
//!
//! ```text
//! Transport → StreamReader ─┬→ CommandExecutor ─→ StreamWriter → Transport
//!                           └→ passive observers (terminal view)
//! ```
//!
//! Key design principles:
//!
//! - Each [`Session`] owns at most one [`Connection`]
//! - One read loop multicasts decoded output to every subscriber
//! - At most one command awaits its pattern per connection
//! - Login and transfer are sequences of executor calls, never raw I/O
//!
//! # Quick Start
//!
//! ```no_run
//! use serial_shell::{Result, Session, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .transport(TcpTransport::new())
//!         .address("192.168.0.20:2000")
//!         .password("raspberry")
//!         .build()?;
//!
//!     session.connect().await?;
//!     session.auto_login().await?;
//!
//!     for item in session.list_files(Some("/home/pi")).await? {
//!         println!("{:>8} {}", item.size, item.name);
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Session configuration and builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`executor`] | Command executor |
//! | [`identifiers`] | Connection, command and subscription IDs |
//! | [`parser`] | Output parsers (`ls`, `find`, `i2cdetect`, `iwlist`, `ifconfig`) |
//! | [`protocol`] | Requests, completion patterns, device command lines |
//! | [`session`] | [`Session`] facade, login, file transfer |
//! | [`transport`] | Transport adapters, read loop, write path |

// ============================================================================
// Modules
// ============================================================================

/// Session configuration.
///
/// Use [`Session::builder()`] or load a [`SessionConfig`] from JSON.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Command executor.
///
/// Writes a command and waits for its completion pattern.
pub mod executor;

/// Identifiers carried in log fields.
pub mod identifiers;

/// Output parsers.
///
/// Pure functions; malformed lines are skipped.
pub mod parser;

/// Shell protocol types.
pub mod protocol;

/// Engine facade: lifecycle, commands, login, files, device queries.
pub mod session;

/// Transport layer.
///
/// Adapters, connection lifecycle, the read loop and the write path.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{DeviceFilter, LoginConfig, PortConfig, SessionBuilder, SessionConfig, Timeouts};

// Error types
pub use error::{Error, Result, TransferDirection};

// Executor
pub use executor::CommandExecutor;

// Identifier types
pub use identifiers::{CommandId, ConnectionId, SubscriptionId};

// Parser records
pub use parser::{FileListItem, I2cDevice, NetworkInterface, WifiNetwork};

// Protocol types
pub use protocol::{CommandOutput, CommandRequest, CompletionTest, ControlByte, Pattern, ShellCommand};

// Session types
pub use session::{FileContent, LoginOutcome, LoginState, Session, UploadReport};

// Transport types
pub use transport::{
    Connection, ConnectionState, DeviceInfo, MemoryTransport, OutputStream, Subscription,
    TcpTransport, Transport, TransportIo,
};
