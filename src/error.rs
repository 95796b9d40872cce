//! Error types for the serial session engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use serial_shell::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.connect().await?;
//!     session.auto_login().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`], [`Error::InvalidPattern`] |
//! | Connection | [`Error::NoDeviceSelected`], [`Error::DeviceAlreadyOpen`], [`Error::OpenFailed`], [`Error::WrongDevice`], [`Error::NotConnected`] |
//! | Execution | [`Error::CommandInFlight`], [`Error::PatternTimeout`], [`Error::TransportDropped`] |
//! | Composite | [`Error::LoginFailed`], [`Error::Transfer`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Decode`] |
//!
//! Parsers never fail; they skip lines they cannot understand.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;

use crate::session::LoginState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// TransferDirection
// ============================================================================

/// Direction of a file transfer, carried by [`Error::Transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Device to caller (`base64 -- <path>`).
    Download,
    /// Caller to device (`base64 -d` or heredoc).
    Upload,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Completion pattern is empty or does not compile.
    ///
    /// Rejected before anything is written to the device.
    #[error("Invalid pattern: {message}")]
    InvalidPattern {
        /// Description of the pattern problem.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No device address has been configured.
    #[error("No device selected")]
    NoDeviceSelected,

    /// The session already holds an open connection.
    #[error("Device already open")]
    DeviceAlreadyOpen,

    /// The transport adapter could not open the device.
    #[error("Failed to open device: {message}")]
    OpenFailed {
        /// Description of the open failure.
        message: String,
    },

    /// The opened device is not of the expected kind.
    ///
    /// The port is closed again before this is returned.
    #[error("Wrong device: expected {expected}, found {actual}")]
    WrongDevice {
        /// Expected vendor/product identity.
        expected: String,
        /// Identity reported by the adapter.
        actual: String,
    },

    /// Operation needs an open connection but there is none.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Another command is already awaiting its pattern on this connection.
    #[error("A command is already in flight on this connection")]
    CommandInFlight,

    /// The completion pattern did not appear before the deadline.
    #[error("Pattern {pattern:?} not seen after {elapsed_ms}ms")]
    PatternTimeout {
        /// Description of the awaited pattern.
        pattern: String,
        /// Milliseconds waited before giving up.
        elapsed_ms: u64,
    },

    /// The connection went away while an operation was in progress.
    #[error("Transport dropped: {reason}")]
    TransportDropped {
        /// Why the stream ended.
        reason: String,
    },

    /// The remote never presented a prompt during login.
    #[error("Prompt not found after {attempts} attempts")]
    PromptNotFound {
        /// Number of prompt-wait attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Composite Errors
    // ========================================================================
    /// Login sequence failed.
    #[error("Login failed at {stage}: {source}")]
    LoginFailed {
        /// Automaton state in which the failure happened.
        stage: LoginState,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// File transfer failed.
    #[error("{direction} failed{}: {source}", chunk_label(.chunk))]
    Transfer {
        /// Transfer direction.
        direction: TransferDirection,
        /// Zero-based chunk index, when the failure happened mid-stream.
        chunk: Option<usize>,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Payload could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn chunk_label(chunk: &Option<usize>) -> String {
    match chunk {
        Some(index) => format!(" at chunk {index}"),
        None => String::new(),
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid pattern error.
    #[inline]
    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            message: message.into(),
        }
    }

    /// Creates an open failed error.
    #[inline]
    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::OpenFailed {
            message: message.into(),
        }
    }

    /// Creates a wrong device error.
    #[inline]
    pub fn wrong_device(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::WrongDevice {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a pattern timeout error.
    #[inline]
    pub fn pattern_timeout(pattern: impl Into<String>, elapsed: Duration) -> Self {
        Self::PatternTimeout {
            pattern: pattern.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Creates a transport dropped error.
    #[inline]
    pub fn transport_dropped(reason: impl Into<String>) -> Self {
        Self::TransportDropped {
            reason: reason.into(),
        }
    }

    /// Wraps a lower-level failure with the login stage it happened in.
    #[inline]
    pub fn login_failed(stage: LoginState, source: Error) -> Self {
        Self::LoginFailed {
            stage,
            source: Box::new(source),
        }
    }

    /// Wraps a lower-level failure with transfer context.
    #[inline]
    pub fn transfer(direction: TransferDirection, chunk: Option<usize>, source: Error) -> Self {
        Self::Transfer {
            direction,
            chunk,
            source: Box::new(source),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PatternTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NoDeviceSelected
                | Self::DeviceAlreadyOpen
                | Self::OpenFailed { .. }
                | Self::WrongDevice { .. }
                | Self::NotConnected
                | Self::TransportDropped { .. }
        )
    }

    /// Returns `true` if the in-flight operation was aborted by disconnection.
    ///
    /// Looks through login and transfer wrappers.
    #[must_use]
    pub fn is_transport_dropped(&self) -> bool {
        match self {
            Self::TransportDropped { .. } => true,
            Self::LoginFailed { source, .. } | Self::Transfer { source, .. } => {
                source.is_transport_dropped()
            }
            _ => false,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed if the caller retries the whole operation.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PatternTimeout { .. } | Self::CommandInFlight | Self::PromptNotFound { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
