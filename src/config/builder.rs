//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use serial_shell::{Session, TcpTransport};
//!
//! # fn example() -> serial_shell::Result<()> {
//! let session = Session::builder()
//!     .transport(TcpTransport::new())
//!     .address("192.168.0.20:2000")
//!     .password("raspberry")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;

use super::{DeviceFilter, SessionConfig, Timeouts};

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`] instance.
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionBuilder {
    /// Transport adapter.
    transport: Option<Arc<dyn Transport>>,
    /// Accumulated configuration.
    config: SessionConfig,
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport adapter.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets a shared transport adapter.
    #[inline]
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the whole configuration.
    ///
    /// Later setters still apply on top of it.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the device address.
    #[inline]
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.port.address = Some(address.into());
        self
    }

    /// Sets the baud rate.
    #[inline]
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.port.baud_rate = baud_rate;
        self
    }

    /// Requires the opened device to report this identity.
    #[inline]
    #[must_use]
    pub fn device_filter(mut self, filter: DeviceFilter) -> Self {
        self.config.port.device_filter = Some(filter);
        self
    }

    /// Sets the login name.
    #[inline]
    #[must_use]
    pub fn login_id(mut self, login_id: impl Into<String>) -> Self {
        self.config.login.login_id = login_id.into();
        self
    }

    /// Sets the password.
    #[inline]
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.login.password = password.into();
        self
    }

    /// Sets the authenticated shell prompt marker.
    #[inline]
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.login.prompt = prompt.into();
        self
    }

    /// Sets the caller locale.
    #[inline]
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.login.locale = Some(locale.into());
        self
    }

    /// Sets an explicit device timezone.
    #[inline]
    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.config.login.timezone = Some(timezone.into());
        self
    }

    /// Sets the deadlines.
    #[inline]
    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was set
    /// - [`Error::Config`] if the configuration fails validation
    pub fn build(self) -> Result<Session> {
        let transport = self.transport.ok_or_else(|| {
            Error::config(
                "A transport adapter is required. Use .transport() to set it.\n\
                 Example: Session::builder().transport(TcpTransport::new())",
            )
        })?;
        self.config.validate()?;
        Ok(Session::new(transport, self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================
