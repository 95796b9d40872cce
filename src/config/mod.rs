//! Session configuration.
//!
//! Groups everything a [`Session`](crate::Session) needs to know before it
//! opens a port: where the device is, how to log in, and how long to wait
//! for each kind of response.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionConfig`] | Top-level configuration, loadable from JSON |
//! | [`PortConfig`] | Transport address, baud rate and device filter |
//! | [`LoginConfig`] | Credentials, prompt and locale |
//! | [`Timeouts`] | Per-stage deadlines |
//! | [`SessionBuilder`] | Fluent builder |
//!
//! # Example
//!
//! ```ignore
//! use serial_shell::SessionConfig;
//!
//! let config = SessionConfig::from_json_str(r#"{
//!     "port": { "address": "192.168.0.20:2000", "baud_rate": 115200 },
//!     "login": { "login_id": "pi", "password": "raspberry" }
//! }"#)?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for sessions.
pub mod builder;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use builder::SessionBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Default serial rate of the target image's console.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default login for the target image.
pub const DEFAULT_LOGIN_ID: &str = "pi";

/// Default authenticated shell prompt marker.
pub const DEFAULT_PROMPT: &str = "pi@raspberrypi:";

// ============================================================================
// DeviceFilter
// ============================================================================

/// USB identity the opened device must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID, or any product of the vendor when `None`.
    #[serde(default)]
    pub product_id: Option<u16>,
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product_id {
            Some(product_id) => write!(f, "{:04x}:{:04x}", self.vendor_id, product_id),
            None => write!(f, "{:04x}:*", self.vendor_id),
        }
    }
}

// ============================================================================
// PortConfig
// ============================================================================

/// Transport-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Adapter-specific address (`host:port` for TCP bridges).
    pub address: Option<String>,
    /// Baud-equivalent rate.
    pub baud_rate: u32,
    /// Required device identity, checked after open.
    pub device_filter: Option<DeviceFilter>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            address: None,
            baud_rate: DEFAULT_BAUD_RATE,
            device_filter: None,
        }
    }
}

// ============================================================================
// LoginConfig
// ============================================================================

/// Credentials and shell environment for the login automaton.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Login name typed at the `login:` prompt.
    pub login_id: String,
    /// Password typed at the `Password:` prompt.
    pub password: String,
    /// Text that marks an authenticated shell prompt.
    pub prompt: String,
    /// Caller locale (`en`, `ja`, ...).
    pub locale: Option<String>,
    /// Explicit timezone, overriding the locale mapping.
    pub timezone: Option<String>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            login_id: DEFAULT_LOGIN_ID.to_string(),
            password: String::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            locale: None,
            timezone: None,
        }
    }
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .field("prompt", &self.prompt)
            .field("locale", &self.locale)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl LoginConfig {
    /// Returns the timezone the device should be switched to, if any.
    ///
    /// An explicit `timezone` wins; otherwise only locales that imply a
    /// timezone produce one.
    #[must_use]
    pub fn effective_timezone(&self) -> Option<&str> {
        if let Some(tz) = self.timezone.as_deref() {
            return Some(tz);
        }
        self.locale.as_deref().and_then(timezone_for_locale)
    }
}

/// Maps a caller locale to the timezone the device should use.
#[must_use]
pub fn timezone_for_locale(locale: &str) -> Option<&'static str> {
    let language = locale.split(['-', '_']).next().unwrap_or(locale);
    match language.to_ascii_lowercase().as_str() {
        "ja" => Some("Asia/Tokyo"),
        _ => None,
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Per-stage deadlines, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Each prompt-wait attempt during login.
    pub prompt_wait_ms: u64,
    /// Waiting for `Password:` after the login name.
    pub password_prompt_ms: u64,
    /// Waiting for the shell after the password; first boot is slow.
    pub shell_prompt_ms: u64,
    /// Ordinary helper commands (`ls`, `test`, setup commands).
    pub command_ms: u64,
    /// Pipeline start and per-chunk echo during upload.
    pub chunk_ms: u64,
    /// Whole-file download and heredoc writes. Also bounds the long-running
    /// queries, `find` and the `iwlist` scan, which outlast `command_ms` on
    /// a busy board.
    pub transfer_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            prompt_wait_ms: 1_000,
            password_prompt_ms: 5_000,
            shell_prompt_ms: 30_000,
            command_ms: 10_000,
            chunk_ms: 1_000,
            transfer_ms: 60_000,
        }
    }
}

impl Timeouts {
    /// Prompt-wait deadline.
    #[inline]
    #[must_use]
    pub fn prompt_wait(&self) -> Duration {
        Duration::from_millis(self.prompt_wait_ms)
    }

    /// Password prompt deadline.
    #[inline]
    #[must_use]
    pub fn password_prompt(&self) -> Duration {
        Duration::from_millis(self.password_prompt_ms)
    }

    /// Shell prompt deadline.
    #[inline]
    #[must_use]
    pub fn shell_prompt(&self) -> Duration {
        Duration::from_millis(self.shell_prompt_ms)
    }

    /// Helper command deadline.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    /// Chunk echo deadline.
    #[inline]
    #[must_use]
    pub fn chunk(&self) -> Duration {
        Duration::from_millis(self.chunk_ms)
    }

    /// Transfer deadline, also used by `find` and wireless scans.
    #[inline]
    #[must_use]
    pub fn transfer(&self) -> Duration {
        Duration::from_millis(self.transfer_ms)
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Complete configuration for one engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Transport settings.
    pub port: PortConfig,
    /// Login settings.
    pub login: LoginConfig,
    /// Deadlines.
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not valid configuration JSON
    /// - [`Error::Config`] if the values fail validation
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`SessionConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.port.baud_rate == 0 {
            return Err(Error::config("Baud rate must be greater than zero"));
        }
        if self.login.prompt.is_empty() {
            return Err(Error::config("Shell prompt marker must not be empty"));
        }
        if self.login.login_id.contains('\n') || self.login.password.contains('\n') {
            return Err(Error::config("Credentials must be single-line"));
        }
        let t = &self.timeouts;
        if [
            t.prompt_wait_ms,
            t.password_prompt_ms,
            t.shell_prompt_ms,
            t.command_ms,
            t.chunk_ms,
            t.transfer_ms,
        ]
        .contains(&0)
        {
            return Err(Error::config("Timeouts must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
