//! Hardware and network queries on [`Session`].

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::parser::{
    I2cDevice, NetworkInterface, WifiNetwork, parse_i2cdetect_output, parse_ifconfig_output,
    parse_iwlist_output,
};
use crate::protocol::ShellCommand;

use super::Session;

// ============================================================================
// Constants
// ============================================================================

/// The header-pin I2C bus on the target boards.
const DEFAULT_I2C_BUS: u8 = 1;

// ============================================================================
// Session Device Queries
// ============================================================================

impl Session {
    /// Scans I2C bus 1.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the prompt does not come back
    pub async fn detect_i2c_devices(&self) -> Result<Vec<I2cDevice>> {
        let command = ShellCommand::I2cDetect {
            bus: DEFAULT_I2C_BUS,
        };
        let body = self.shell_body(command, self.config.timeouts.command()).await?;
        Ok(parse_i2cdetect_output(&body))
    }

    /// Scans for access points on `interface` (`wlan0`).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `interface` is empty
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the scan outlasts the transfer timeout
    pub async fn scan_wifi(&self, interface: &str) -> Result<Vec<WifiNetwork>> {
        if interface.is_empty() {
            return Err(Error::invalid_argument("interface must not be empty"));
        }
        let command = ShellCommand::WifiScan {
            interface: interface.to_string(),
        };
        let body = self.shell_body(command, self.config.timeouts.transfer()).await?;
        Ok(parse_iwlist_output(&body))
    }

    /// Lists network interfaces.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the prompt does not come back
    pub async fn network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let body = self
            .shell_body(ShellCommand::Ifconfig, self.config.timeouts.command())
            .await?;
        Ok(parse_ifconfig_output(&body))
    }
}
