//! Output parsers.
//!
//! Pure functions turning shell and tool output into records. They never
//! fail: lines that cannot be understood are skipped.
//!
//! # Parsers
//!
//! | Function | Input | Record |
//! |----------|-------|--------|
//! | [`parse_ls_output`] | `ls -la` | [`FileListItem`] |
//! | [`parse_find_output`] | `find ... -ls` | [`FileListItem`] |
//! | [`parse_i2cdetect_output`] | `i2cdetect -y 1` | [`I2cDevice`] |
//! | [`parse_iwlist_output`] | `iwlist <if> scan` | [`WifiNetwork`] |
//! | [`parse_ifconfig_output`] | `ifconfig` | [`NetworkInterface`] |
//! | [`parse_exists_output`] | existence check | `bool` |

// ============================================================================
// Submodules
// ============================================================================

/// `ls -la` and `find -ls` listings.
pub mod files;

/// `i2cdetect` bus map.
pub mod i2c;

/// `ifconfig` interfaces.
pub mod net;

/// `iwlist` scan results.
pub mod wifi;

// ============================================================================
// Re-exports
// ============================================================================

pub use files::{FileListItem, parse_find_output, parse_ls_output};
pub use i2c::{I2cDevice, parse_i2cdetect_output};
pub use net::{NetworkInterface, parse_ifconfig_output};
pub use wifi::{WifiNetwork, parse_iwlist_output};

use crate::protocol::command::{EXISTS_MARKER, NOT_FOUND_MARKER};

// ============================================================================
// Existence Check
// ============================================================================

/// Reads the answer of a `test -f|-d ... && echo exists || echo "not found"`
/// check.
///
/// Expects the body only (echo line removed): the echo itself contains
/// both markers.
#[must_use]
pub fn parse_exists_output(body: &str) -> bool {
    let mut exists = false;
    for line in body.lines().map(str::trim) {
        if line == NOT_FOUND_MARKER {
            return false;
        }
        if line == EXISTS_MARKER {
            exists = true;
        }
    }
    exists
}

// ============================================================================
// Tests
// ============================================================================
