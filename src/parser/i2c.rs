//! `i2cdetect -y <bus>` parser.
//!
//! The bus map is a 16-column grid; each row starts with its base address:
//!
//! ```text
//!      0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f
//! 00:          -- -- -- -- -- -- -- -- -- -- -- -- --
//! 40: -- -- -- -- -- -- -- -- 48 -- -- -- -- -- -- --
//! 60: -- -- -- -- -- -- -- -- 68 -- -- -- -- -- -- --
//! 70: -- -- -- -- -- -- UU 77
//! ```
//!
//! Cells are read by position: `--` is empty, blank is not probed, `UU`
//! is claimed by a kernel driver.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Width of a cell including its leading space.
const CELL_WIDTH: usize = 3;

/// Cells per row.
const CELLS_PER_ROW: usize = 16;

/// Marker for an address claimed by a driver.
const DRIVER_CLAIMED: &str = "UU";

// ============================================================================
// I2cDevice
// ============================================================================

/// A responding I2C address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct I2cDevice {
    /// 7-bit address.
    pub address: u8,
    /// Address is in use by a kernel driver (`UU`) and was not probed.
    pub claimed_by_driver: bool,
}

impl fmt::Display for I2cDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.address)?;
        if self.claimed_by_driver {
            f.write_str(" (driver)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parses `i2cdetect -y` output into the responding addresses, in order.
#[must_use]
pub fn parse_i2cdetect_output(text: &str) -> Vec<I2cDevice> {
    let mut devices = Vec::new();

    for line in text.lines() {
        let Some(base) = row_base(line) else {
            continue;
        };
        let cells = &line[3..];

        for column in 0..CELLS_PER_ROW {
            let start = column * CELL_WIDTH + 1;
            let Some(cell) = cells.get(start..start + 2) else {
                break;
            };
            let Some(address) = base.checked_add(column as u8) else {
                break;
            };

            if cell == DRIVER_CLAIMED {
                devices.push(I2cDevice {
                    address,
                    claimed_by_driver: true,
                });
            } else if u8::from_str_radix(cell, 16).is_ok_and(|value| value == address) {
                devices.push(I2cDevice {
                    address,
                    claimed_by_driver: false,
                });
            }
        }
    }

    devices
}

/// Returns the row's base address for lines like `40: ...`.
fn row_base(line: &str) -> Option<u8> {
    let label = line.get(..3)?;
    let digits = label.strip_suffix(':')?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let base = u8::from_str_radix(digits, 16).ok()?;
    (base % 16 == 0 && base < 0x80).then_some(base)
}

// ============================================================================
// Tests
// ============================================================================
