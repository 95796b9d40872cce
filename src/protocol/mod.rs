//! Shell protocol types.
//!
//! This module defines what goes over the wire and how completion is
//! recognized.
//!
//! # Protocol Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | [`CommandRequest`] | Engine → Device | Command line, pattern, deadline |
//! | [`CommandOutput`] | Device → Engine | Text captured up to the match |
//! | [`ShellCommand`] | Engine → Device | Exact command lines the engine types |
//! | [`ControlByte`] | Engine → Device | Ctrl-C / Ctrl-D |
//! | [`Pattern`] | - | Completion test over accumulated output |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Device command lines and control bytes |
//! | `pattern` | Completion patterns |
//! | `request` | Request and output types |

// ============================================================================
// Submodules
// ============================================================================

/// Device command lines and control bytes.
pub mod command;

/// Completion patterns.
pub mod pattern;

/// Request and output types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{ControlByte, HEREDOC_MARKER, ShellCommand, quote_arg};
pub use pattern::{CompletionTest, Pattern};
pub use request::{CommandOutput, CommandRequest, LINE_TERMINATOR};
