//! Device-side command lines.
//!
//! Every command the engine types is built here, so the exact text sent
//! to the remote shell lives in one place.
//!
//! # Commands
//!
//! | Variant | Wire text |
//! |---------|-----------|
//! | `ListFiles` | `ls -la [path]` |
//! | `FindFiles` | `find <path> -name "<pattern>" -ls` |
//! | `TestFile` / `TestDirectory` | `test -f\|-d <path> && echo exists \|\| echo "not found"` |
//! | `I2cDetect` | `i2cdetect -y <bus>` |
//! | `ReadBase64` | `base64 -- <path>` |
//! | `WriteBase64` | `base64 -d > <path>` |
//! | `WriteText` | `cat >[>] <path> << 'EOL'` ... `EOL` |
//! | `SetDate` | `sudo date MMDDHHmmYYYY.SS` |
//! | `SetTimezone` | `sudo timedatectl set-timezone <tz>` |
//! | `HistoryControl` | `export HISTCONTROL=ignoreboth` |
//! | `WifiScan` | `sudo iwlist <interface> scan` |
//! | `Ifconfig` | `ifconfig` |
//! | `Exit` | `exit` |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use chrono::NaiveDateTime;

// ============================================================================
// Constants
// ============================================================================

/// Heredoc delimiter for text writes.
pub const HEREDOC_MARKER: &str = "EOL";

/// Output of the existence check when the path exists.
pub const EXISTS_MARKER: &str = "exists";

/// Output of the existence check when the path is missing.
pub const NOT_FOUND_MARKER: &str = "not found";

/// `date` argument layout: `MMDDhhmmYYYY.SS`.
const DATE_FORMAT: &str = "%m%d%H%M%Y.%S";

// ============================================================================
// ControlByte
// ============================================================================

/// Terminal control bytes written outside any command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlByte {
    /// Ctrl-C: interrupt the foreground process.
    Interrupt,
    /// Ctrl-D: end of input.
    EndOfInput,
}

impl ControlByte {
    /// Returns the byte value.
    #[inline]
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Interrupt => 0x03,
            Self::EndOfInput => 0x04,
        }
    }
}

// ============================================================================
// ShellCommand
// ============================================================================

/// A command line understood by the device's shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Long listing of a directory (current directory when `None`).
    ListFiles {
        /// Directory to list.
        path: Option<String>,
    },
    /// Recursive name search.
    FindFiles {
        /// Search root.
        path: String,
        /// Shell glob for `-name`.
        pattern: String,
    },
    /// Regular-file existence check.
    TestFile {
        /// Path to test.
        path: String,
    },
    /// Directory existence check.
    TestDirectory {
        /// Path to test.
        path: String,
    },
    /// I2C bus scan.
    I2cDetect {
        /// Bus number.
        bus: u8,
    },
    /// Print a file as base64.
    ReadBase64 {
        /// File to read.
        path: String,
    },
    /// Start a decode-and-write pipeline fed from the terminal.
    WriteBase64 {
        /// File to write.
        path: String,
    },
    /// Write (or append) literal text via heredoc.
    WriteText {
        /// File to write.
        path: String,
        /// Content; must not contain the marker on a line of its own.
        content: String,
        /// Append instead of truncating.
        append: bool,
    },
    /// Set the system clock.
    SetDate {
        /// Local wall-clock time to set.
        at: NaiveDateTime,
    },
    /// Set the system timezone.
    SetTimezone {
        /// IANA timezone name.
        timezone: String,
    },
    /// Keep automation commands out of shell history.
    HistoryControl,
    /// Scan for wireless networks.
    WifiScan {
        /// Wireless interface.
        interface: String,
    },
    /// Show network interfaces.
    Ifconfig,
    /// Leave the shell.
    Exit,
}

impl ShellCommand {
    /// Renders the command line, without the line terminator.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::ListFiles { path: None } => "ls -la".to_string(),
            Self::ListFiles { path: Some(path) } => format!("ls -la {}", quote_arg(path)),
            Self::FindFiles { path, pattern } => {
                format!(
                    "find {} -name \"{}\" -ls",
                    quote_arg(path),
                    escape_double_quoted(pattern)
                )
            }
            Self::TestFile { path } => existence_check("-f", path),
            Self::TestDirectory { path } => existence_check("-d", path),
            Self::I2cDetect { bus } => format!("i2cdetect -y {bus}"),
            Self::ReadBase64 { path } => format!("base64 -- {}", quote_arg(path)),
            Self::WriteBase64 { path } => format!("base64 -d > {}", quote_arg(path)),
            Self::WriteText {
                path,
                content,
                append,
            } => {
                let redirect = if *append { ">>" } else { ">" };
                let path = quote_arg(path);
                let body = content.strip_suffix('\n').unwrap_or(content);
                if body.is_empty() {
                    format!("cat {redirect} {path} << '{HEREDOC_MARKER}'\n{HEREDOC_MARKER}")
                } else {
                    format!(
                        "cat {redirect} {path} << '{HEREDOC_MARKER}'\n{body}\n{HEREDOC_MARKER}"
                    )
                }
            }
            Self::SetDate { at } => format!("sudo date {}", at.format(DATE_FORMAT)),
            Self::SetTimezone { timezone } => {
                format!("sudo timedatectl set-timezone {}", quote_arg(timezone))
            }
            Self::HistoryControl => "export HISTCONTROL=ignoreboth".to_string(),
            Self::WifiScan { interface } => format!("sudo iwlist {} scan", quote_arg(interface)),
            Self::Ifconfig => "ifconfig".to_string(),
            Self::Exit => "exit".to_string(),
        }
    }
}

fn existence_check(flag: &str, path: &str) -> String {
    format!(
        "test {flag} {} && echo {EXISTS_MARKER} || echo \"{NOT_FOUND_MARKER}\"",
        quote_arg(path)
    )
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Quotes a shell argument only when it needs quoting.
///
/// Plain paths go out verbatim; anything with shell-special characters is
/// single-quoted.
#[must_use]
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-~+,:@=%".contains(c));
    if is_plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

/// Escapes text for use inside double quotes.
///
/// Globs such as `*` stay live for `find`; `$`, backquote, `"` and `\` lose
/// their meaning to the shell.
fn escape_double_quoted(text: &str) -> Cow<'_, str> {
    if !text.contains(['\\', '"', '$', '`']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    #[test]
    fn test_wire_lines() {
        assert_eq!(ShellCommand::ListFiles { path: None }.to_line(), "ls -la");
        assert_eq!(
            ShellCommand::ListFiles {
                path: Some("/home/pi".into())
            }
            .to_line(),
            "ls -la /home/pi"
        );
        assert_eq!(
            ShellCommand::FindFiles {
                path: "/home/pi".into(),
                pattern: "*.py".into()
            }
            .to_line(),
            "find /home/pi -name \"*.py\" -ls"
        );
        assert_eq!(
            ShellCommand::TestFile {
                path: "/boot/config.txt".into()
            }
            .to_line(),
            "test -f /boot/config.txt && echo exists || echo \"not found\""
        );
        assert_eq!(
            ShellCommand::TestDirectory { path: "/tmp".into() }.to_line(),
            "test -d /tmp && echo exists || echo \"not found\""
        );
        assert_eq!(ShellCommand::I2cDetect { bus: 1 }.to_line(), "i2cdetect -y 1");
        assert_eq!(
            ShellCommand::ReadBase64 { path: "a.bin".into() }.to_line(),
            "base64 -- a.bin"
        );
        assert_eq!(
            ShellCommand::WriteBase64 { path: "a.bin".into() }.to_line(),
            "base64 -d > a.bin"
        );
        assert_eq!(
            ShellCommand::SetTimezone {
                timezone: "Asia/Tokyo".into()
            }
            .to_line(),
            "sudo timedatectl set-timezone Asia/Tokyo"
        );
    }

    #[test]
    fn test_heredoc_write_and_append() {
        let write = ShellCommand::WriteText {
            path: "/tmp/a.txt".into(),
            content: "hello\nworld\n".into(),
            append: false,
        };
        assert_eq!(
            write.to_line(),
            "cat > /tmp/a.txt << 'EOL'\nhello\nworld\nEOL"
        );

        let append = ShellCommand::WriteText {
            path: "/tmp/a.txt".into(),
            content: "more".into(),
            append: true,
        };
        assert_eq!(append.to_line(), "cat >> /tmp/a.txt << 'EOL'\nmore\nEOL");

        let empty = ShellCommand::WriteText {
            path: "/tmp/a.txt".into(),
            content: String::new(),
            append: false,
        };
        assert_eq!(empty.to_line(), "cat > /tmp/a.txt << 'EOL'\nEOL");
    }

    #[test]
    fn test_set_date_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 2))
            .expect("valid date");
        assert_eq!(
            ShellCommand::SetDate { at }.to_line(),
            "sudo date 030907052024.02"
        );
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("/home/pi/file.txt"), "/home/pi/file.txt");
        assert_eq!(quote_arg("my file.txt"), "'my file.txt'");
        assert_eq!(quote_arg("it's"), r"'it'\''s'");
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn test_find_pattern_cannot_expand() {
        let line = |pattern: &str| {
            ShellCommand::FindFiles {
                path: "/tmp".into(),
                pattern: pattern.into(),
            }
            .to_line()
        };
        assert_eq!(line("$(rm -rf ~)"), r#"find /tmp -name "\$(rm -rf ~)" -ls"#);
        assert_eq!(line("`reboot`"), r#"find /tmp -name "\`reboot\`" -ls"#);
        assert_eq!(line(r#"a\"b"#), r#"find /tmp -name "a\\\"b" -ls"#);
        assert_eq!(line("*.log"), r#"find /tmp -name "*.log" -ls"#);
    }

    #[test]
    fn test_control_bytes() {
        assert_eq!(ControlByte::Interrupt.as_byte(), 0x03);
        assert_eq!(ControlByte::EndOfInput.as_byte(), 0x04);
    }
}
