//! Command request and output types.
//!
//! A [`CommandRequest`] is immutable once issued and yields exactly one
//! result: a [`CommandOutput`] or a typed [`Error`](crate::Error).

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::Pattern;

// ============================================================================
// Constants
// ============================================================================

/// Appended to every command line.
pub const LINE_TERMINATOR: &str = "\n";

// ============================================================================
// CommandRequest
// ============================================================================

/// One command to type at the remote shell and what to wait for.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Text to type, without the line terminator.
    text: String,
    /// Completion pattern.
    pattern: Pattern,
    /// Deadline for the pattern.
    timeout: Duration,
    /// Keep the text out of logs.
    sensitive: bool,
}

impl CommandRequest {
    /// Creates a request.
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>, pattern: Pattern, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            pattern,
            timeout,
            sensitive: false,
        }
    }

    /// Creates a request waiting for a literal substring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`](crate::Error::InvalidPattern) if
    /// `pattern` is empty.
    pub fn expect(text: impl Into<String>, pattern: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::new(text, Pattern::literal(pattern)?, timeout))
    }

    /// Marks the text as secret (passwords); logs show a placeholder.
    #[inline]
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Returns the command text.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the completion pattern.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the deadline.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` if the text must not be logged.
    #[inline]
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Text as it goes on the wire.
    #[must_use]
    pub fn wire_text(&self) -> String {
        format!("{}{LINE_TERMINATOR}", self.text)
    }

    /// Text safe to put in a log line.
    #[must_use]
    pub fn log_text(&self) -> &str {
        if self.sensitive { "<redacted>" } else { &self.text }
    }
}

// ============================================================================
// CommandOutput
// ============================================================================

/// Captured output of a completed command.
///
/// Holds everything received after the write, up to and including the
/// pattern match. Text after the match is not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured text.
    text: String,
    /// Time from write to match.
    elapsed: Duration,
}

impl CommandOutput {
    /// Creates an output value.
    #[inline]
    #[must_use]
    pub fn new(text: String, elapsed: Duration) -> Self {
        Self { text, elapsed }
    }

    /// Returns the captured text.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the output, returning the captured text.
    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    /// Returns the time from write to match.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Lines between the command's echo and the line holding the match.
    ///
    /// Meant for commands that complete on the shell prompt: the first
    /// line is the echo, the last is the prompt.
    #[must_use]
    pub fn body_lines(&self) -> Vec<&str> {
        let lines: Vec<&str> = self.text.lines().collect();
        if lines.len() <= 2 {
            return Vec::new();
        }
        lines[1..lines.len() - 1].to_vec()
    }

    /// Lines after the line echoing `echo`, without the final prompt line.
    ///
    /// Anything captured before the echo (a stale prompt, say) is skipped.
    /// Falls back to [`CommandOutput::body_lines`] if the echo is missing.
    #[must_use]
    pub fn body_after(&self, echo: &str) -> Vec<&str> {
        let Some(pos) = (!echo.is_empty())
            .then(|| self.text.find(echo))
            .flatten()
        else {
            return self.body_lines();
        };
        let rest = &self.text[pos + echo.len()..];
        let Some(newline) = rest.find('\n') else {
            return Vec::new();
        };
        let mut lines: Vec<&str> = rest[newline + 1..].lines().collect();
        lines.pop();
        lines
    }

    /// [`CommandOutput::body_lines`] joined with `\n`.
    #[must_use]
    pub fn body(&self) -> String {
        self.body_lines().join("\n")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_text_appends_terminator() {
        let request =
            CommandRequest::expect("ls -la", "$", Duration::from_secs(1)).expect("request");
        assert_eq!(request.wire_text(), "ls -la\n");
    }

    #[test]
    fn test_expect_rejects_empty_pattern() {
        assert!(CommandRequest::expect("ls", "", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_sensitive_redacts_log_text() {
        let request = CommandRequest::expect("hunter2", "$", Duration::from_secs(1))
            .expect("request")
            .sensitive();
        assert_eq!(request.log_text(), "<redacted>");
        assert_eq!(request.text(), "hunter2");
    }

    #[test]
    fn test_body_strips_echo_and_prompt() {
        let output = CommandOutput::new(
            "ls -la\r\ntotal 0\r\nfile\r\npi@raspberrypi:".to_string(),
            Duration::from_millis(5),
        );
        assert_eq!(output.body_lines(), vec!["total 0", "file"]);
        assert_eq!(output.body(), "total 0\nfile");
    }

    #[test]
    fn test_body_after_skips_stale_output() {
        let output = CommandOutput::new(
            "pi@raspberrypi:~ $ \r\npi@raspberrypi:~ $ ifconfig\r\neth0: flags\r\npi@raspberrypi:"
                .to_string(),
            Duration::ZERO,
        );
        assert_eq!(output.body_after("ifconfig"), vec!["eth0: flags"]);
        assert!(output.body_after("ls").len() == 2);
    }

    #[test]
    fn test_body_empty_for_short_output() {
        let output = CommandOutput::new("ls\r\npi@raspberrypi:".to_string(), Duration::ZERO);
        assert!(output.body_lines().is_empty());
    }
}
