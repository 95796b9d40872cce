//! Completion patterns.
//!
//! A [`Pattern`] decides when accumulated output means a command is done.
//! Substring matching is the default; regular expressions and arbitrary
//! predicates plug in without touching the executor.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Error, Result};

// ============================================================================
// CompletionTest
// ============================================================================

/// Pluggable completion test over the accumulated output.
pub trait CompletionTest: Send + Sync {
    /// Returns the byte offset just past the first match, if any.
    fn find_end(&self, buffer: &str) -> Option<usize>;
}

impl<F> CompletionTest for F
where
    F: Fn(&str) -> Option<usize> + Send + Sync,
{
    fn find_end(&self, buffer: &str) -> Option<usize> {
        self(buffer)
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// What the executor waits for after writing a command.
///
/// A command whose own echo contains the pattern will match that echo;
/// the shell prompt is the usual safe choice.
#[derive(Clone)]
pub enum Pattern {
    /// Plain substring. `$` and friends are literal here.
    Literal(String),
    /// Regular expression.
    Regex(Regex),
    /// Caller-supplied test.
    Custom {
        /// Shown in logs and timeout errors.
        label: String,
        /// The test.
        test: Arc<dyn CompletionTest>,
    },
}

impl Pattern {
    /// Creates a substring pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if `text` is empty.
    pub fn literal(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::invalid_pattern("pattern must not be empty"));
        }
        Ok(Self::Literal(text))
    }

    /// Creates a regular-expression pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the expression is empty, does
    /// not compile, or matches the empty string (it would complete
    /// before any output).
    pub fn regex(expr: &str) -> Result<Self> {
        if expr.is_empty() {
            return Err(Error::invalid_pattern("pattern must not be empty"));
        }
        let re = Regex::new(expr).map_err(|e| Error::invalid_pattern(e.to_string()))?;
        if re.is_match("") {
            return Err(Error::invalid_pattern(format!(
                "pattern {expr:?} matches empty output"
            )));
        }
        Ok(Self::Regex(re))
    }

    /// Creates a pattern from a yes/no predicate.
    ///
    /// On a match everything accumulated so far is returned.
    pub fn custom(
        label: impl Into<String>,
        matched: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            label: label.into(),
            test: Arc::new(move |buffer: &str| matched(buffer).then_some(buffer.len())),
        }
    }

    /// Matches the echo of `line` up to its line end.
    ///
    /// The echo and its `\r\n` may arrive in separate reads; a bare newline
    /// left over from an earlier line does not count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if `line` is empty.
    pub fn echoed_line(line: &str) -> Result<Self> {
        if line.is_empty() {
            return Err(Error::invalid_pattern("echoed line must not be empty"));
        }
        Self::after(line, "\n")
    }

    /// Matches a heredoc close marker on its own line.
    ///
    /// The shell's `> ` continuation prefix is allowed, so the echo of the
    /// opening `<< 'EOL'` line does not count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if `marker` is empty.
    pub fn heredoc_end(marker: &str) -> Result<Self> {
        if marker.is_empty() {
            return Err(Error::invalid_pattern("heredoc marker must not be empty"));
        }
        Self::regex(&format!(r"(?m)^(?:> )?{}\r?$", regex::escape(marker)))
    }

    /// Matches `then` only once it appears after `first`.
    ///
    /// With `first` set to a command's echo and `then` to the shell prompt,
    /// a stale prompt left over from an earlier command cannot complete the
    /// wait.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if `then` is empty.
    pub fn after(first: &str, then: &str) -> Result<Self> {
        if then.is_empty() {
            return Err(Error::invalid_pattern("pattern must not be empty"));
        }
        if first.is_empty() {
            return Self::literal(then);
        }
        let (first, then) = (first.to_string(), then.to_string());
        let label = format!("{first} .. {then}");
        let test = move |buffer: &str| {
            let start = buffer.find(first.as_str())? + first.len();
            buffer[start..]
                .find(then.as_str())
                .map(|pos| start + pos + then.len())
        };
        Ok(Self::Custom {
            label,
            test: Arc::new(test),
        })
    }

    /// Returns the byte offset just past the first match in `buffer`.
    #[must_use]
    pub fn find_end(&self, buffer: &str) -> Option<usize> {
        match self {
            Self::Literal(text) => buffer.find(text.as_str()).map(|start| start + text.len()),
            Self::Regex(re) => re.find(buffer).map(|m| m.end()),
            Self::Custom { test, .. } => test.find_end(buffer),
        }
    }

    /// Returns `true` if `buffer` contains a match.
    #[inline]
    #[must_use]
    pub fn is_match(&self, buffer: &str) -> bool {
        self.find_end(buffer).is_some()
    }

    /// Human-readable description for logs and errors.
    #[must_use]
    pub fn describe(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Regex(re) => re.as_str(),
            Self::Custom { label, .. } => label,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Custom { label, .. } => f.debug_struct("Custom").field("label", label).finish(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_literal_rejected() {
        assert!(matches!(
            Pattern::literal(""),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_literal_dollar_is_literal() {
        let pattern = Pattern::literal("$").expect("pattern");
        assert_eq!(pattern.find_end("pi@raspberrypi:~ $ "), Some(18));
        assert_eq!(pattern.find_end("no prompt"), None);
    }

    #[test]
    fn test_literal_end_offset_includes_match() {
        let pattern = Pattern::literal("Password:").expect("pattern");
        let buffer = "pi\r\nPassword: ";
        let end = pattern.find_end(buffer).expect("match");
        assert_eq!(&buffer[..end], "pi\r\nPassword:");
    }

    #[test]
    fn test_regex_rejections() {
        assert!(Pattern::regex("").is_err());
        assert!(Pattern::regex("(unclosed").is_err());
        assert!(Pattern::regex("a*").is_err());
    }

    #[test]
    fn test_escaped_regex_dollar() {
        let pattern = Pattern::regex(&regex::escape("$")).expect("pattern");
        assert!(pattern.is_match("~ $ "));
        assert!(!pattern.is_match("~ # "));
    }

    #[test]
    fn test_custom_predicate() {
        let pattern = Pattern::custom("two lines", |buf| buf.matches('\n').count() >= 2);
        assert_eq!(pattern.find_end("a\nb"), None);
        assert_eq!(pattern.find_end("a\nb\nc"), Some(5));
        assert_eq!(pattern.describe(), "two lines");
    }

    #[test]
    fn test_after_ignores_stale_prompt() {
        let pattern = Pattern::after("ls -la", "pi@raspberrypi:").expect("pattern");
        assert_eq!(pattern.find_end("pi@raspberrypi:~ $ "), None);

        let buffer = "pi@raspberrypi:~ $ ls -la\r\ntotal 0\r\npi@raspberrypi:~ $ ";
        let end = pattern.find_end(buffer).expect("match");
        assert!(buffer[..end].ends_with("total 0\r\npi@raspberrypi:"));
    }

    #[test]
    fn test_after_with_empty_first_is_literal() {
        let pattern = Pattern::after("", "$").expect("pattern");
        assert!(matches!(pattern, Pattern::Literal(_)));
        assert!(Pattern::after("ls", "").is_err());
    }

    #[test]
    fn test_echoed_line_waits_for_own_line_end() {
        let pattern = Pattern::echoed_line("aGVsbG8=").expect("pattern");

        // Line end of the previous echo, arriving late
        assert_eq!(pattern.find_end("\r\n"), None);
        assert_eq!(pattern.find_end("\r\naGVsbG8="), None);

        let buffer = "\r\naGVsbG8=\r\n";
        assert_eq!(pattern.find_end(buffer), Some(buffer.len()));
        assert!(Pattern::echoed_line("").is_err());
    }

    #[test]
    fn test_heredoc_end_ignores_opening_line() {
        let pattern = Pattern::heredoc_end("EOL").expect("pattern");
        assert!(!pattern.is_match("cat > /tmp/a << 'EOL'\r\n> hello\r\n"));
        assert!(pattern.is_match("cat > /tmp/a << 'EOL'\r\n> hello\r\n> EOL\r\n"));
        assert!(pattern.is_match("hello\nEOL"));
    }
}
