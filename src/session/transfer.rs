//! File transfer over the shell.
//!
//! # Wire Protocol
//!
//! | Operation | Commands |
//! |-----------|----------|
//! | Download | `base64 -- <path>`, wait for prompt |
//! | Binary upload | Ctrl-C, `base64 -d > <path>`, one line per 512-char chunk, Ctrl-D, empty line |
//! | Text upload | `cat >[>] <path> << 'EOL'` ... `EOL` in one command |
//!
//! Each chunk is awaited before the next is sent. A failure aborts the
//! transfer with [`Error::Transfer`] naming the chunk; the partial remote
//! file is left for the caller to clean up.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{Error, Result, TransferDirection};
use crate::executor::CommandExecutor;
use crate::protocol::{CommandRequest, ControlByte, HEREDOC_MARKER, Pattern, ShellCommand};

// ============================================================================
// Constants
// ============================================================================

/// Encoded characters per upload line.
pub const CHUNK_SIZE: usize = 512;

/// Extensions treated as binary on download.
const BINARY_EXTENSIONS: &[&str] = &[
    "bin", "img", "iso", "gz", "tgz", "bz2", "xz", "zip", "tar", "7z", "deb", "so", "o", "a",
    "elf", "pyc", "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "mp3", "wav", "ogg", "mp4",
    "avi", "mkv", "pdf", "db", "sqlite", "dtb", "dtbo", "ko",
];

// ============================================================================
// FileContent
// ============================================================================

/// Downloaded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Decoded text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl FileContent {
    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Returns the text if this is a text file.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Consumes into raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// Returns `true` if `path` is treated as text by extension.
///
/// Files without an extension (`.bashrc`, `Makefile`) count as text.
#[must_use]
pub fn is_text_path(path: &str) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return true;
    };
    let ext = ext.to_ascii_lowercase();
    !BINARY_EXTENSIONS.contains(&ext.as_str())
}

// ============================================================================
// EncodedPayload
// ============================================================================

/// Base64 text of an upload, split into fixed-size lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Standard base64, ASCII only.
    encoded: String,
}

impl EncodedPayload {
    /// Encodes `data`.
    #[must_use]
    pub fn encode(data: &[u8]) -> Self {
        Self {
            encoded: Base64Standard.encode(data),
        }
    }

    /// Encoded length in characters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.encoded.len()
    }

    /// Returns `true` for an empty payload.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Number of upload lines: `ceil(len / CHUNK_SIZE)`.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.encoded.len().div_ceil(CHUNK_SIZE)
    }

    /// Upload lines in order.
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        // base64 output is ASCII, so every offset is a char boundary
        (0..self.encoded.len())
            .step_by(CHUNK_SIZE)
            .map(|start| &self.encoded[start..(start + CHUNK_SIZE).min(self.encoded.len())])
    }
}

/// Decodes base64 text as printed by `base64`, ignoring line breaks.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the text is not valid base64.
pub fn decode_payload(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Base64Standard
        .decode(compact.as_bytes())
        .map_err(|e| Error::decode(e.to_string()))
}

// ============================================================================
// UploadReport
// ============================================================================

/// Summary of a finished binary upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Raw payload size.
    pub bytes: usize,
    /// Encoded size.
    pub encoded_len: usize,
    /// Lines sent.
    pub chunks: usize,
}

// ============================================================================
// TransferSession
// ============================================================================

/// One upload or download. Lives for a single call.
pub(crate) struct TransferSession<'a> {
    /// Command executor on the open connection.
    executor: CommandExecutor<'a>,
    /// Shell prompt.
    prompt: &'a str,
    /// Deadlines.
    timeouts: &'a Timeouts,
    /// Remote path.
    path: &'a str,
    /// Payload size, once known.
    total_size: usize,
    /// Next chunk to send.
    chunk_index: usize,
}

impl<'a> TransferSession<'a> {
    /// Creates a transfer for `path`.
    pub(crate) fn new(
        executor: CommandExecutor<'a>,
        prompt: &'a str,
        timeouts: &'a Timeouts,
        path: &'a str,
    ) -> Self {
        Self {
            executor,
            prompt,
            timeouts,
            path,
            total_size: 0,
            chunk_index: 0,
        }
    }

    /// Downloads the file, classifying it by extension.
    ///
    /// A "text" file that is not valid UTF-8 comes back as binary.
    pub(crate) async fn download(mut self) -> Result<FileContent> {
        let fail = |e| Error::transfer(TransferDirection::Download, None, e);

        let line = ShellCommand::ReadBase64 {
            path: self.path.to_string(),
        }
        .to_line();
        let pattern = Pattern::after(&line, self.prompt).map_err(fail)?;
        let request = CommandRequest::new(line.as_str(), pattern, self.timeouts.transfer());

        let output = self.executor.execute(&request).await.map_err(fail)?;
        let payload = output.body_after(&line).join("");
        let bytes = decode_payload(&payload).map_err(fail)?;
        self.total_size = bytes.len();

        debug!(path = self.path, bytes = self.total_size, "Downloaded file");

        if !is_text_path(self.path) {
            return Ok(FileContent::Binary(bytes));
        }
        match String::from_utf8(bytes) {
            Ok(text) => Ok(FileContent::Text(text)),
            Err(e) => {
                warn!(path = self.path, "Text file is not UTF-8, returning bytes");
                Ok(FileContent::Binary(e.into_bytes()))
            }
        }
    }

    /// Uploads bytes through a remote `base64 -d` pipeline.
    pub(crate) async fn upload_binary(mut self, data: &[u8]) -> Result<UploadReport> {
        let fail = |chunk, e| Error::transfer(TransferDirection::Upload, chunk, e);

        let payload = EncodedPayload::encode(data);
        self.total_size = data.len();

        self.executor
            .send_control(ControlByte::Interrupt)
            .await
            .map_err(|e| fail(None, e))?;

        let line = ShellCommand::WriteBase64 {
            path: self.path.to_string(),
        }
        .to_line();
        let start = CommandRequest::new(
            line.as_str(),
            Pattern::echoed_line(&line).map_err(|e| fail(None, e))?,
            self.timeouts.chunk(),
        );
        self.executor
            .execute(&start)
            .await
            .map_err(|e| fail(None, e))?;

        debug!(
            path = self.path,
            bytes = self.total_size,
            chunks = payload.chunk_count(),
            "Upload pipeline started"
        );

        // Each chunk completes on its own echo, never on a line end left over
        // from the previous line.
        for chunk in payload.chunks() {
            let echoed =
                Pattern::echoed_line(chunk).map_err(|e| fail(Some(self.chunk_index), e))?;
            let request = CommandRequest::new(chunk, echoed, self.timeouts.chunk());
            self.executor
                .execute(&request)
                .await
                .map_err(|e| fail(Some(self.chunk_index), e))?;
            self.chunk_index += 1;
        }

        self.executor
            .send_control(ControlByte::EndOfInput)
            .await
            .map_err(|e| fail(None, e))?;
        let finish = CommandRequest::expect("", self.prompt, self.timeouts.command())
            .map_err(|e| fail(None, e))?;
        self.executor
            .execute(&finish)
            .await
            .map_err(|e| fail(None, e))?;

        info!(path = self.path, bytes = self.total_size, chunks = self.chunk_index, "Upload complete");
        Ok(UploadReport {
            bytes: self.total_size,
            encoded_len: payload.len(),
            chunks: self.chunk_index,
        })
    }

    /// Writes or appends text with a single heredoc command.
    pub(crate) async fn upload_text(mut self, content: &str, append: bool) -> Result<()> {
        let fail = |e| Error::transfer(TransferDirection::Upload, None, e);

        if content.lines().any(|line| line == HEREDOC_MARKER) {
            return Err(fail(Error::invalid_argument(format!(
                "content contains a line equal to the heredoc marker {HEREDOC_MARKER}"
            ))));
        }
        self.total_size = content.len();

        let line = ShellCommand::WriteText {
            path: self.path.to_string(),
            content: content.to_string(),
            append,
        }
        .to_line();
        let request = CommandRequest::new(
            line,
            Pattern::heredoc_end(HEREDOC_MARKER).map_err(fail)?,
            self.timeouts.transfer(),
        );
        self.executor.execute(&request).await.map_err(fail)?;

        debug!(path = self.path, bytes = self.total_size, append, "Text written");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
