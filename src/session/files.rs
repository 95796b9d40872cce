//! File operations on [`Session`].

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::parser::{FileListItem, parse_exists_output, parse_find_output, parse_ls_output};
use crate::protocol::ShellCommand;

use super::Session;
use super::transfer::{FileContent, TransferSession, UploadReport};

// ============================================================================
// Constants
// ============================================================================

/// Search root for [`Session::find_files`] when none is given.
const DEFAULT_FIND_ROOT: &str = ".";

// ============================================================================
// Session File Operations
// ============================================================================

impl Session {
    /// Downloads a file.
    ///
    /// Text or binary is decided by extension.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `path` is empty
    /// - [`Error::Transfer`] wrapping the failing step
    pub async fn read_file(&self, path: &str) -> Result<FileContent> {
        require_path(path)?;
        let (_op, conn) = self.begin_operation().await?;
        TransferSession::new(
            CommandExecutor::new(&conn),
            &self.config.login.prompt,
            &self.config.timeouts,
            path,
        )
        .download()
        .await
    }

    /// Replaces a file's content with `content`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `path` is empty
    /// - [`Error::Transfer`] if the write fails or `content` contains a line
    ///   equal to the heredoc marker
    pub async fn write_text_file(&self, path: &str, content: &str) -> Result<()> {
        self.write_text(path, content, false).await
    }

    /// Appends `content` to a file.
    ///
    /// # Errors
    ///
    /// Same as [`Session::write_text_file`].
    pub async fn append_text_file(&self, path: &str, content: &str) -> Result<()> {
        self.write_text(path, content, true).await
    }

    async fn write_text(&self, path: &str, content: &str, append: bool) -> Result<()> {
        require_path(path)?;
        let (_op, conn) = self.begin_operation().await?;
        TransferSession::new(
            CommandExecutor::new(&conn),
            &self.config.login.prompt,
            &self.config.timeouts,
            path,
        )
        .upload_text(content, append)
        .await
    }

    /// Uploads bytes in 512-character base64 lines.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `path` is empty
    /// - [`Error::Transfer`] naming the failing chunk, if any
    pub async fn write_binary_file(&self, path: &str, data: &[u8]) -> Result<UploadReport> {
        require_path(path)?;
        let (_op, conn) = self.begin_operation().await?;
        TransferSession::new(
            CommandExecutor::new(&conn),
            &self.config.login.prompt,
            &self.config.timeouts,
            path,
        )
        .upload_binary(data)
        .await
    }

    /// Lists a directory (the shell's current directory when `None`).
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the prompt does not come back
    pub async fn list_files(&self, path: Option<&str>) -> Result<Vec<FileListItem>> {
        let command = ShellCommand::ListFiles {
            path: path.filter(|p| !p.is_empty()).map(str::to_string),
        };
        let body = self.shell_body(command, self.config.timeouts.command()).await?;
        Ok(parse_ls_output(&body))
    }

    /// Finds entries whose name matches the shell glob `pattern`.
    ///
    /// Searches from the current directory when `path` is `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `pattern` is empty
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the search outlasts the transfer timeout
    pub async fn find_files(&self, pattern: &str, path: Option<&str>) -> Result<Vec<FileListItem>> {
        if pattern.is_empty() {
            return Err(Error::invalid_argument("find pattern must not be empty"));
        }
        let command = ShellCommand::FindFiles {
            path: path
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_FIND_ROOT)
                .to_string(),
            pattern: pattern.to_string(),
        };
        let body = self.shell_body(command, self.config.timeouts.transfer()).await?;
        Ok(parse_find_output(&body))
    }

    /// Returns `true` if `path` is a regular file.
    ///
    /// Any failure (no connection, timeout) reads as `false`.
    pub async fn file_exists(&self, path: &str) -> bool {
        self.check_exists(ShellCommand::TestFile {
            path: path.to_string(),
        })
        .await
    }

    /// Returns `true` if `path` is a directory.
    ///
    /// Any failure (no connection, timeout) reads as `false`.
    pub async fn directory_exists(&self, path: &str) -> bool {
        self.check_exists(ShellCommand::TestDirectory {
            path: path.to_string(),
        })
        .await
    }

    async fn check_exists(&self, command: ShellCommand) -> bool {
        if matches!(
            &command,
            ShellCommand::TestFile { path } | ShellCommand::TestDirectory { path } if path.is_empty()
        ) {
            return false;
        }
        match self.shell_body(command, self.config.timeouts.command()).await {
            Ok(body) => parse_exists_output(&body),
            Err(e) => {
                debug!(error = %e, "Existence check failed");
                false
            }
        }
    }
}

fn require_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::invalid_argument("path must not be empty"));
    }
    Ok(())
}
