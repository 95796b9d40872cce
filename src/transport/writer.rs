//! Serialized write path.
//!
//! All outbound bytes go through one async mutex, so two senders can never
//! interleave bytes mid-command. The lock guard is scoped to a single
//! write call and released on success, failure, or cancellation.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, watch};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::BoxedWriter;

// ============================================================================
// StreamWriter
// ============================================================================

/// Single logical write channel for one connection.
pub struct StreamWriter {
    /// Owning connection, for logs.
    connection_id: ConnectionId,
    /// Write half; `None` after shutdown.
    inner: Mutex<Option<BoxedWriter>>,
    /// Close signal; aborts writes stuck on a dead port.
    closed: watch::Receiver<bool>,
}

impl StreamWriter {
    /// Creates a writer over `writer`, aborting writes once `closed` is set.
    pub(crate) fn new(
        writer: BoxedWriter,
        connection_id: ConnectionId,
        closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connection_id,
            inner: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// Encodes `text` as UTF-8 and writes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the port is closed or the
    /// write fails.
    pub async fn write(&self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes()).await
    }

    /// Writes raw bytes, flushing before the lock is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the port is closed or the
    /// write fails.
    pub async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut closed = self.closed.clone();
        if *closed.borrow() {
            return Err(Error::transport_dropped("connection closed"));
        }

        let mut guard = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => {
                return Err(Error::transport_dropped("connection closed"));
            }
            guard = self.inner.lock() => guard,
        };

        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::transport_dropped("writer shut down"))?;

        let written = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => {
                Err(Error::transport_dropped("connection closed during write"))
            }
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => result.map_err(|e| Error::transport_dropped(e.to_string())),
        };

        trace!(connection_id = %self.connection_id, bytes = bytes.len(), ok = written.is_ok(), "Write finished");
        written
    }

    /// Shuts the write half down and drops it.
    ///
    /// Waits for a write in progress to be released first; callers set the
    /// close signal before calling this so that wait is short.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(connection_id = %self.connection_id, error = %e, "Writer shutdown failed");
            }
            debug!(connection_id = %self.connection_id, "Writer released");
        }
    }

    /// Returns `true` if the writer is currently held by a sender.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

// ============================================================================
// Tests
// ============================================================================
