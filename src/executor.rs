//! Command executor.
//!
//! Writes one command and waits for its completion pattern in the output
//! stream, racing the match against a deadline.
//!
//! # Algorithm
//!
//! 1. Claim the connection's single-writer slot ([`Error::CommandInFlight`] if taken)
//! 2. Subscribe to the output stream
//! 3. Write the command line
//! 4. Accumulate output; on the first match, unsubscribe and return the
//!    text up to and including the match
//! 5. On deadline, unsubscribe and fail with [`Error::PatternTimeout`]
//! 6. On stream failure, fail with [`Error::TransportDropped`] right away
//!
//! Subscribing before writing means output produced between the write and
//! the first poll is never lost.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{CommandOutput, CommandRequest, ControlByte, Pattern};
use crate::transport::{Connection, Subscription};

// ============================================================================
// CommandExecutor
// ============================================================================

/// Runs commands on one connection.
///
/// Borrowing the connection keeps the executor cheap; create one per call
/// site as needed. Overlapping calls on the same connection are rejected,
/// not queued.
#[derive(Debug, Clone, Copy)]
pub struct CommandExecutor<'a> {
    /// Target connection.
    connection: &'a Connection,
}

impl<'a> CommandExecutor<'a> {
    /// Creates an executor over `connection`.
    #[inline]
    #[must_use]
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    /// Executes one request.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandInFlight`] if another command is awaiting its pattern
    /// - [`Error::PatternTimeout`] if the pattern is not seen before the deadline
    /// - [`Error::TransportDropped`] if the connection closes or fails first
    pub async fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.run(request, None).await
    }

    /// Executes one request, then keeps reading until `settle` also matches
    /// or `settle_timeout` passes.
    ///
    /// For answers whose first match is only a prefix of what the caller
    /// needs to see, such as a colon that may start `user@host:~ $`. The
    /// output is not cut at the first match. Running out of settle time is
    /// not an error; the output read so far is returned.
    ///
    /// # Errors
    ///
    /// Same as [`CommandExecutor::execute`].
    pub async fn execute_settled(
        &self,
        request: &CommandRequest,
        settle: &Pattern,
        settle_timeout: Duration,
    ) -> Result<CommandOutput> {
        self.run(request, Some((settle, settle_timeout))).await
    }

    async fn run(
        &self,
        request: &CommandRequest,
        settle: Option<(&Pattern, Duration)>,
    ) -> Result<CommandOutput> {
        let _guard = self.connection.begin_command()?;
        let command_id = CommandId::next();
        let mut subscription = self.connection.subscribe()?;

        let started = Instant::now();
        let deadline = started + request.timeout();

        debug!(
            connection_id = %self.connection.id(),
            command_id = %command_id,
            command = request.log_text(),
            pattern = %request.pattern(),
            timeout_ms = request.timeout().as_millis() as u64,
            "Executing command"
        );

        let wire_text = request.wire_text();
        match timeout_at(deadline, self.connection.write(&wire_text)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command_id = %command_id, "Write did not complete before deadline");
                return Err(Error::pattern_timeout(
                    request.pattern().describe(),
                    started.elapsed(),
                ));
            }
        }

        let matched = Self::await_pattern(&mut subscription, request, started, deadline).await;
        let outcome = match (matched, settle) {
            (Ok((mut text, _)), Some((settle, settle_timeout))) => {
                Self::settle(&mut subscription, &mut text, settle, settle_timeout)
                    .await
                    .map(|()| text)
            }
            (Ok((mut text, end)), None) => {
                text.truncate(end);
                Ok(text)
            }
            (Err(e), _) => Err(e),
        };
        subscription.cancel();

        match &outcome {
            Ok(text) => debug!(
                command_id = %command_id,
                bytes = text.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Pattern matched"
            ),
            Err(e) => debug!(command_id = %command_id, error = %e, "Command failed"),
        }

        outcome.map(|text| CommandOutput::new(text, started.elapsed()))
    }

    /// Waits for the pattern, returning everything read and the match end.
    async fn await_pattern(
        subscription: &mut Subscription,
        request: &CommandRequest,
        started: Instant,
        deadline: Instant,
    ) -> Result<(String, usize)> {
        let mut buffer = String::new();
        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                item = subscription.recv() => match item {
                    Some(Ok(text)) => {
                        buffer.push_str(&text);
                        trace!(bytes = text.len(), total = buffer.len(), "Output received");
                        if let Some(end) = request.pattern().find_end(&buffer) {
                            return Ok((buffer, end));
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(Error::transport_dropped("output stream ended")),
                },

                () = &mut timer => {
                    return Err(Error::pattern_timeout(
                        request.pattern().describe(),
                        started.elapsed(),
                    ));
                }
            }
        }
    }

    /// Appends output to `text` until `settle` matches in it or time runs out.
    async fn settle(
        subscription: &mut Subscription,
        text: &mut String,
        settle: &Pattern,
        settle_timeout: Duration,
    ) -> Result<()> {
        let timer = sleep(settle_timeout);
        tokio::pin!(timer);

        while settle.find_end(text).is_none() {
            tokio::select! {
                item = subscription.recv() => match item {
                    Some(Ok(more)) => text.push_str(&more),
                    Some(Err(e)) => return Err(e),
                    None => return Err(Error::transport_dropped("output stream ended")),
                },

                () = &mut timer => {
                    trace!(pattern = %settle, "Output did not settle");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Writes a control byte outside any command.
    ///
    /// Allowed while a command is in flight; an interrupt is how a stuck
    /// foreground process is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the connection is closed.
    pub async fn send_control(&self, control: ControlByte) -> Result<()> {
        trace!(connection_id = %self.connection.id(), ?control, "Sending control byte");
        self.connection.write_bytes(&[control.as_byte()]).await
    }
}

// ============================================================================
// Tests
// ============================================================================
