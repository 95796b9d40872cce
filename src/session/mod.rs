//! Session facade.
//!
//! A [`Session`] is one logical engine instance: it owns at most one open
//! [`Connection`] and exposes the caller-facing operations.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::builder()
//!     .transport(TcpTransport::new())
//!     .address("192.168.0.20:2000")
//!     .password("raspberry")
//!     .build()?;
//!
//! session.connect().await?;
//! session.auto_login().await?;
//!
//! for item in session.list_files(Some("/home/pi")).await? {
//!     println!("{} {}", item.name, item.size);
//! }
//!
//! session.disconnect().await;
//! ```
//!
//! # Concurrency
//!
//! Whole operations (a login, a transfer, a listing) queue behind one
//! async lock, so one caller's commands never interleave with another's.
//! [`Session::disconnect`] and the raw terminal writes do not queue:
//! disconnecting resolves whatever operation is waiting.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `login` | Login automaton |
//! | `transfer` | File transfer over `base64` and heredocs |
//! | `files` | File operations on [`Session`] |
//! | `device` | Hardware and network queries on [`Session`] |

// ============================================================================
// Submodules
// ============================================================================

/// Hardware and network queries.
mod device;

/// File operations.
mod files;

/// Login automaton.
pub mod login;

/// File transfer protocol.
pub mod transfer;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{LoginConfig, SessionBuilder, SessionConfig};
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::protocol::{CommandOutput, CommandRequest, ControlByte, Pattern, ShellCommand};
use crate::transport::{Connection, ConnectionState, OutputStream, Transport};

use login::{LOGIN_PROMPT, LoginAutomaton};

// ============================================================================
// Re-exports
// ============================================================================

pub use login::{LoginOutcome, LoginState, PROMPT_ATTEMPTS, PROMPT_RETRY_DELAY};
pub use transfer::{CHUNK_SIZE, EncodedPayload, FileContent, UploadReport};

// ============================================================================
// Types
// ============================================================================

/// Connection slot. At most one connection per session.
enum Slot {
    /// Nothing open.
    Closed,
    /// `connect` in progress, tagged with its attempt number.
    Opening(u64),
    /// Open connection.
    Open(Arc<Connection>),
}

// ============================================================================
// Session
// ============================================================================

/// One serial shell session.
///
/// Construct with [`Session::builder`]. One session drives one device.
pub struct Session {
    /// Adapter that opens the port.
    transport: Arc<dyn Transport>,
    /// Port, login and timeout settings.
    config: SessionConfig,
    /// Current connection.
    slot: Mutex<Slot>,
    /// Numbers connect attempts.
    connect_attempts: AtomicU64,
    /// Serializes whole operations.
    op_lock: AsyncMutex<()>,
    /// Set by a successful login, cleared by logout and disconnect.
    logged_in: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("logged_in", &self.is_logged_in())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a session. Nothing is opened until [`Session::connect`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            slot: Mutex::new(Slot::Closed),
            connect_attempts: AtomicU64::new(0),
            op_lock: AsyncMutex::new(()),
            logged_in: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the port and starts reading.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceAlreadyOpen`] if a connection is open or opening
    /// - [`Error::NoDeviceSelected`] if no address is configured
    /// - [`Error::OpenFailed`] if the adapter cannot open the port
    /// - [`Error::WrongDevice`] if the device does not match the filter
    /// - [`Error::OpenFailed`] if [`Session::disconnect`] ran while the
    ///   port was opening; the fresh connection is closed again
    pub async fn connect(&self) -> Result<()> {
        let attempt = self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Opening(_) => return Err(Error::DeviceAlreadyOpen),
                Slot::Open(conn) if conn.is_open() => return Err(Error::DeviceAlreadyOpen),
                Slot::Open(_) | Slot::Closed => *slot = Slot::Opening(attempt),
            }
        }

        let opened = self.open_connection().await;

        let conn = {
            let mut slot = self.slot.lock();
            let current = matches!(&*slot, Slot::Opening(a) if *a == attempt);
            match opened {
                Ok(conn) if current => {
                    info!(connection_id = %conn.id(), device = ?conn.device(), "Connected");
                    *slot = Slot::Open(Arc::new(conn));
                    return Ok(());
                }
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Connect failed");
                    if current {
                        *slot = Slot::Closed;
                    }
                    return Err(e);
                }
            }
        };

        // Disconnected while opening: the slot belongs to someone else now
        warn!(connection_id = %conn.id(), "Disconnected while opening");
        conn.close().await;
        Err(Error::open_failed("disconnected while opening"))
    }

    async fn open_connection(&self) -> Result<Connection> {
        let io = self.transport.open(&self.config.port).await.map_err(|e| {
            if e.is_connection_error() {
                e
            } else {
                Error::open_failed(e.to_string())
            }
        })?;
        let conn = Connection::new(io);

        if let Some(filter) = &self.config.port.device_filter {
            let matched = conn.device().is_some_and(|device| device.matches(filter));
            if !matched {
                let actual = conn
                    .device()
                    .map_or_else(|| "unknown".to_string(), |device| device.to_string());
                conn.close().await;
                return Err(Error::wrong_device(filter.to_string(), actual));
            }
        }

        Ok(conn)
    }

    /// Closes the connection.
    ///
    /// Idempotent. An operation waiting on the device fails with
    /// [`Error::TransportDropped`] right away.
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Closed);
        self.logged_in.store(false, Ordering::Release);

        if let Slot::Open(conn) = previous {
            conn.close().await;
            info!(connection_id = %conn.id(), "Disconnected");
        }
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match &*self.slot.lock() {
            Slot::Closed => ConnectionState::Closed,
            Slot::Opening(_) => ConnectionState::Opening,
            Slot::Open(conn) => conn.state(),
        }
    }

    /// Returns `true` after a successful [`Session::auto_login`] on the
    /// current connection.
    #[inline]
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire) && self.state() == ConnectionState::Open
    }

    /// Returns the open connection.
    fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.slot.lock() {
            Slot::Open(conn) if conn.is_open() => Ok(Arc::clone(conn)),
            _ => Err(Error::NotConnected),
        }
    }

    /// Waits for exclusive use of the connection.
    async fn begin_operation(&self) -> Result<(AsyncMutexGuard<'_, ()>, Arc<Connection>)> {
        let guard = self.op_lock.lock().await;
        let conn = self.connection()?;
        Ok((guard, conn))
    }

    // ========================================================================
    // Raw I/O
    // ========================================================================

    /// Subscribes a passive observer (a terminal view) to the output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub fn subscribe_output(&self) -> Result<OutputStream> {
        self.connection()?.output_stream()
    }

    /// Sends Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub async fn send_interrupt(&self) -> Result<()> {
        let conn = self.connection()?;
        CommandExecutor::new(&conn)
            .send_control(ControlByte::Interrupt)
            .await
    }

    /// Sends Ctrl-D.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub async fn send_end_of_input(&self) -> Result<()> {
        let conn = self.connection()?;
        CommandExecutor::new(&conn)
            .send_control(ControlByte::EndOfInput)
            .await
    }

    /// Writes keystrokes as-is, without waiting for output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub async fn write_raw(&self, text: &str) -> Result<()> {
        self.connection()?.write(text).await
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Runs `text` and returns the output up to the first `pattern`.
    ///
    /// `pattern` is a plain substring.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPattern`] if `pattern` is empty
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the pattern is not seen in time
    /// - [`Error::TransportDropped`] if the connection goes away
    pub async fn execute_command(
        &self,
        text: &str,
        pattern: &str,
        timeout: Duration,
    ) -> Result<String> {
        let request = CommandRequest::expect(text, pattern, timeout)?;
        self.execute(&request).await.map(CommandOutput::into_text)
    }

    /// Runs a prepared request.
    ///
    /// # Errors
    ///
    /// Same as [`Session::execute_command`].
    pub async fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        let (_op, conn) = self.begin_operation().await?;
        CommandExecutor::new(&conn).execute(request).await
    }

    /// Runs a device command to the prompt and returns its body.
    pub(crate) async fn shell_body(&self, command: ShellCommand, timeout: Duration) -> Result<String> {
        let line = command.to_line();
        let pattern = Pattern::after(&line, &self.config.login.prompt)?;
        let request = CommandRequest::new(line.as_str(), pattern, timeout);

        let output = self.execute(&request).await?;
        Ok(output.body_after(&line).join("\n"))
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Logs in with the configured credentials.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::LoginFailed`] naming the failing step
    pub async fn auto_login(&self) -> Result<LoginOutcome> {
        self.login_with(&self.config.login).await
    }

    /// Logs in with explicit credentials.
    ///
    /// # Errors
    ///
    /// Same as [`Session::auto_login`], plus [`Error::Config`] for an empty
    /// prompt.
    pub async fn auto_login_with(&self, config: &LoginConfig) -> Result<LoginOutcome> {
        if config.prompt.is_empty() {
            return Err(Error::config("Shell prompt marker must not be empty"));
        }
        self.login_with(config).await
    }

    async fn login_with(&self, config: &LoginConfig) -> Result<LoginOutcome> {
        let (_op, conn) = self.begin_operation().await?;
        self.logged_in.store(false, Ordering::Release);

        debug!(connection_id = %conn.id(), login_id = %config.login_id, "Starting login");
        let outcome =
            LoginAutomaton::new(CommandExecutor::new(&conn), config, &self.config.timeouts)
                .run()
                .await?;

        self.logged_in.store(true, Ordering::Release);
        Ok(outcome)
    }

    /// Leaves the shell and waits for the console login prompt.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::PatternTimeout`] if the login prompt does not appear
    pub async fn logout(&self) -> Result<()> {
        let (_op, conn) = self.begin_operation().await?;
        let request = CommandRequest::expect(
            ShellCommand::Exit.to_line(),
            LOGIN_PROMPT,
            self.config.timeouts.command(),
        )?;
        CommandExecutor::new(&conn).execute(&request).await?;

        self.logged_in.store(false, Ordering::Release);
        info!(connection_id = %conn.id(), "Logged out");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use async_trait::async_trait;
    use tokio::io::duplex;
    use tokio::sync::Notify;

    use crate::config::{DeviceFilter, PortConfig};
    use crate::transport::{DeviceInfo, MemoryTransport, TransportIo};

    /// Opens a pipe once the test opens the gate.
    struct GatedTransport {
        gate: Arc<Notify>,
        device: Mutex<Option<tokio::io::DuplexStream>>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn open(&self, _config: &PortConfig) -> Result<TransportIo> {
            self.gate.notified().await;
            let (engine_side, device_side) = duplex(1024);
            *self.device.lock() = Some(device_side);
            let (reader, writer) = tokio::io::split(engine_side);
            Ok(TransportIo::new(reader, writer))
        }
    }

    fn session_with(transport: MemoryTransport) -> Session {
        Session::builder()
            .transport(transport)
            .build()
            .expect("session")
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let (transport, _device) = MemoryTransport::pair();
        let session = session_with(transport);

        session.connect().await.expect("connect");
        assert_eq!(session.state(), ConnectionState::Open);
        assert!(matches!(
            session.connect().await,
            Err(Error::DeviceAlreadyOpen)
        ));
    }

    #[tokio::test]
    async fn test_connect_without_device_fails() {
        let session = session_with(MemoryTransport::new());
        let err = session.connect().await.expect_err("nothing attached");
        assert!(matches!(err, Error::OpenFailed { .. }));
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_wrong_device_closes_port() {
        let (transport, _device) = MemoryTransport::pair();
        let transport = transport.with_device_info(DeviceInfo {
            vendor_id: 0x10c4,
            product_id: 0xea60,
        });
        let session = Session::builder()
            .transport(transport)
            .device_filter(DeviceFilter {
                vendor_id: 0x0403,
                product_id: Some(0x6001),
            })
            .build()
            .expect("session");

        let err = session.connect().await.expect_err("filtered");
        assert!(matches!(err, Error::WrongDevice { .. }));
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_while_opening_wins() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(GatedTransport {
            gate: Arc::clone(&gate),
            device: Mutex::new(None),
        });
        let session = Arc::new(Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            SessionConfig::default(),
        ));

        let connecting = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.connect().await })
        };
        while session.state() != ConnectionState::Opening {
            tokio::task::yield_now().await;
        }

        session.disconnect().await;
        gate.notify_one();

        let err = connecting.await.expect("join").expect_err("disconnected");
        assert!(matches!(err, Error::OpenFailed { .. }));
        assert_eq!(session.state(), ConnectionState::Closed);

        // The late connection was closed, not leaked
        let mut device = transport.device.lock().take().expect("opened");
        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).await.expect("read"), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (transport, _device) = MemoryTransport::pair();
        let session = session_with(transport);

        session.disconnect().await;
        session.connect().await.expect("connect");
        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let session = session_with(MemoryTransport::new());
        let err = session
            .execute_command("ls", "$", Duration::from_secs(1))
            .await
            .expect_err("not connected");
        assert!(matches!(err, Error::NotConnected));
        assert!(matches!(session.send_interrupt().await, Err(Error::NotConnected)));
        assert!(session.subscribe_output().is_err());
    }

    #[tokio::test]
    async fn test_empty_pattern_rejected_before_write() {
        let (transport, _device) = MemoryTransport::pair();
        let session = session_with(transport);
        session.connect().await.expect("connect");

        let err = session
            .execute_command("ls", "", Duration::from_secs(1))
            .await
            .expect_err("empty pattern");
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_raw_writes_reach_device() {
        let (transport, mut device) = MemoryTransport::pair();
        let session = session_with(transport);
        session.connect().await.expect("connect");

        session.write_raw("ls").await.expect("write");
        session.send_interrupt().await.expect("interrupt");
        session.send_end_of_input().await.expect("eot");

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"ls\x03\x04");
    }

    #[tokio::test]
    async fn test_subscribe_output_sees_device_text() {
        use futures_util::StreamExt;

        let (transport, mut device) = MemoryTransport::pair();
        let session = session_with(transport);
        session.connect().await.expect("connect");

        let mut stream = session.subscribe_output().expect("stream");
        device.write_all(b"boot ok\r\n").await.expect("write");
        assert_eq!(stream.next().await.expect("item").expect("text"), "boot ok\r\n");
    }
}
