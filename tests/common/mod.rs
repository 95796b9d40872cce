//! Scripted fake device for integration tests.
//!
//! Emulates a Raspberry Pi serial console closely enough for the engine:
//! getty login, a bash-like prompt with echo, `base64` pipelines, heredocs
//! and a handful of canned tools.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::Mutex;
use serial_shell::{MemoryTransport, Session, Timeouts};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

pub const PROMPT: &str = "pi@raspberrypi:~ $ ";
pub const LOGIN: &str = "raspberrypi login: ";
pub const PASSWORD: &str = "raspberry";

/// Gap between an echo and its line end in split-echo mode.
const SPLIT_ECHO_DELAY: Duration = Duration::from_millis(5);

const LS_OUTPUT: &str = "total 12\r\n\
drwxr-xr-x 3 pi pi 4096 Mar  9 07:05 .\r\n\
drwxr-xr-x 4 root root 4096 Jan  1  2024 ..\r\n\
-rw-r--r-- 1 pi pi  220 Jan  1  2024 notes.txt\r\n\
drwxr-xr-x 2 pi pi 4096 Mar  9 07:05 scripts\r\n";

const I2C_OUTPUT: &str = "     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f\r\n\
00:          -- -- -- -- -- -- -- -- -- -- -- -- -- \r\n\
40: -- -- -- -- -- -- -- -- 48 -- -- -- -- -- -- -- \r\n\
70: -- -- -- -- -- -- -- 77                         \r\n";

const IWLIST_OUTPUT: &str = "wlan0     Scan completed :\r
          Cell 01 - Address: AA:BB:CC:DD:EE:01\r
                    Channel:6\r
                    Frequency:2.437 GHz (Channel 6)\r
                    Quality=70/70  Signal level=-40 dBm\r
                    ESSID:\"HomeNet\"\r
                    IE: IEEE 802.11i/WPA2 Version 1\r
          Cell 02 - Address: AA:BB:CC:DD:EE:02\r
                    Channel:36\r
                    Frequency:5.18 GHz (Channel 36)\r
                    Quality=41/70  Signal level=-69 dBm\r
                    ESSID:\"Office\"\r
";

const IFCONFIG_OUTPUT: &str = "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\r
        inet 192.168.1.10  netmask 255.255.255.0  broadcast 192.168.1.255\r
        ether b8:27:eb:12:34:56  txqueuelen 1000  (Ethernet)\r
\r
lo: flags=73<UP,LOOPBACK,RUNNING>  mtu 65536\r
        inet 127.0.0.1  netmask 255.0.0.0\r
";

// ============================================================================
// Types
// ============================================================================

/// Where the fake console is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    LoggedOut,
    AwaitingPassword,
    Shell,
    Base64Pipe { path: String, encoded: String },
    Heredoc { path: String, append: bool, lines: Vec<String> },
}

/// How the fake device behaves.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Start at the shell prompt instead of the login prompt.
    pub logged_in: bool,
    /// Never write anything back.
    pub silent: bool,
    /// Stop echoing pipeline chunks after this many.
    pub stall_after_chunks: Option<usize>,
    /// Send each reply's first line and its line end as separate writes.
    pub split_echo: bool,
    /// How long a wireless scan takes before its output appears.
    pub scan_delay: Duration,
}

/// What the device observed, shared with the test.
#[derive(Debug, Default)]
pub struct DeviceLog {
    /// Complete input lines, in order (passwords included).
    pub lines: Vec<String>,
    /// Ctrl-C count.
    pub interrupts: usize,
    /// Ctrl-D count.
    pub end_of_inputs: usize,
    /// Pipeline chunk lines received.
    pub chunks: usize,
    /// Remote filesystem.
    pub files: HashMap<String, Vec<u8>>,
    /// Remote directories.
    pub directories: Vec<String>,
}

/// Handle to a running fake device.
pub struct FakeDevice {
    pub log: Arc<Mutex<DeviceLog>>,
    pub task: JoinHandle<()>,
}

impl FakeDevice {
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().lines.clone()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.log.lock().files.get(path).cloned()
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.log.lock().files.insert(path.to_string(), content.to_vec());
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Installs a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Timeouts short enough for wall-clock tests.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        prompt_wait_ms: 200,
        password_prompt_ms: 1_000,
        shell_prompt_ms: 2_000,
        command_ms: 1_000,
        chunk_ms: 500,
        transfer_ms: 2_000,
    }
}

/// Builds a connected session wired to a fake device.
pub async fn connected_session(behavior: Behavior) -> (Session, FakeDevice) {
    connected_session_with(behavior, fast_timeouts()).await
}

/// Same as [`connected_session`] with explicit timeouts.
pub async fn connected_session_with(behavior: Behavior, timeouts: Timeouts) -> (Session, FakeDevice) {
    init_tracing();
    let (transport, device_end) = MemoryTransport::pair();
    let session = Session::builder()
        .transport(transport)
        .password(PASSWORD)
        .prompt("pi@raspberrypi:")
        .timeouts(timeouts)
        .build()
        .expect("session");
    session.connect().await.expect("connect");

    let device = spawn_device(device_end, behavior);
    (session, device)
}

/// Runs the fake console on the device end of a pipe.
pub fn spawn_device(mut end: tokio::io::DuplexStream, behavior: Behavior) -> FakeDevice {
    let log = Arc::new(Mutex::new(DeviceLog {
        directories: vec!["/home/pi".to_string(), "/tmp".to_string()],
        ..DeviceLog::default()
    }));
    let shared = Arc::clone(&log);

    let task = tokio::spawn(async move {
        let mut mode = if behavior.logged_in {
            Mode::Shell
        } else {
            Mode::LoggedOut
        };
        let mut pending = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = match end.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };

            for &byte in &buf[..n] {
                let reply = match byte {
                    0x03 => {
                        shared.lock().interrupts += 1;
                        pending.clear();
                        interrupt(&mut mode)
                    }
                    0x04 => {
                        shared.lock().end_of_inputs += 1;
                        end_of_input(&mut mode, &shared)
                    }
                    b'\n' => {
                        let line = String::from_utf8_lossy(&pending).into_owned();
                        pending.clear();
                        shared.lock().lines.push(line.clone());
                        let reply = handle_line(&mut mode, &line, &shared, &behavior);
                        if line.starts_with("sudo iwlist ") && !behavior.scan_delay.is_zero() {
                            tokio::time::sleep(behavior.scan_delay).await;
                        }
                        reply
                    }
                    other => {
                        pending.push(other);
                        String::new()
                    }
                };

                if behavior.silent || reply.is_empty() {
                    continue;
                }
                if send_reply(&mut end, &reply, behavior.split_echo).await.is_err() {
                    return;
                }
            }
        }
    });

    FakeDevice { log, task }
}

/// Writes a reply, optionally holding back the first line end.
async fn send_reply(
    end: &mut tokio::io::DuplexStream,
    reply: &str,
    split_echo: bool,
) -> std::io::Result<()> {
    let split_at = if split_echo { reply.find("\r\n") } else { None };
    match split_at {
        Some(at) if at > 0 => {
            end.write_all(reply[..at].as_bytes()).await?;
            end.flush().await?;
            tokio::time::sleep(SPLIT_ECHO_DELAY).await;
            end.write_all(reply[at..].as_bytes()).await
        }
        _ => end.write_all(reply.as_bytes()).await,
    }
}

// ============================================================================
// Console Emulation
// ============================================================================

fn interrupt(mode: &mut Mode) -> String {
    match mode {
        Mode::LoggedOut | Mode::AwaitingPassword => {
            *mode = Mode::LoggedOut;
            format!("^C\r\n{LOGIN}")
        }
        _ => {
            *mode = Mode::Shell;
            format!("^C\r\n{PROMPT}")
        }
    }
}

fn end_of_input(mode: &mut Mode, log: &Mutex<DeviceLog>) -> String {
    if let Mode::Base64Pipe { path, encoded } = mode {
        let data = Base64Standard.decode(encoded.as_bytes()).unwrap_or_default();
        log.lock().files.insert(path.clone(), data);
        *mode = Mode::Shell;
        return PROMPT.to_string();
    }
    String::new()
}

fn handle_line(mode: &mut Mode, line: &str, log: &Mutex<DeviceLog>, behavior: &Behavior) -> String {
    match mode {
        Mode::LoggedOut => {
            if line.is_empty() {
                format!("\r\n{LOGIN}")
            } else {
                *mode = Mode::AwaitingPassword;
                format!("{line}\r\nPassword: ")
            }
        }
        Mode::AwaitingPassword => {
            if line == PASSWORD {
                *mode = Mode::Shell;
                format!("\r\nLinux raspberrypi 6.1.21-v8+ aarch64\r\n\r\n{PROMPT}")
            } else {
                *mode = Mode::LoggedOut;
                format!("\r\n\r\nLogin incorrect\r\n{LOGIN}")
            }
        }
        Mode::Base64Pipe { encoded, .. } => {
            let received = {
                let mut log = log.lock();
                log.chunks += 1;
                log.chunks
            };
            encoded.push_str(line);
            match behavior.stall_after_chunks {
                Some(limit) if received > limit => String::new(),
                _ => format!("{line}\r\n"),
            }
        }
        Mode::Heredoc {
            path,
            append,
            lines,
        } => {
            if line == "EOL" {
                let mut content = lines.join("\n");
                if !lines.is_empty() {
                    content.push('\n');
                }
                let path = path.clone();
                let append = *append;
                {
                    let mut log = log.lock();
                    let file = log.files.entry(path).or_default();
                    if !append {
                        file.clear();
                    }
                    file.extend_from_slice(content.as_bytes());
                }
                *mode = Mode::Shell;
                format!("> EOL\r\n{PROMPT}")
            } else {
                lines.push(line.to_string());
                format!("> {line}\r\n")
            }
        }
        Mode::Shell => run_shell(mode, line, log),
    }
}

fn run_shell(mode: &mut Mode, line: &str, log: &Mutex<DeviceLog>) -> String {
    let echo = format!("{line}\r\n");

    if line.is_empty() {
        return format!("\r\n{PROMPT}");
    }
    if line == "exit" {
        *mode = Mode::LoggedOut;
        return format!("{echo}logout\r\n\r\n{LOGIN}");
    }
    if let Some(path) = line.strip_prefix("base64 -d > ") {
        *mode = Mode::Base64Pipe {
            path: unquote(path),
            encoded: String::new(),
        };
        return echo;
    }
    if let Some(rest) = line.strip_prefix("cat ") {
        let (append, rest) = match rest.strip_prefix(">> ") {
            Some(rest) => (true, rest),
            None => (false, rest.strip_prefix("> ").unwrap_or(rest)),
        };
        let path = rest.split(" << ").next().unwrap_or(rest);
        *mode = Mode::Heredoc {
            path: unquote(path),
            append,
            lines: Vec::new(),
        };
        return echo;
    }

    let output = if let Some(path) = line.strip_prefix("base64 -- ") {
        let path = unquote(path);
        match log.lock().files.get(&path) {
            Some(data) => wrap_base64(&Base64Standard.encode(data)),
            None => format!("base64: {path}: No such file or directory\r\n"),
        }
    } else if line.starts_with("test -f ") || line.starts_with("test -d ") {
        let path = line[8..].split(" && ").next().map(unquote).unwrap_or_default();
        let log = log.lock();
        let exists = if line.starts_with("test -f ") {
            log.files.contains_key(&path)
        } else {
            log.directories.contains(&path)
        };
        if exists {
            "exists\r\n".to_string()
        } else {
            "not found\r\n".to_string()
        }
    } else if line.starts_with("ls -la") {
        LS_OUTPUT.to_string()
    } else if line == "i2cdetect -y 1" {
        I2C_OUTPUT.to_string()
    } else if line.starts_with("sudo iwlist ") {
        IWLIST_OUTPUT.to_string()
    } else if line == "ifconfig" {
        IFCONFIG_OUTPUT.to_string()
    } else if line.starts_with("export ") || line.starts_with("sudo ") {
        String::new()
    } else {
        let name = line.split_whitespace().next().unwrap_or(line);
        format!("-bash: {name}: command not found\r\n")
    };

    format!("{echo}{output}{PROMPT}")
}

fn wrap_base64(encoded: &str) -> String {
    let mut out = String::new();
    for chunk in encoded.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

fn unquote(arg: &str) -> String {
    arg.trim().trim_matches('\'').to_string()
}

/// Polls until `condition` holds or a second passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
