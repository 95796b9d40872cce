//! Log in to a board behind a TCP serial bridge and look around.
//!
//! Demonstrates:
//! - Connecting through `TcpTransport` (ser2net, socat, ESP-Link)
//! - Automated console login
//! - Listing files and probing the I2C bus
//! - Mirroring console output to stdout
//!
//! Usage:
//!   cargo run --example tcp_shell -- 192.168.0.20:2000
//!   cargo run --example tcp_shell -- 192.168.0.20:2000 --debug

// ============================================================================
// Imports
// ============================================================================

use anyhow::Context;
use futures_util::StreamExt;
use serial_shell::{Session, TcpTransport};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ADDRESS: &str = "127.0.0.1:2000";
const DEFAULT_PASSWORD: &str = "raspberry";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    init_logging(debug);

    let address = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map_or(DEFAULT_ADDRESS, String::as_str);

    if let Err(e) = run(address).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "serial_shell=debug"
    } else {
        "serial_shell=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(address: &str) -> anyhow::Result<()> {
    println!("=== Serial shell over TCP ===\n");

    let password = std::env::var("SERIAL_SHELL_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.into());
    let session = Session::builder()
        .transport(TcpTransport::new())
        .address(address)
        .password(password)
        .build()?;

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting to {address}...");
    session.connect().await.context("connect")?;
    println!("    ✓ Connected\n");

    let mut output = session.subscribe_output()?;
    let mirror = tokio::spawn(async move {
        while let Some(Ok(text)) = output.next().await {
            print!("{text}");
        }
    });

    // ========================================================================
    // Login
    // ========================================================================

    println!("[2] Logging in...");
    let outcome = session.auto_login().await.context("login")?;
    println!("\n    ✓ {outcome:?}\n");

    // ========================================================================
    // Queries
    // ========================================================================

    println!("[3] Home directory:");
    for item in session.list_files(Some("/home/pi")).await? {
        let kind = if item.is_directory { "dir " } else { "file" };
        println!("    {kind} {:>8} {}", item.size, item.name);
    }

    println!("\n[4] I2C bus 1:");
    let devices = session.detect_i2c_devices().await?;
    if devices.is_empty() {
        println!("    (none)");
    }
    for device in devices {
        println!("    {device}");
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    session.disconnect().await;
    mirror.abort();
    println!("\n=== Done ===");
    Ok(())
}
