//! `iwlist <interface> scan` parser.
//!
//! One record per `Cell NN - Address:` header; attribute lines that follow
//! belong to that cell until the next header or end of input.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// WifiNetwork
// ============================================================================

/// One access point from a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiNetwork {
    /// BSSID.
    pub address: String,
    /// Network name; empty for hidden networks.
    pub ssid: String,
    /// Security spec from the first `IE: IEEE ...` line, e.g. `IEEE 802.11i/WPA2 Version 1`.
    pub spec: String,
    /// Link quality, e.g. `70/70`.
    pub quality: String,
    /// Frequency, e.g. `2.437 GHz`.
    pub frequency: String,
    /// Channel number, `0` if not reported.
    pub channel: u32,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses a scan into networks, in output order.
///
/// Zero cells yield no records; a single cell yields one.
#[must_use]
pub fn parse_iwlist_output(text: &str) -> Vec<WifiNetwork> {
    let mut networks = Vec::new();
    let mut current: Option<WifiNetwork> = None;

    for line in text.lines().map(str::trim) {
        if let Some(address) = cell_address(line) {
            if let Some(done) = current.take() {
                networks.push(done);
            }
            current = Some(WifiNetwork {
                address: address.to_string(),
                ..WifiNetwork::default()
            });
            continue;
        }

        let Some(network) = current.as_mut() else {
            continue;
        };
        apply_attribute(network, line);
    }

    if let Some(done) = current {
        networks.push(done);
    }
    networks
}

/// Returns the address of a `Cell 01 - Address: AA:BB:...` header.
fn cell_address(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Cell ")?;
    let (_, address) = rest.split_once("Address:")?;
    Some(address.trim())
}

fn apply_attribute(network: &mut WifiNetwork, line: &str) {
    if let Some(ssid) = line.strip_prefix("ESSID:") {
        network.ssid = ssid.trim().trim_matches('"').to_string();
    } else if let Some(channel) = line.strip_prefix("Channel:") {
        if let Ok(channel) = channel.trim().parse::<u32>() {
            network.channel = channel;
        }
    } else if let Some(rest) = line.strip_prefix("Frequency:") {
        let (frequency, annotation) = match rest.split_once('(') {
            Some((frequency, annotation)) => (frequency, Some(annotation)),
            None => (rest, None),
        };
        network.frequency = frequency.trim().to_string();
        if network.channel == 0
            && let Some(channel) = annotation
                .and_then(|a| a.strip_prefix("Channel "))
                .and_then(|a| a.trim_end_matches(')').trim().parse::<u32>().ok())
        {
            network.channel = channel;
        }
    } else if let Some(rest) = line.strip_prefix("Quality=") {
        network.quality = rest
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
    } else if let Some(spec) = line.strip_prefix("IE:") {
        let spec = spec.trim();
        if network.spec.is_empty() && spec.starts_with("IEEE") {
            network.spec = spec.to_string();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
