//! `ifconfig` parser.
//!
//! Understands both the net-tools 2.x layout (`inet 10.0.0.2  netmask ...`,
//! `ether ...`) and the older one (`inet addr:10.0.0.2  Mask:...`,
//! `HWaddr ...`).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// NetworkInterface
// ============================================================================

/// One network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Interface name (`eth0`, `wlan0`, `lo`).
    pub name: String,
    /// IPv4 address.
    pub ipv4: Option<String>,
    /// IPv4 netmask.
    pub netmask: Option<String>,
    /// Hardware address.
    pub mac: Option<String>,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses `ifconfig` output into interfaces, in output order.
#[must_use]
pub fn parse_ifconfig_output(text: &str) -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();
    let mut current: Option<NetworkInterface> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !line.starts_with(char::is_whitespace) {
            if let Some(done) = current.take() {
                interfaces.push(done);
            }
            current = header_name(line).map(|name| NetworkInterface {
                name: name.to_string(),
                ..NetworkInterface::default()
            });
            if let Some(iface) = current.as_mut() {
                apply_tokens(iface, line);
            }
            continue;
        }

        if let Some(iface) = current.as_mut() {
            apply_tokens(iface, line);
        }
    }

    if let Some(done) = current {
        interfaces.push(done);
    }
    interfaces
}

/// `eth0: flags=...` or `eth0      Link encap:...`.
fn header_name(line: &str) -> Option<&str> {
    let first = line.split_whitespace().next()?;
    let name = first.strip_suffix(':').unwrap_or(first);
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.@".contains(c));
    valid.then_some(name)
}

fn apply_tokens(iface: &mut NetworkInterface, line: &str) {
    let mut iter = line.split_whitespace();

    while let Some(token) = iter.next() {
        match token {
            "inet" => {
                if let Some(value) = iter.next() {
                    iface.ipv4 = Some(value.strip_prefix("addr:").unwrap_or(value).to_string());
                }
            }
            "netmask" => {
                if let Some(value) = iter.next() {
                    iface.netmask = Some(value.to_string());
                }
            }
            "ether" | "HWaddr" => {
                if let Some(value) = iter.next() {
                    iface.mac = Some(value.to_string());
                }
            }
            _ => {
                if let Some(mask) = token.strip_prefix("Mask:") {
                    iface.netmask = Some(mask.to_string());
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_layout() {
        let text = "\
eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\r
        inet 192.168.1.10  netmask 255.255.255.0  broadcast 192.168.1.255\r
        inet6 fe80::ba27:ebff:fe12:3456  prefixlen 64  scopeid 0x20<link>\r
        ether b8:27:eb:12:34:56  txqueuelen 1000  (Ethernet)\r
\r
lo: flags=73<UP,LOOPBACK,RUNNING>  mtu 65536\r
        inet 127.0.0.1  netmask 255.0.0.0\r
\r
wlan0: flags=4099<UP,BROADCAST,MULTICAST>  mtu 1500\r
        ether b8:27:eb:ab:cd:ef  txqueuelen 1000  (Ethernet)\r
";
        let interfaces = parse_ifconfig_output(text);
        assert_eq!(interfaces.len(), 3);
        assert_eq!(
            interfaces[0],
            NetworkInterface {
                name: "eth0".to_string(),
                ipv4: Some("192.168.1.10".to_string()),
                netmask: Some("255.255.255.0".to_string()),
                mac: Some("b8:27:eb:12:34:56".to_string()),
            }
        );
        assert_eq!(interfaces[1].name, "lo");
        assert_eq!(interfaces[1].mac, None);
        assert_eq!(interfaces[2].ipv4, None);
    }

    #[test]
    fn test_legacy_layout() {
        let text = concat!(
            "eth0      Link encap:Ethernet  HWaddr b8:27:eb:12:34:56\n",
            "          inet addr:10.0.0.2  Bcast:10.0.0.255  Mask:255.255.255.0\n",
        );
        let interfaces = parse_ifconfig_output(text);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].ipv4.as_deref(), Some("10.0.0.2"));
        assert_eq!(interfaces[0].netmask.as_deref(), Some("255.255.255.0"));
        assert_eq!(interfaces[0].mac.as_deref(), Some("b8:27:eb:12:34:56"));
    }
}
