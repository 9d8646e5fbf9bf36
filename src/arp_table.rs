//! MAC address lookup through the operating system's ARP cache.

use async_trait::async_trait;
use pnet::datalink::MacAddr;
use std::net::Ipv4Addr;

use crate::command;

/// ARP cache collaborator: `None` when the MAC cannot be resolved.
#[async_trait]
pub trait ArpLookup: Send + Sync {
    async fn mac_for(&self, ip: Ipv4Addr) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemArpTable;

#[async_trait]
impl ArpLookup for SystemArpTable {
    async fn mac_for(&self, ip: Ipv4Addr) -> Option<String> {
        #[cfg(target_os = "linux")]
        if let Ok(table) = tokio::fs::read_to_string("/proc/net/arp").await {
            if let Some(mac) = parse_arp_output(&table, ip) {
                return Some(mac);
            }
        }

        let target = ip.to_string();
        let args: [&str; 2] = if cfg!(windows) {
            ["-a", target.as_str()]
        } else {
            ["-n", target.as_str()]
        };

        match command::run("arp", &args, false).await {
            Ok(output) => parse_arp_output(&String::from_utf8_lossy(&output.stdout), ip),
            Err(e) => {
                tracing::debug!("Error getting MAC for {}: {}", ip, e);
                None
            }
        }
    }
}

/// Canonical lowercase colon form, or `None` for anything that is not a
/// usable unicast hardware address (`(incomplete)`, all zeros, broadcast).
pub fn normalize_mac(raw: &str) -> Option<String> {
    let candidate = raw.trim().replace('-', ":");
    if candidate.split(':').count() != 6 {
        return None;
    }
    let mac = candidate.parse::<MacAddr>().ok()?;
    if mac == MacAddr::zero() || mac == MacAddr::broadcast() {
        return None;
    }
    Some(mac.to_string())
}

/// Finds the MAC for `ip` in the output of `arp -n`, `arp -a` or `/proc/net/arp`.
pub fn parse_arp_output(output: &str, ip: Ipv4Addr) -> Option<String> {
    let target = ip.to_string();
    output
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .any(|token| token.trim_matches(|c| c == '(' || c == ')') == target)
        })
        .find_map(|line| line.split_whitespace().find_map(normalize_mac))
}
