use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Placeholder for any value that has not been resolved yet.
pub const UNKNOWN: &str = "Unknown";

pub fn is_unknown(value: &str) -> bool {
    value.is_empty() || value == UNKNOWN
}

/// Liveness of a device as reported by the last sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Up,
    Down,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// OS-level mechanism that was used to enforce a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingMethod {
    FirewallRule,
    ArpRule,
}

/// A device known to the registry. `ip` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub mac: String,
    pub status: DeviceStatus,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    pub blocked: bool,
    pub is_local: bool,
    pub blocking_method: Option<BlockingMethod>,
}

impl NetworkDevice {
    pub fn has_mac(&self) -> bool {
        !is_unknown(&self.mac)
    }

    pub fn is_up(&self) -> bool {
        self.status == DeviceStatus::Up
    }
}

/// One host reported by a sweep, after MAC and hostname resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHost {
    pub ip: Ipv4Addr,
    pub status: DeviceStatus,
    pub hostname: String,
    pub mac: String,
}

impl RawHost {
    pub fn up(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            status: DeviceStatus::Up,
            hostname: UNKNOWN.to_string(),
            mac: UNKNOWN.to_string(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = mac.into();
        self
    }
}

/// Identity of the machine running the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub local_ip: String,
    pub gateway_ip: String,
    pub interface: String,
    pub netmask: String,
    pub cidr: String,
    pub hostname: String,
    pub local_mac: String,
}

impl NetworkInfo {
    pub fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.local_ip.parse().ok()
    }

    pub fn gateway_ipv4(&self) -> Option<Ipv4Addr> {
        self.gateway_ip.parse().ok()
    }
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            local_ip: "127.0.0.1".to_string(),
            gateway_ip: UNKNOWN.to_string(),
            interface: UNKNOWN.to_string(),
            netmask: UNKNOWN.to_string(),
            cidr: "127.0.0.0/24".to_string(),
            hostname: UNKNOWN.to_string(),
            local_mac: UNKNOWN.to_string(),
        }
    }
}

/// Cumulative interface counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCounts {
    pub active: usize,
    pub blocked: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSample {
    pub timestamp: DateTime<Local>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Point-in-time statistics, as handed to the API layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub upload_rate: f64,
    pub download_rate: f64,
    pub local_ip: String,
    pub gateway_ip: String,
    pub interface: String,
    pub hostname: String,
    pub active_devices: usize,
    pub blocked_devices: usize,
    pub total_devices: usize,
    pub timestamp: DateTime<Local>,
}

/// Facts about the host running the engine. Sizes are in bytes, uptime in
/// seconds, percentages in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_version: String,
    pub processor: String,
    pub architecture: String,
    pub uptime: u64,
    pub memory_total: u64,
    pub memory_available: u64,
    pub memory_percent: f64,
    pub disk_total: u64,
    pub disk_free: u64,
    pub disk_percent: f64,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            hostname: UNKNOWN.to_string(),
            platform: UNKNOWN.to_string(),
            platform_version: UNKNOWN.to_string(),
            processor: UNKNOWN.to_string(),
            architecture: UNKNOWN.to_string(),
            uptime: 0,
            memory_total: 0,
            memory_available: 0,
            memory_percent: 0.0,
            disk_total: 0,
            disk_free: 0,
            disk_percent: 0.0,
        }
    }
}
