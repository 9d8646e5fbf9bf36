//! Engine configuration and settings validation

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{NetGuardError, Result};

/// Default time between background scan cycles, in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 60;

/// Smallest scan interval accepted from settings, in seconds
pub const MIN_SCAN_INTERVAL: u64 = 30;

/// How long a kicked device stays blocked before the automatic unblock
pub const DEFAULT_KICK_DURATION: Duration = Duration::from_secs(10);

/// Upper bound for a single reverse DNS lookup
pub const HOSTNAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-host ICMP echo timeout for the in-process sweep
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum concurrent probes or per-host lookups during one sweep
pub const MAX_CONCURRENT_PROBES: usize = 64;

/// Hosts beyond this count are not probed by the in-process sweep
pub const MAX_SWEEP_HOSTS: usize = 1024;

/// Number of traffic samples retained for the chart
pub const TRAFFIC_HISTORY_CAPACITY: usize = 20;

/// Forged ARP announcement rounds sent per kick
pub const KICK_SPOOF_ROUNDS: u32 = 5;

/// Which primitive performs the subnet liveness sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// `nmap -sn` ping scan
    Nmap,
    /// In-process ICMP echo sweep
    Icmp,
}

impl std::str::FromStr for SweepMode {
    type Err = NetGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nmap" => Ok(Self::Nmap),
            "icmp" | "ping" => Ok(Self::Icmp),
            other => Err(NetGuardError::InvalidInput(format!(
                "unknown sweep mode '{}' (expected nmap or icmp)",
                other
            ))),
        }
    }
}

/// Configuration settings for the discovery engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds between background scan cycles
    pub scan_interval_secs: u64,

    pub sweep_mode: SweepMode,

    /// How long a kick keeps the device blocked
    pub kick_duration: Duration,

    pub hostname_timeout: Duration,

    pub ping_timeout: Duration,

    pub max_concurrent_probes: usize,

    /// Prefix enforcement commands with `sudo`
    pub use_sudo: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: DEFAULT_SCAN_INTERVAL,
            sweep_mode: SweepMode::Nmap,
            kick_duration: DEFAULT_KICK_DURATION,
            hostname_timeout: HOSTNAME_TIMEOUT,
            ping_timeout: PING_TIMEOUT,
            max_concurrent_probes: MAX_CONCURRENT_PROBES,
            use_sudo: cfg!(unix) && !crate::privileges::is_elevated(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NETGUARD_*` environment variables.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("NETGUARD_SCAN_INTERVAL") {
            match raw.trim().parse::<i64>() {
                Ok(n) => match validate_scan_interval(n) {
                    Ok(secs) => config.scan_interval_secs = secs,
                    Err(e) => tracing::warn!("Ignoring NETGUARD_SCAN_INTERVAL: {}", e),
                },
                Err(_) => tracing::warn!("Ignoring non-integer NETGUARD_SCAN_INTERVAL={}", raw),
            }
        }

        if let Ok(raw) = std::env::var("NETGUARD_SWEEP") {
            match raw.parse::<SweepMode>() {
                Ok(mode) => config.sweep_mode = mode,
                Err(e) => tracing::warn!("Ignoring NETGUARD_SWEEP: {}", e),
            }
        }

        if let Ok(raw) = std::env::var("NETGUARD_KICK_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.kick_duration = Duration::from_secs(secs),
                _ => tracing::warn!("Ignoring NETGUARD_KICK_SECS={}", raw),
            }
        }

        if std::env::var_os("NETGUARD_NO_SUDO").is_some() {
            config.use_sudo = false;
        }

        config
    }
}

/// Accepts any integer interval of at least [`MIN_SCAN_INTERVAL`] seconds.
pub fn validate_scan_interval(secs: i64) -> Result<u64> {
    if secs < MIN_SCAN_INTERVAL as i64 {
        return Err(NetGuardError::InvalidInput(format!(
            "scan interval must be at least {} seconds, got {}",
            MIN_SCAN_INTERVAL, secs
        )));
    }
    Ok(secs as u64)
}

/// Validates a scan interval as it arrives from a settings request body.
/// Only JSON integers are accepted; strings, floats, booleans and null are rejected.
pub fn parse_scan_interval(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                validate_scan_interval(secs)
            } else if let Some(secs) = n.as_u64() {
                // Above i64::MAX, still an integer and certainly >= 30
                Ok(secs)
            } else {
                Err(NetGuardError::InvalidInput(format!(
                    "scan interval must be an integer, got {}",
                    n
                )))
            }
        }
        other => Err(NetGuardError::InvalidInput(format!(
            "scan interval must be an integer, got {}",
            other
        ))),
    }
}
