//! LAN discovery and device access control.
//!
//! [`NetworkMonitor`] sweeps the local subnet on an interval, keeps a registry
//! of every device it has seen and applies block, unblock and kick actions
//! through the platform's firewall.

pub mod access;
pub mod arp_table;
pub mod command;
pub mod config;
pub mod enforcement;
pub mod errors;
pub mod hostname;
pub mod interface;
pub mod logging;
pub mod models;
pub mod network;
pub mod privileges;
pub mod registry;
pub mod scanner;
pub mod stats;
pub mod system;

pub use config::{EngineConfig, SweepMode};
pub use errors::{NetGuardError, Result};
pub use models::{
    BlockingMethod, DeviceStatus, NetworkDevice, NetworkInfo, NetworkStats, RawHost, SystemInfo,
    TrafficSample,
};
pub use network::{Collaborators, NetworkMonitor, ScanTrigger};
