//! OS-level enforcement of access restrictions.
//!
//! The registry and access controller are platform-agnostic; everything that
//! touches firewall rules or raw ARP frames sits behind [`Enforcer`].

pub mod arp;
pub mod disconnect;
pub mod firewall;
pub mod restore;

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::errors::{NetGuardError, Result};
use crate::models::{is_unknown, BlockingMethod, NetworkDevice, NetworkInfo};

pub use firewall::{IptablesEnforcer, NetshEnforcer};

/// What an enforcement backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// IP-keyed inbound/outbound drop rules
    FirewallRule,
    /// MAC-keyed ARP drop rules
    ArpTableRule,
    /// Forged ARP announcements that cut a device off its gateway
    ArpSpoofKick,
}

/// The addresses an enforcement action applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementTarget {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
}

impl From<&NetworkDevice> for EnforcementTarget {
    fn from(device: &NetworkDevice) -> Self {
        Self {
            ip: device.ip,
            mac: (!is_unknown(&device.mac)).then(|| device.mac.clone()),
        }
    }
}

#[async_trait]
pub trait Enforcer: Send + Sync {
    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Installs a block and reports which mechanism took it.
    async fn block(&self, target: &EnforcementTarget) -> Result<BlockingMethod>;

    /// Removes whatever `method` installed. `None` means nothing was installed.
    async fn unblock(&self, target: &EnforcementTarget, method: Option<BlockingMethod>) -> Result<()>;

    /// Starts cutting the target off its gateway. Must not wait for completion.
    async fn disrupt(&self, _target: &EnforcementTarget, _network: &NetworkInfo) -> Result<()> {
        Ok(())
    }

    /// Undoes [`Enforcer::disrupt`]. Must not wait for completion.
    async fn restore(&self, _target: &EnforcementTarget, _network: &NetworkInfo) -> Result<()> {
        Ok(())
    }
}

/// Used where no backend exists: records intent in the log, enforces nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEnforcer;

#[async_trait]
impl Enforcer for LoggingEnforcer {
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    async fn block(&self, target: &EnforcementTarget) -> Result<BlockingMethod> {
        Err(NetGuardError::Enforcement(format!(
            "no enforcement backend on this platform; {} is blocked in state only",
            target.ip
        )))
    }

    async fn unblock(&self, target: &EnforcementTarget, _method: Option<BlockingMethod>) -> Result<()> {
        tracing::debug!("No enforcement backend; nothing to remove for {}", target.ip);
        Ok(())
    }
}

/// The backend for the running platform.
pub fn platform_default(config: &EngineConfig) -> Arc<dyn Enforcer> {
    if cfg!(target_os = "windows") {
        Arc::new(NetshEnforcer::new())
    } else if cfg!(target_os = "linux") {
        Arc::new(IptablesEnforcer::new(config.use_sudo))
    } else {
        Arc::new(LoggingEnforcer)
    }
}
