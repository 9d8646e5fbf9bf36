//! Firewall-rule backends: iptables/arptables on Linux, netsh on Windows.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::arp::ArpPeers;
use super::disconnect::poison_target;
use super::restore::restore_target;
use super::{Capability, EnforcementTarget, Enforcer};
use crate::arp_table::{ArpLookup, SystemArpTable};
use crate::command;
use crate::config::KICK_SPOOF_ROUNDS;
use crate::errors::{NetGuardError, Result};
use crate::models::{BlockingMethod, NetworkInfo};

const SPOOF_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    const BOTH: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Inbound => "in",
            Self::Outbound => "out",
        }
    }
}

/// Deterministic name for the rule blocking `ip` in `direction`, so removal
/// targets exactly the rule that was added.
pub fn rule_name(ip: Ipv4Addr, direction: Direction) -> String {
    format!(
        "netguard_block_{}_{}",
        ip.to_string().replace('.', "_"),
        direction.suffix()
    )
}

/// iptables arguments for `action` (`-A` or `-D`) on the rule for `ip`.
fn iptables_args(action: &str, ip: Ipv4Addr, direction: Direction) -> Vec<String> {
    let (chain, addr_flag) = match direction {
        Direction::Inbound => ("INPUT", "-s"),
        Direction::Outbound => ("OUTPUT", "-d"),
    };
    vec![
        action.to_string(),
        chain.to_string(),
        addr_flag.to_string(),
        ip.to_string(),
        "-m".to_string(),
        "comment".to_string(),
        "--comment".to_string(),
        rule_name(ip, direction),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

fn arptables_args(action: &str, mac: &str) -> Vec<String> {
    vec![
        action.to_string(),
        "INPUT".to_string(),
        "--source-mac".to_string(),
        mac.to_string(),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

/// iptables drop rules, arptables as MAC fallback, ARP spoofing for kicks.
#[derive(Debug, Clone)]
pub struct IptablesEnforcer {
    sudo: bool,
}

impl IptablesEnforcer {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    async fn iptables(&self, args: &[String]) -> Result<()> {
        command::run_checked("iptables", &as_strs(args), self.sudo).await.map(|_| ())
    }

    async fn arptables(&self, args: &[String]) -> Result<()> {
        command::run_checked("arptables", &as_strs(args), self.sudo).await.map(|_| ())
    }

    async fn add_ip_rules(&self, ip: Ipv4Addr) -> Result<()> {
        self.iptables(&iptables_args("-A", ip, Direction::Inbound)).await?;
        if let Err(e) = self.iptables(&iptables_args("-A", ip, Direction::Outbound)).await {
            // Leave no half-installed block behind
            let _ = self.iptables(&iptables_args("-D", ip, Direction::Inbound)).await;
            return Err(e);
        }
        Ok(())
    }

    async fn peers(&self, target: &EnforcementTarget, network: &NetworkInfo) -> Result<ArpPeers> {
        let mac = target
            .mac
            .as_deref()
            .ok_or_else(|| NetGuardError::MissingMac(target.ip.to_string()))?;
        let gateway_mac = match network.gateway_ipv4() {
            Some(gw) => SystemArpTable.mac_for(gw).await,
            None => None,
        };
        ArpPeers::resolve(network, target.ip, mac, gateway_mac.as_deref())
            .map_err(|e| NetGuardError::Enforcement(e.to_string()))
    }
}

#[async_trait]
impl Enforcer for IptablesEnforcer {
    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::FirewallRule,
            Capability::ArpTableRule,
            Capability::ArpSpoofKick,
        ]
    }

    async fn block(&self, target: &EnforcementTarget) -> Result<BlockingMethod> {
        if command::tool_available("iptables").await {
            match self.add_ip_rules(target.ip).await {
                Ok(()) => {
                    tracing::info!("Blocked IP {} using iptables", target.ip);
                    return Ok(BlockingMethod::FirewallRule);
                }
                Err(e) => tracing::warn!("iptables block of {} failed: {}", target.ip, e),
            }
        } else {
            tracing::warn!("iptables not found, trying arptables for {}", target.ip);
        }

        let Some(mac) = target.mac.as_deref() else {
            return Err(NetGuardError::Enforcement(format!(
                "iptables unavailable and MAC unknown for {}",
                target.ip
            )));
        };
        self.arptables(&arptables_args("-A", mac)).await?;
        tracing::info!("Blocked MAC {} using arptables", mac);
        Ok(BlockingMethod::ArpRule)
    }

    async fn unblock(&self, target: &EnforcementTarget, method: Option<BlockingMethod>) -> Result<()> {
        match method {
            Some(BlockingMethod::FirewallRule) => {
                let mut failures = Vec::new();
                for direction in Direction::BOTH {
                    if let Err(e) = self.iptables(&iptables_args("-D", target.ip, direction)).await {
                        failures.push(e.to_string());
                    }
                }
                if !failures.is_empty() {
                    return Err(NetGuardError::Enforcement(failures.join("; ")));
                }
                tracing::info!("Unblocked IP {} using iptables", target.ip);
            }
            Some(BlockingMethod::ArpRule) => {
                let mac = target.mac.as_deref().ok_or_else(|| {
                    NetGuardError::Enforcement(format!("MAC for {} no longer known", target.ip))
                })?;
                self.arptables(&arptables_args("-D", mac)).await?;
                tracing::info!("Unblocked MAC {} using arptables", mac);
            }
            None => tracing::debug!("No OS rule recorded for {}", target.ip),
        }
        Ok(())
    }

    async fn disrupt(&self, target: &EnforcementTarget, network: &NetworkInfo) -> Result<()> {
        let peers = self.peers(target, network).await?;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = poison_target(&peers, KICK_SPOOF_ROUNDS, SPOOF_PAUSE) {
                tracing::warn!("Failed to poison {}: {}", peers.target_ip, e);
            }
        });
        Ok(())
    }

    async fn restore(&self, target: &EnforcementTarget, network: &NetworkInfo) -> Result<()> {
        let peers = self.peers(target, network).await?;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = restore_target(&peers, KICK_SPOOF_ROUNDS, SPOOF_PAUSE) {
                tracing::warn!("Failed to restore {}: {}", peers.target_ip, e);
            }
        });
        Ok(())
    }
}

/// Windows Firewall rules through `netsh advfirewall`.
#[derive(Debug, Default, Clone)]
pub struct NetshEnforcer;

impl NetshEnforcer {
    pub fn new() -> Self {
        Self
    }

    async fn netsh(&self, args: &[String]) -> Result<()> {
        command::run_checked("netsh", &as_strs(args), false).await.map(|_| ())
    }
}

fn netsh_add_args(ip: Ipv4Addr, direction: Direction) -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        "add".to_string(),
        "rule".to_string(),
        format!("name={}", rule_name(ip, direction)),
        format!("dir={}", direction.suffix()),
        "action=block".to_string(),
        format!("remoteip={}", ip),
    ]
}

fn netsh_delete_args(ip: Ipv4Addr, direction: Direction) -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        "delete".to_string(),
        "rule".to_string(),
        format!("name={}", rule_name(ip, direction)),
    ]
}

#[async_trait]
impl Enforcer for NetshEnforcer {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::FirewallRule]
    }

    async fn block(&self, target: &EnforcementTarget) -> Result<BlockingMethod> {
        self.netsh(&netsh_add_args(target.ip, Direction::Inbound)).await?;
        if let Err(e) = self.netsh(&netsh_add_args(target.ip, Direction::Outbound)).await {
            let _ = self.netsh(&netsh_delete_args(target.ip, Direction::Inbound)).await;
            return Err(e);
        }
        tracing::info!("Blocked IP {} using Windows Firewall", target.ip);
        Ok(BlockingMethod::FirewallRule)
    }

    async fn unblock(&self, target: &EnforcementTarget, method: Option<BlockingMethod>) -> Result<()> {
        if method.is_none() {
            return Ok(());
        }
        let mut failures = Vec::new();
        for direction in Direction::BOTH {
            if let Err(e) = self.netsh(&netsh_delete_args(target.ip, direction)).await {
                failures.push(e.to_string());
            }
        }
        if !failures.is_empty() {
            return Err(NetGuardError::Enforcement(failures.join("; ")));
        }
        tracing::info!("Unblocked IP {} using Windows Firewall", target.ip);
        Ok(())
    }
}
