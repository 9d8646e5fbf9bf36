//! Reverse DNS for discovered hosts, bounded by a timeout.

use async_trait::async_trait;
use dns_lookup::lookup_addr;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{NetworkInfo, UNKNOWN};

/// Reverse name lookup collaborator.
#[async_trait]
pub trait ReverseDns: Send + Sync {
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

/// The system resolver, run on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDns;

#[async_trait]
impl ReverseDns for SystemDns {
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        tokio::task::spawn_blocking(move || reverse_lookup(ip))
            .await
            .ok()
            .flatten()
    }
}

/// Perform a blocking reverse DNS lookup for a single IP address
pub fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    match lookup_addr(&IpAddr::V4(ip)) {
        // Resolvers echo the address back when they have no name for it
        Ok(hostname) if hostname != ip.to_string() && !hostname.is_empty() => Some(hostname),
        _ => None,
    }
}

#[derive(Clone)]
pub struct HostnameResolver {
    dns: Arc<dyn ReverseDns>,
    timeout: Duration,
}

impl HostnameResolver {
    pub fn new(dns: Arc<dyn ReverseDns>, timeout: Duration) -> Self {
        Self { dns, timeout }
    }

    /// Name for `ip`, or the local hostname when `ip` is this machine, or `"Unknown"`.
    /// Returns within the configured timeout even if the lookup hangs.
    pub async fn resolve(&self, ip: Ipv4Addr, local: &NetworkInfo) -> String {
        match tokio::time::timeout(self.timeout, self.dns.reverse_lookup(ip)).await {
            Ok(Some(name)) => return name,
            Ok(None) => {}
            Err(_) => tracing::debug!("Reverse lookup for {} timed out", ip),
        }

        if local.local_ipv4() == Some(ip) && local.hostname != UNKNOWN {
            return local.hostname.clone();
        }
        UNKNOWN.to_string()
    }
}
