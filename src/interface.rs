//! Local network identity: address, gateway, interface and derived subnet.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use pnet::datalink::{self, NetworkInterface};
use std::net::{IpAddr, Ipv4Addr};

use crate::models::{NetworkInfo, UNKNOWN};

/// Source of the local [`NetworkInfo`]. Recomputed on every call.
#[async_trait]
pub trait NetworkInfoResolver: Send + Sync {
    async fn resolve(&self) -> NetworkInfo;
}

/// Reads the active route from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetworkInfo;

#[async_trait]
impl NetworkInfoResolver for SystemNetworkInfo {
    async fn resolve(&self) -> NetworkInfo {
        // Route and interface queries, and the hostname fallback, all block
        match tokio::task::spawn_blocking(resolve_network_info).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Network info task failed: {}; assuming /24", e);
                fallback_for(Ipv4Addr::LOCALHOST, UNKNOWN.to_string())
            }
        }
    }
}

// A fixed identity, handy when the engine is pointed at a known network
#[async_trait]
impl NetworkInfoResolver for NetworkInfo {
    async fn resolve(&self) -> NetworkInfo {
        self.clone()
    }
}

pub fn local_hostname() -> String {
    dns_lookup::get_hostname().unwrap_or_else(|_| UNKNOWN.to_string())
}

/// Best-effort network identity. Never fails: anything that cannot be
/// determined is reported as `"Unknown"` and the subnet falls back to a /24
/// around the address the local hostname resolves to.
pub fn resolve_network_info() -> NetworkInfo {
    let hostname = local_hostname();
    match from_default_route(&hostname) {
        Ok(info) => {
            tracing::debug!(
                "Local network: {} on {} via {} ({})",
                info.local_ip,
                info.interface,
                info.gateway_ip,
                info.cidr
            );
            info
        }
        Err(e) => {
            tracing::warn!("Error getting network info: {}; assuming /24", e);
            fallback_network_info(hostname)
        }
    }
}

fn from_default_route(hostname: &str) -> Result<NetworkInfo> {
    let gateway_ip = match default_net::get_default_gateway()
        .map_err(|e| anyhow!("Failed to get default gateway: {}", e))?
        .ip_addr
    {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(ip) => return Err(anyhow!("Default gateway {} is not IPv4", ip)),
    };

    let default_name = default_net::get_default_interface().ok().map(|i| i.name);
    let interfaces = datalink::interfaces();
    let interface = select_interface(&interfaces, default_name.as_deref(), gateway_ip)
        .ok_or_else(|| anyhow!("No interface found for gateway {}", gateway_ip))?;

    let (local_ip, netmask) = interface
        .ips
        .iter()
        .find_map(|net| match net {
            IpNetwork::V4(v4) => Some((v4.ip(), v4.mask())),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No IPv4 address assigned to {}", interface.name))?;

    Ok(NetworkInfo {
        local_ip: local_ip.to_string(),
        gateway_ip: gateway_ip.to_string(),
        interface: interface.name.clone(),
        netmask: netmask.to_string(),
        cidr: derive_cidr(local_ip, netmask),
        hostname: hostname.to_string(),
        local_mac: interface
            .mac
            .map(|m| m.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

/// The interface named by the default route, or else the one whose subnet
/// contains the gateway.
fn select_interface<'a>(
    interfaces: &'a [NetworkInterface],
    default_name: Option<&str>,
    gateway: Ipv4Addr,
) -> Option<&'a NetworkInterface> {
    let usable = |iface: &&NetworkInterface| {
        !iface.is_loopback() && iface.ips.iter().any(|ip| ip.is_ipv4())
    };

    if let Some(name) = default_name {
        // Npcap names look like \Device\NPF_{GUID} while default-net reports {GUID}
        if let Some(found) = interfaces
            .iter()
            .filter(usable)
            .find(|iface| iface.name == name || iface.name.ends_with(name))
        {
            return Some(found);
        }
    }

    interfaces.iter().filter(usable).find(|iface| {
        iface.ips.iter().any(|net| match net {
            IpNetwork::V4(v4) => v4.contains(gateway),
            _ => false,
        })
    })
}

fn fallback_network_info(hostname: String) -> NetworkInfo {
    let local_ip = dns_lookup::lookup_host(&hostname)
        .ok()
        .and_then(|addrs| {
            addrs.into_iter().find_map(|addr| match addr {
                IpAddr::V4(v4) => Some(v4),
                _ => None,
            })
        })
        .unwrap_or(Ipv4Addr::LOCALHOST);

    fallback_for(local_ip, hostname)
}

fn fallback_for(local_ip: Ipv4Addr, hostname: String) -> NetworkInfo {
    NetworkInfo {
        local_ip: local_ip.to_string(),
        gateway_ip: UNKNOWN.to_string(),
        interface: UNKNOWN.to_string(),
        netmask: UNKNOWN.to_string(),
        cidr: derive_cidr(local_ip, Ipv4Addr::new(255, 255, 255, 0)),
        hostname,
        local_mac: UNKNOWN.to_string(),
    }
}

/// `network-address/prefix`, where the prefix is the number of set bits in the mask.
pub fn derive_cidr(ip: Ipv4Addr, netmask: Ipv4Addr) -> String {
    let mask = u32::from(netmask);
    let network = Ipv4Addr::from(u32::from(ip) & mask);
    format!("{}/{}", network, mask.count_ones())
}
