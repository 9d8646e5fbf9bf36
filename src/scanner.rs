use crate::arp_table::ArpLookup;
use crate::command;
use crate::config::MAX_SWEEP_HOSTS;
use crate::errors::{NetGuardError, Result};
use crate::hostname::HostnameResolver;
use crate::models::{DeviceStatus, NetworkInfo, RawHost, UNKNOWN};
use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_icmp_echo::Pinger;

/// Liveness of every host a sweep reported.
pub type HostStates = Vec<(Ipv4Addr, DeviceStatus)>;

/// A liveness probe across an address range.
///
/// An `Err` means the sweep itself failed (tool missing, bad target); an empty
/// `Ok` means nothing answered. Callers treat the two very differently.
#[async_trait]
pub trait SweepPrimitive: Send + Sync {
    async fn sweep(&self, cidr: &str) -> Result<HostStates>;
}

fn parse_target(cidr: &str) -> Result<Ipv4Network> {
    cidr.parse::<Ipv4Network>()
        .map_err(|e| NetGuardError::Sweep(format!("malformed target '{}': {}", cidr, e)))
}

/// Ping-only sweep through `nmap -sn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NmapSweep;

#[async_trait]
impl SweepPrimitive for NmapSweep {
    async fn sweep(&self, cidr: &str) -> Result<HostStates> {
        let target = parse_target(cidr)?.to_string();

        let output = command::run("nmap", &["-sn", "-oG", "-", target.as_str()], false)
            .await
            .map_err(|e| match e {
                NetGuardError::Io(io) if io.kind() == ErrorKind::NotFound => {
                    NetGuardError::Sweep("nmap is not installed".to_string())
                }
                other => NetGuardError::Sweep(format!("failed to run nmap: {}", other)),
            })?;

        if !output.status.success() {
            return Err(NetGuardError::Sweep(format!(
                "nmap exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_nmap_greppable(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `nmap -oG` lines such as `Host: 192.168.1.1 (router.lan)\tStatus: Up`.
pub fn parse_nmap_greppable(output: &str) -> HostStates {
    let mut hosts: HostStates = Vec::new();

    for line in output.lines() {
        let Some(rest) = line.strip_prefix("Host:") else {
            continue;
        };
        let Some(ip) = rest
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<Ipv4Addr>().ok())
        else {
            continue;
        };
        let Some(status) = line.split("Status:").nth(1).and_then(|s| s.split_whitespace().next())
        else {
            continue;
        };
        let status = match status {
            "Up" => DeviceStatus::Up,
            "Down" => DeviceStatus::Down,
            _ => continue,
        };

        match hosts.iter_mut().find(|(known, _)| *known == ip) {
            Some(entry) => entry.1 = status,
            None => hosts.push((ip, status)),
        }
    }

    hosts
}

/// In-process ICMP echo sweep. Needs raw-socket privileges.
#[derive(Debug, Clone)]
pub struct IcmpSweep {
    timeout: Duration,
    concurrency: usize,
}

impl IcmpSweep {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            timeout,
            concurrency: concurrency.max(1),
        }
    }
}

#[async_trait]
impl SweepPrimitive for IcmpSweep {
    async fn sweep(&self, cidr: &str) -> Result<HostStates> {
        let network = parse_target(cidr)?;
        let targets = sweep_targets(&network);

        let pinger = Arc::new(
            Pinger::new()
                .await
                .map_err(|e| NetGuardError::Sweep(format!("cannot open ICMP socket: {}", e)))?,
        );
        let ident: u16 = rand::random();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut probes = JoinSet::new();

        for ip in targets {
            let pinger = Arc::clone(&pinger);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;

            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let mut chain = pinger.chain(IpAddr::V4(ip)).ident(ident).timeout(timeout);
                match chain.send().await {
                    Ok(Some(_rtt)) => Some(ip),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!("Echo to {} failed: {}", ip, e);
                        None
                    }
                }
            });
        }

        let mut alive: HostStates = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some(ip)) = joined {
                alive.push((ip, DeviceStatus::Up));
            }
        }
        alive.sort_by_key(|(ip, _)| *ip);

        Ok(alive)
    }
}

/// Host addresses of `network`, without network and broadcast addresses,
/// capped at [`MAX_SWEEP_HOSTS`].
pub fn sweep_targets(network: &Ipv4Network) -> Vec<Ipv4Addr> {
    let skip_edges = network.prefix() < 31;
    let (net, broadcast) = (network.network(), network.broadcast());

    let mut hosts = network
        .iter()
        .filter(|ip| !skip_edges || (*ip != net && *ip != broadcast));
    let targets: Vec<Ipv4Addr> = hosts.by_ref().take(MAX_SWEEP_HOSTS).collect();

    if hosts.next().is_some() {
        tracing::warn!(
            "{} is larger than {} hosts; only the first {} are probed",
            network,
            MAX_SWEEP_HOSTS,
            MAX_SWEEP_HOSTS
        );
    }
    targets
}

/// Runs a sweep and resolves MAC address and hostname for each responder.
pub struct ScanExecutor {
    sweep: Arc<dyn SweepPrimitive>,
    arp: Arc<dyn ArpLookup>,
    hostnames: HostnameResolver,
    concurrency: usize,
}

impl ScanExecutor {
    pub fn new(
        sweep: Arc<dyn SweepPrimitive>,
        arp: Arc<dyn ArpLookup>,
        hostnames: HostnameResolver,
        concurrency: usize,
    ) -> Self {
        Self {
            sweep,
            arp,
            hostnames,
            concurrency: concurrency.max(1),
        }
    }

    /// One sweep of `network.cidr`. On sweep failure nothing is returned, so
    /// the caller has no partial result to merge.
    pub async fn sweep(&self, network: &NetworkInfo) -> Result<Vec<RawHost>> {
        tracing::info!("Starting network scan for {}", network.cidr);
        let states = self.sweep.sweep(&network.cidr).await?;
        tracing::debug!("Sweep answered for {} hosts", states.len());

        let network = Arc::new(network.clone());
        let local_ip = network.local_ipv4();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut lookups = JoinSet::new();

        for (ip, status) in states {
            let network = Arc::clone(&network);
            let semaphore = Arc::clone(&semaphore);
            let arp = Arc::clone(&self.arp);
            let hostnames = self.hostnames.clone();

            lookups.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();

                if Some(ip) == local_ip {
                    tracing::debug!("Local machine detected: {} ({})", ip, network.hostname);
                    return RawHost {
                        ip,
                        status,
                        hostname: network.hostname.clone(),
                        mac: network.local_mac.clone(),
                    };
                }

                let (hostname, mac) =
                    tokio::join!(hostnames.resolve(ip, &network), arp.mac_for(ip));
                let host = RawHost {
                    ip,
                    status,
                    hostname,
                    mac: mac.unwrap_or_else(|| UNKNOWN.to_string()),
                };
                tracing::debug!("Discovered device: {:?}", host);
                host
            });
        }

        let mut hosts = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(host) => hosts.push(host),
                Err(e) => tracing::warn!("Host resolution task failed: {}", e),
            }
        }
        hosts.sort_by_key(|h| h.ip);

        Ok(hosts)
    }
}
