#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netguard::arp_table::ArpLookup;
use netguard::enforcement::{Capability, EnforcementTarget, Enforcer};
use netguard::hostname::ReverseDns;
use netguard::models::{BlockingMethod, DeviceStatus, IoCounters, NetworkInfo};
use netguard::scanner::{HostStates, SweepPrimitive};
use netguard::stats::CounterSource;
use netguard::{Collaborators, EngineConfig, NetGuardError, NetworkMonitor, Result};

pub const LOCAL_HOSTNAME: &str = "netguard-host";
pub const LOCAL_MAC: &str = "02:00:00:00:00:0a";

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, last)
}

pub fn test_network() -> NetworkInfo {
    NetworkInfo {
        local_ip: "192.168.1.10".to_string(),
        gateway_ip: "192.168.1.1".to_string(),
        interface: "eth0".to_string(),
        netmask: "255.255.255.0".to_string(),
        cidr: "192.168.1.0/24".to_string(),
        hostname: LOCAL_HOSTNAME.to_string(),
        local_mac: LOCAL_MAC.to_string(),
    }
}

/// Sweep whose answer the test sets; `None` makes the next sweep fail.
#[derive(Default)]
pub struct FakeSweep {
    answer: Mutex<Option<HostStates>>,
    delay: Mutex<Duration>,
    calls: Mutex<usize>,
}

impl FakeSweep {
    pub fn answering(ips: &[Ipv4Addr]) -> Arc<Self> {
        let sweep = Arc::new(Self::default());
        sweep.set_up(ips);
        sweep
    }

    pub fn set_up(&self, ips: &[Ipv4Addr]) {
        let states = ips.iter().map(|ip| (*ip, DeviceStatus::Up)).collect();
        *self.answer.lock().unwrap() = Some(states);
    }

    pub fn fail(&self) {
        *self.answer.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SweepPrimitive for FakeSweep {
    async fn sweep(&self, _cidr: &str) -> Result<HostStates> {
        *self.calls.lock().unwrap() += 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let answer = self.answer.lock().unwrap().clone();
        answer.ok_or_else(|| NetGuardError::Sweep("nmap is not installed".to_string()))
    }
}

#[derive(Default)]
pub struct FakeArp {
    pub table: Mutex<HashMap<Ipv4Addr, String>>,
}

impl FakeArp {
    pub fn with(entries: &[(Ipv4Addr, &str)]) -> Arc<Self> {
        let arp = Arc::new(Self::default());
        for (ip, mac) in entries {
            arp.table.lock().unwrap().insert(*ip, mac.to_string());
        }
        arp
    }
}

#[async_trait]
impl ArpLookup for FakeArp {
    async fn mac_for(&self, ip: Ipv4Addr) -> Option<String> {
        self.table.lock().unwrap().get(&ip).cloned()
    }
}

#[derive(Default)]
pub struct FakeDns {
    pub names: Mutex<HashMap<Ipv4Addr, String>>,
}

impl FakeDns {
    pub fn with(entries: &[(Ipv4Addr, &str)]) -> Arc<Self> {
        let dns = Arc::new(Self::default());
        for (ip, name) in entries {
            dns.names.lock().unwrap().insert(*ip, name.to_string());
        }
        dns
    }
}

#[async_trait]
impl ReverseDns for FakeDns {
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.names.lock().unwrap().get(&ip).cloned()
    }
}

#[derive(Default)]
pub struct FakeCounters {
    pub current: Mutex<IoCounters>,
}

impl CounterSource for FakeCounters {
    fn read(&self) -> Result<IoCounters> {
        Ok(*self.current.lock().unwrap())
    }
}

/// Records every call; optionally advertises ARP-spoof kicks or fails blocks.
#[derive(Default)]
pub struct FakeEnforcer {
    pub spoof: bool,
    pub fail_blocks: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeEnforcer {
    pub fn firewall_only() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_spoofing() -> Arc<Self> {
        Arc::new(Self {
            spoof: true,
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_blocks: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Enforcer for FakeEnforcer {
    fn capabilities(&self) -> &'static [Capability] {
        if self.spoof {
            &[Capability::FirewallRule, Capability::ArpSpoofKick]
        } else {
            &[Capability::FirewallRule]
        }
    }

    async fn block(&self, target: &EnforcementTarget) -> Result<BlockingMethod> {
        self.record(format!("block {}", target.ip));
        if self.fail_blocks {
            return Err(NetGuardError::Enforcement("iptables: permission denied".to_string()));
        }
        Ok(BlockingMethod::FirewallRule)
    }

    async fn unblock(&self, target: &EnforcementTarget, method: Option<BlockingMethod>) -> Result<()> {
        self.record(format!("unblock {} {:?}", target.ip, method));
        Ok(())
    }

    async fn disrupt(&self, target: &EnforcementTarget, _network: &NetworkInfo) -> Result<()> {
        self.record(format!("disrupt {}", target.ip));
        Ok(())
    }

    async fn restore(&self, target: &EnforcementTarget, _network: &NetworkInfo) -> Result<()> {
        self.record(format!("restore {}", target.ip));
        Ok(())
    }
}

pub struct Harness {
    pub monitor: NetworkMonitor,
    pub sweep: Arc<FakeSweep>,
    pub arp: Arc<FakeArp>,
    pub dns: Arc<FakeDns>,
    pub counters: Arc<FakeCounters>,
    pub enforcer: Arc<FakeEnforcer>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        scan_interval_secs: 30,
        kick_duration: Duration::from_secs(10),
        use_sudo: false,
        ..EngineConfig::default()
    }
}

/// Gateway, this machine and a printer with a known MAC and name.
pub fn harness(enforcer: Arc<FakeEnforcer>) -> Harness {
    let sweep = FakeSweep::answering(&[ip(1), ip(10), ip(20)]);
    let arp = FakeArp::with(&[(ip(20), "aa:bb:cc:dd:ee:20")]);
    let dns = FakeDns::with(&[(ip(20), "printer.lan")]);
    let counters = Arc::new(FakeCounters::default());

    let collaborators = Collaborators {
        network: Arc::new(test_network()),
        sweep: sweep.clone(),
        arp: arp.clone(),
        dns: dns.clone(),
        counters: counters.clone(),
        enforcer: enforcer.clone(),
    };

    Harness {
        monitor: NetworkMonitor::new(&test_config(), collaborators),
        sweep,
        arp,
        dns,
        counters,
        enforcer,
    }
}
