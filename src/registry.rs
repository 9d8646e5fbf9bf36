//! Canonical device table and block set.
//!
//! Every mutation takes the single write lock for its whole duration, so a
//! reader sees either all of a reconcile pass or none of it.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use tokio::sync::RwLock;

use crate::errors::{NetGuardError, Result};
use crate::models::{
    is_unknown, BlockingMethod, DeviceCounts, DeviceStatus, NetworkDevice, RawHost, UNKNOWN,
};

/// Identifiers (IP strings and lowercase MACs) currently under restriction.
#[derive(Debug, Default, Clone)]
pub struct BlockSet {
    entries: HashSet<String>,
}

impl BlockSet {
    fn key(identifier: &str) -> String {
        identifier.trim().to_ascii_lowercase()
    }

    pub fn insert(&mut self, identifier: &str) {
        if !is_unknown(identifier) {
            self.entries.insert(Self::key(identifier));
        }
    }

    pub fn remove(&mut self, identifier: &str) {
        self.entries.remove(&Self::key(identifier));
    }

    pub fn contains(&self, identifier: &str) -> bool {
        !is_unknown(identifier) && self.entries.contains(&Self::key(identifier))
    }

    pub fn covers(&self, ip: Ipv4Addr, mac: &str) -> bool {
        self.contains(&ip.to_string()) || self.contains(mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// What one reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub observed: usize,
    pub added: usize,
    pub went_offline: usize,
}

/// Result of [`DeviceRegistry::set_blocked`].
#[derive(Debug, Clone)]
pub struct BlockUpdate {
    pub device: NetworkDevice,
    /// False when the device already had the requested flag.
    pub changed: bool,
    /// Other rows sharing the device's MAC whose flag flipped with it.
    pub also_changed: Vec<NetworkDevice>,
}

#[derive(Debug, Default)]
struct RegistryState {
    devices: Vec<NetworkDevice>,
    by_ip: HashMap<Ipv4Addr, usize>,
    block_set: BlockSet,
}

impl RegistryState {
    /// IP match first, MAC second. The sentinel never matches.
    fn find(&self, identifier: &str) -> Option<usize> {
        if let Ok(ip) = identifier.parse::<Ipv4Addr>() {
            if let Some(&idx) = self.by_ip.get(&ip) {
                return Some(idx);
            }
        }
        if is_unknown(identifier) {
            return None;
        }
        self.devices
            .iter()
            .position(|d| d.has_mac() && d.mac.eq_ignore_ascii_case(identifier))
    }

    fn find_checked(&self, identifier: &str) -> Result<usize> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(NetGuardError::InvalidInput("No identifier provided".to_string()));
        }
        self.find(identifier)
            .ok_or_else(|| NetGuardError::DeviceNotFound(identifier.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    state: RwLock<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reconcile(&self, hosts: &[RawHost], local_ip: Option<Ipv4Addr>) -> ReconcileSummary {
        self.reconcile_at(hosts, local_ip, Local::now()).await
    }

    /// Merges one sweep snapshot into the registry.
    ///
    /// Known devices get status and `last_seen` refreshed, hostname and MAC
    /// only when the new value is resolved, and keep their `blocked` flag.
    /// New devices start with `first_seen == last_seen == now` and are blocked
    /// if their IP or MAC is in the block set. Devices missing from `hosts`
    /// go down; nothing is ever removed.
    pub async fn reconcile_at(
        &self,
        hosts: &[RawHost],
        local_ip: Option<Ipv4Addr>,
        now: DateTime<Local>,
    ) -> ReconcileSummary {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let mut summary = ReconcileSummary::default();
        let mut seen: HashSet<Ipv4Addr> = HashSet::with_capacity(hosts.len());

        for host in hosts {
            seen.insert(host.ip);
            let is_local = Some(host.ip) == local_ip;

            match state.by_ip.get(&host.ip).copied() {
                Some(idx) => {
                    let device = &mut state.devices[idx];
                    device.status = host.status;
                    device.last_seen = now;
                    if !is_unknown(&host.hostname) {
                        device.hostname = host.hostname.clone();
                    }
                    if !is_unknown(&host.mac) {
                        device.mac = host.mac.to_ascii_lowercase();
                    }
                    device.is_local = is_local;
                }
                None => {
                    let mac = if is_unknown(&host.mac) {
                        UNKNOWN.to_string()
                    } else {
                        host.mac.to_ascii_lowercase()
                    };
                    let hostname = if is_unknown(&host.hostname) {
                        UNKNOWN.to_string()
                    } else {
                        host.hostname.clone()
                    };
                    let blocked = state.block_set.covers(host.ip, &mac);
                    state.by_ip.insert(host.ip, state.devices.len());
                    state.devices.push(NetworkDevice {
                        ip: host.ip,
                        hostname,
                        mac,
                        status: host.status,
                        first_seen: now,
                        last_seen: now,
                        blocked,
                        is_local,
                        blocking_method: None,
                    });
                    summary.added += 1;
                }
            }
        }

        for device in state.devices.iter_mut() {
            if !seen.contains(&device.ip) && device.status != DeviceStatus::Down {
                device.status = DeviceStatus::Down;
                summary.went_offline += 1;
            }
        }

        summary.observed = seen.len();
        summary
    }

    pub async fn lookup(&self, identifier: &str) -> Result<NetworkDevice> {
        let state = self.state.read().await;
        let idx = state.find_checked(identifier)?;
        Ok(state.devices[idx].clone())
    }

    /// Updates block-set membership and re-derives `blocked` under one lock.
    ///
    /// Blocking records the identifier as given, so a MAC-based block follows
    /// the hardware to a new address. Unblocking clears the device's IP and
    /// MAC as well, so neither can resurrect the block later. Every row with
    /// the device's IP or MAC gets `blocked = block_set.covers(ip, mac)`.
    pub async fn set_blocked(&self, identifier: &str, blocked: bool) -> Result<BlockUpdate> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let idx = state.find_checked(identifier)?;
        let identifier = identifier.trim();
        let ip = state.devices[idx].ip;
        let mac = state.devices[idx].mac.clone();

        if blocked {
            state.block_set.insert(identifier);
        } else {
            state.block_set.remove(identifier);
            state.block_set.remove(&ip.to_string());
            state.block_set.remove(&mac);
        }

        let mut changed = false;
        let mut also_changed = Vec::new();
        for (i, device) in state.devices.iter_mut().enumerate() {
            let related = i == idx || (!is_unknown(&mac) && device.mac.eq_ignore_ascii_case(&mac));
            if !related {
                continue;
            }
            let now_blocked = state.block_set.covers(device.ip, &device.mac);
            if device.blocked == now_blocked {
                continue;
            }
            device.blocked = now_blocked;
            if i == idx {
                changed = true;
            } else {
                also_changed.push(device.clone());
            }
        }

        Ok(BlockUpdate {
            device: state.devices[idx].clone(),
            changed,
            also_changed,
        })
    }

    pub async fn set_status(&self, identifier: &str, status: DeviceStatus) -> Result<NetworkDevice> {
        let mut state = self.state.write().await;
        let idx = state.find_checked(identifier)?;
        let device = &mut state.devices[idx];
        device.status = status;
        Ok(device.clone())
    }

    pub async fn set_blocking_method(
        &self,
        ip: Ipv4Addr,
        method: Option<BlockingMethod>,
    ) -> Result<NetworkDevice> {
        let mut state = self.state.write().await;
        let idx = state
            .by_ip
            .get(&ip)
            .copied()
            .ok_or_else(|| NetGuardError::DeviceNotFound(ip.to_string()))?;
        let device = &mut state.devices[idx];
        device.blocking_method = method;
        Ok(device.clone())
    }

    /// Devices in discovery order.
    pub async fn snapshot(&self) -> Vec<NetworkDevice> {
        self.state.read().await.devices.clone()
    }

    pub async fn counts(&self) -> DeviceCounts {
        let state = self.state.read().await;
        DeviceCounts {
            active: state.devices.iter().filter(|d| d.is_up()).count(),
            blocked: state.devices.iter().filter(|d| d.blocked).count(),
            total: state.devices.len(),
        }
    }

    pub async fn blocked_identifiers(&self) -> Vec<String> {
        self.state.read().await.block_set.to_vec()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[tokio::test]
    async fn first_scan_creates_device() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;

        let devices = registry.snapshot().await;
        assert_eq!(devices.len(), 1);
        let d = &devices[0];
        assert_eq!(d.first_seen, d.last_seen);
        assert_eq!(d.status, DeviceStatus::Up);
        assert!(!d.blocked);
        assert_eq!(d.hostname, UNKNOWN);
        assert_eq!(d.mac, UNKNOWN);
    }

    #[tokio::test]
    async fn empty_scan_marks_down_and_keeps_device() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;
        let summary = registry.reconcile(&[], None).await;

        let devices = registry.snapshot().await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].status, DeviceStatus::Down);
        assert_eq!(summary.went_offline, 1);
    }

    #[tokio::test]
    async fn unchanged_scan_only_moves_last_seen() {
        let registry = DeviceRegistry::new();
        let hosts = [RawHost::up(ip(5))
            .with_hostname("nas.lan")
            .with_mac("aa:bb:cc:00:11:22")];
        let t0 = Local::now();
        let t1 = t0 + Duration::seconds(60);

        registry.reconcile_at(&hosts, None, t0).await;
        let before = registry.lookup("10.0.0.5").await.unwrap();
        registry.reconcile_at(&hosts, None, t1).await;
        let after = registry.lookup("10.0.0.5").await.unwrap();

        assert_eq!(after.first_seen, before.first_seen);
        assert_eq!(after.last_seen, t1);
        assert_eq!(after.hostname, before.hostname);
        assert_eq!(after.mac, before.mac);
        assert_eq!(after.blocked, before.blocked);
    }

    #[tokio::test]
    async fn resolved_fields_never_regress_to_unknown() {
        let registry = DeviceRegistry::new();
        registry
            .reconcile(
                &[RawHost::up(ip(7)).with_hostname("tv.lan").with_mac("AA:BB:CC:DD:EE:01")],
                None,
            )
            .await;
        registry.reconcile(&[RawHost::up(ip(7))], None).await;

        let d = registry.lookup("10.0.0.7").await.unwrap();
        assert_eq!(d.hostname, "tv.lan");
        assert_eq!(d.mac, "aa:bb:cc:dd:ee:01");
    }

    #[tokio::test]
    async fn unknown_fields_upgrade_when_resolved() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(8))], None).await;
        registry
            .reconcile(&[RawHost::up(ip(8)).with_hostname("laptop")], None)
            .await;
        assert_eq!(registry.lookup("10.0.0.8").await.unwrap().hostname, "laptop");
    }

    #[tokio::test]
    async fn newly_resolved_mac_replaces_older_one() {
        let registry = DeviceRegistry::new();
        registry
            .reconcile(&[RawHost::up(ip(8)).with_mac("aa:bb:cc:dd:ee:08")], None)
            .await;
        registry
            .reconcile(&[RawHost::up(ip(8)).with_mac("aa:bb:cc:dd:ee:80")], None)
            .await;
        assert_eq!(registry.lookup("10.0.0.8").await.unwrap().mac, "aa:bb:cc:dd:ee:80");
    }

    #[tokio::test]
    async fn first_seen_is_immutable() {
        let registry = DeviceRegistry::new();
        let t0 = Local::now();
        for i in 0..5 {
            registry
                .reconcile_at(&[RawHost::up(ip(9))], None, t0 + Duration::seconds(i * 30))
                .await;
        }
        assert_eq!(registry.lookup("10.0.0.9").await.unwrap().first_seen, t0);
    }

    #[tokio::test]
    async fn blocked_flag_survives_reconcile() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;
        registry.set_blocked("10.0.0.5", true).await.unwrap();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;
        assert!(registry.lookup("10.0.0.5").await.unwrap().blocked);
    }

    #[tokio::test]
    async fn mac_block_follows_device_to_new_address() {
        let registry = DeviceRegistry::new();
        let mac = "aa:bb:cc:dd:ee:02";
        registry.reconcile(&[RawHost::up(ip(5)).with_mac(mac)], None).await;
        registry.set_blocked(mac, true).await.unwrap();

        registry.reconcile(&[RawHost::up(ip(6)).with_mac(mac)], None).await;
        assert!(registry.lookup("10.0.0.6").await.unwrap().blocked);
        assert_eq!(registry.lookup("10.0.0.5").await.unwrap().status, DeviceStatus::Down);
    }

    #[tokio::test]
    async fn rows_sharing_a_mac_follow_the_block_set() {
        let registry = DeviceRegistry::new();
        let mac = "aa:bb:cc:dd:ee:02";
        registry.reconcile(&[RawHost::up(ip(5)).with_mac(mac)], None).await;
        registry.set_blocked(mac, true).await.unwrap();
        registry.reconcile(&[RawHost::up(ip(6)).with_mac(mac)], None).await;

        let update = registry.set_blocked("10.0.0.6", false).await.unwrap();
        assert!(update.changed);
        assert_eq!(update.also_changed.len(), 1);
        assert_eq!(update.also_changed[0].ip, ip(5));
        assert!(!update.also_changed[0].blocked);

        assert!(!registry.lookup("10.0.0.5").await.unwrap().blocked);
        assert!(registry.blocked_identifiers().await.is_empty());
        assert_eq!(registry.counts().await.blocked, 0);
    }

    #[tokio::test]
    async fn mac_block_covers_every_row_with_that_mac() {
        let registry = DeviceRegistry::new();
        let mac = "aa:bb:cc:dd:ee:05";
        registry
            .reconcile(
                &[RawHost::up(ip(5)).with_mac(mac), RawHost::up(ip(6)).with_mac(mac)],
                None,
            )
            .await;

        let update = registry.set_blocked("10.0.0.5", true).await.unwrap();
        assert!(update.changed);
        // An IP block does not reach the other row
        assert!(update.also_changed.is_empty());
        assert!(!registry.lookup("10.0.0.6").await.unwrap().blocked);

        let update = registry.set_blocked(mac, true).await.unwrap();
        assert!(!update.changed);
        assert_eq!(update.also_changed.len(), 1);
        assert!(registry.lookup("10.0.0.6").await.unwrap().blocked);
        assert_eq!(registry.counts().await.blocked, 2);
    }

    #[tokio::test]
    async fn lookup_prefers_ip_then_mac() {
        let registry = DeviceRegistry::new();
        registry
            .reconcile(&[RawHost::up(ip(5)).with_mac("aa:bb:cc:dd:ee:03")], None)
            .await;

        assert_eq!(registry.lookup("10.0.0.5").await.unwrap().ip, ip(5));
        assert_eq!(registry.lookup("AA:BB:CC:DD:EE:03").await.unwrap().ip, ip(5));
        assert!(registry.lookup("10.0.0.99").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn sentinel_is_never_an_identifier() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;
        assert!(registry.lookup(UNKNOWN).await.unwrap_err().is_not_found());
        assert!(matches!(
            registry.set_blocked("", true).await,
            Err(NetGuardError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn block_then_unblock_clears_block_set() {
        let registry = DeviceRegistry::new();
        registry
            .reconcile(&[RawHost::up(ip(5)).with_mac("aa:bb:cc:dd:ee:04")], None)
            .await;

        let update = registry.set_blocked("aa:bb:cc:dd:ee:04", true).await.unwrap();
        assert!(update.changed && update.device.blocked);
        assert_eq!(registry.blocked_identifiers().await, vec!["aa:bb:cc:dd:ee:04"]);

        let update = registry.set_blocked("10.0.0.5", false).await.unwrap();
        assert!(update.changed && !update.device.blocked);
        assert!(registry.blocked_identifiers().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_identifier_mutates_nothing() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], None).await;
        let before = registry.snapshot().await;

        assert!(registry.set_blocked("10.0.0.42", true).await.unwrap_err().is_not_found());
        assert!(registry
            .set_status("10.0.0.42", DeviceStatus::Down)
            .await
            .unwrap_err()
            .is_not_found());

        assert_eq!(registry.snapshot().await, before);
        assert!(registry.blocked_identifiers().await.is_empty());
    }

    #[tokio::test]
    async fn local_flag_is_recomputed() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&[RawHost::up(ip(5))], Some(ip(5))).await;
        assert!(registry.lookup("10.0.0.5").await.unwrap().is_local);
        registry.reconcile(&[RawHost::up(ip(5))], Some(ip(6))).await;
        assert!(!registry.lookup("10.0.0.5").await.unwrap().is_local);
    }

    #[tokio::test]
    async fn counts_reflect_status_and_blocks() {
        let registry = DeviceRegistry::new();
        registry
            .reconcile(&[RawHost::up(ip(1)), RawHost::up(ip(2)), RawHost::up(ip(3))], None)
            .await;
        registry.reconcile(&[RawHost::up(ip(1)), RawHost::up(ip(2))], None).await;
        registry.set_blocked("10.0.0.2", true).await.unwrap();

        assert_eq!(
            registry.counts().await,
            DeviceCounts {
                active: 2,
                blocked: 1,
                total: 3
            }
        );
    }
}
