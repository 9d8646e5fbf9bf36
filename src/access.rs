//! Block, unblock and kick, with in-memory state authoritative over the OS.

use dashmap::DashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::enforcement::{Capability, EnforcementTarget, Enforcer};
use crate::errors::{NetGuardError, Result};
use crate::interface::NetworkInfoResolver;
use crate::models::{DeviceStatus, NetworkDevice};
use crate::registry::DeviceRegistry;

/// The deferred unblock of one kick. `token` identifies which kick owns it.
#[derive(Debug)]
struct PendingKick {
    token: u64,
    handle: AbortHandle,
}

#[derive(Clone)]
pub struct AccessController {
    registry: Arc<DeviceRegistry>,
    enforcer: Arc<dyn Enforcer>,
    network: Arc<dyn NetworkInfoResolver>,
    kick_duration: Duration,
    pending: Arc<DashMap<Ipv4Addr, PendingKick>>,
    generation: Arc<AtomicU64>,
    /// Serializes block, unblock, kick and kick expiry end to end.
    ops: Arc<Mutex<()>>,
}

impl AccessController {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        enforcer: Arc<dyn Enforcer>,
        network: Arc<dyn NetworkInfoResolver>,
        kick_duration: Duration,
    ) -> Self {
        Self {
            registry,
            enforcer,
            network,
            kick_duration,
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            ops: Arc::new(Mutex::new(())),
        }
    }

    /// Blocks a device by IP or MAC. OS enforcement is best-effort.
    pub async fn block(&self, identifier: &str) -> Result<NetworkDevice> {
        let _guard = self.ops.lock().await;
        let device = self.registry.lookup(identifier).await?;
        self.cancel_pending(device.ip);
        self.block_inner(identifier).await
    }

    /// Unblocks a device by IP or MAC. Unblocking a device that was never
    /// blocked succeeds without touching the OS.
    pub async fn unblock(&self, identifier: &str) -> Result<NetworkDevice> {
        let _guard = self.ops.lock().await;
        let device = self.registry.lookup(identifier).await?;
        self.cancel_pending(device.ip);
        self.unblock_inner(identifier).await
    }

    /// Cuts a device off for the configured kick duration.
    ///
    /// The device is marked down and blocked right away; the block lifts on
    /// its own unless an explicit block or unblock happens first. Kicking a
    /// device that is already explicitly blocked leaves the block permanent.
    pub async fn kick(&self, identifier: &str) -> Result<NetworkDevice> {
        let _guard = self.ops.lock().await;
        let device = self.registry.lookup(identifier).await?;
        let spoof = self.enforcer.supports(Capability::ArpSpoofKick);
        if spoof && !device.has_mac() {
            return Err(NetGuardError::MissingMac(device.ip.to_string()));
        }

        let ip = device.ip;
        let key = ip.to_string();
        let held_by_block = device.blocked && !self.pending.contains_key(&ip);

        self.registry.set_status(&key, DeviceStatus::Down).await?;

        if spoof {
            let target = EnforcementTarget::from(&device);
            let network = self.network.resolve().await;
            if let Err(e) = self.enforcer.disrupt(&target, &network).await {
                tracing::warn!("ARP disruption of {} failed: {}", ip, e);
            }
        }

        let device = self.block_inner(&key).await?;

        if held_by_block {
            tracing::info!("Kicked {} (already blocked, block stays)", ip);
        } else {
            self.schedule_unblock(ip);
            tracing::info!("Kicked {} for {:?}", ip, self.kick_duration);
        }
        Ok(device)
    }

    /// Whether a kick's deferred unblock is still outstanding for `ip`.
    pub fn has_pending_kick(&self, ip: Ipv4Addr) -> bool {
        self.pending.contains_key(&ip)
    }

    async fn block_inner(&self, identifier: &str) -> Result<NetworkDevice> {
        let update = self.registry.set_blocked(identifier, true).await?;
        for other in &update.also_changed {
            self.enforce_block(other).await?;
        }
        if !update.changed {
            return Ok(update.device);
        }
        self.enforce_block(&update.device).await
    }

    async fn unblock_inner(&self, identifier: &str) -> Result<NetworkDevice> {
        let update = self.registry.set_blocked(identifier, false).await?;
        for other in &update.also_changed {
            self.cancel_pending(other.ip);
            self.enforce_unblock(other).await?;
        }
        if !update.changed {
            return Ok(update.device);
        }
        self.enforce_unblock(&update.device).await
    }

    async fn enforce_block(&self, device: &NetworkDevice) -> Result<NetworkDevice> {
        let target = EnforcementTarget::from(device);
        match self.enforcer.block(&target).await {
            Ok(method) => {
                tracing::info!("Blocked {} ({:?})", target.ip, method);
                self.registry.set_blocking_method(target.ip, Some(method)).await
            }
            Err(e) => {
                tracing::warn!("Could not enforce block of {}: {}", target.ip, e);
                Ok(device.clone())
            }
        }
    }

    async fn enforce_unblock(&self, device: &NetworkDevice) -> Result<NetworkDevice> {
        let target = EnforcementTarget::from(device);
        if let Err(e) = self.enforcer.unblock(&target, device.blocking_method).await {
            tracing::warn!("Could not remove block of {}: {}", target.ip, e);
        }
        tracing::info!("Unblocked {}", target.ip);
        self.registry.set_blocking_method(target.ip, None).await
    }

    fn schedule_unblock(&self, ip: Ipv4Addr) {
        let token = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let this = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(this.kick_duration).await;
            this.finish_kick(ip, token).await;
        });

        let pending = PendingKick {
            token,
            handle: task.abort_handle(),
        };
        if let Some(previous) = self.pending.insert(ip, pending) {
            previous.handle.abort();
        }
    }

    async fn finish_kick(&self, ip: Ipv4Addr, token: u64) {
        // Explicit operations cancel pending entries while holding `ops`, so
        // the token check and the unblock below cannot interleave with them
        let _guard = self.ops.lock().await;
        if self
            .pending
            .remove_if(&ip, |_, pending| pending.token == token)
            .is_none()
        {
            return;
        }

        match self.unblock_inner(&ip.to_string()).await {
            Ok(device) => {
                tracing::info!("Kick of {} expired", ip);
                if self.enforcer.supports(Capability::ArpSpoofKick) {
                    let target = EnforcementTarget::from(&device);
                    let network = self.network.resolve().await;
                    if let Err(e) = self.enforcer.restore(&target, &network).await {
                        tracing::warn!("ARP restore of {} failed: {}", ip, e);
                    }
                }
            }
            Err(e) => tracing::warn!("Deferred unblock of {} failed: {}", ip, e),
        }
    }

    fn cancel_pending(&self, ip: Ipv4Addr) {
        if let Some((_, pending)) = self.pending.remove(&ip) {
            pending.handle.abort();
            tracing::debug!("Cancelled pending kick expiry for {}", ip);
        }
    }
}
