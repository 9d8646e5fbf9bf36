//! The discovery engine: scan pipeline, background loop, triggers and settings.

use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::access::AccessController;
use crate::arp_table::{ArpLookup, SystemArpTable};
use crate::config::{parse_scan_interval, EngineConfig, SweepMode};
use crate::enforcement::{self, Enforcer};
use crate::errors::Result;
use crate::hostname::{HostnameResolver, ReverseDns, SystemDns};
use crate::interface::{NetworkInfoResolver, SystemNetworkInfo};
use crate::models::{NetworkDevice, NetworkInfo, NetworkStats, SystemInfo, TrafficSample};
use crate::registry::{DeviceRegistry, ReconcileSummary};
use crate::scanner::{IcmpSweep, NmapSweep, ScanExecutor, SweepPrimitive};
use crate::stats::{CounterSource, StatsAggregator, SysinfoCounters, TrafficSeries};

/// Everything the engine talks to outside its own memory.
#[derive(Clone)]
pub struct Collaborators {
    pub network: Arc<dyn NetworkInfoResolver>,
    pub sweep: Arc<dyn SweepPrimitive>,
    pub arp: Arc<dyn ArpLookup>,
    pub dns: Arc<dyn ReverseDns>,
    pub counters: Arc<dyn CounterSource>,
    pub enforcer: Arc<dyn Enforcer>,
}

impl Collaborators {
    /// The real operating-system implementations.
    pub fn system(config: &EngineConfig) -> Self {
        let sweep: Arc<dyn SweepPrimitive> = match config.sweep_mode {
            SweepMode::Nmap => Arc::new(NmapSweep),
            SweepMode::Icmp => Arc::new(IcmpSweep::new(
                config.ping_timeout,
                config.max_concurrent_probes,
            )),
        };

        Self {
            network: Arc::new(SystemNetworkInfo),
            sweep,
            arp: Arc::new(SystemArpTable),
            dns: Arc::new(SystemDns),
            counters: Arc::new(SysinfoCounters::new()),
            enforcer: enforcement::platform_default(config),
        }
    }
}

/// Outcome of [`NetworkMonitor::trigger_scan`]. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    Started,
    /// A triggered scan was already running and will cover this request.
    Coalesced,
}

#[derive(Clone)]
pub struct NetworkMonitor {
    network: Arc<dyn NetworkInfoResolver>,
    executor: Arc<ScanExecutor>,
    registry: Arc<DeviceRegistry>,
    access: AccessController,
    stats: Arc<StatsAggregator>,
    scan_interval: Arc<AtomicU64>,
    last_scan_time: Arc<Mutex<Option<DateTime<Local>>>>,
    scanning: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl NetworkMonitor {
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let hostnames = HostnameResolver::new(collaborators.dns, config.hostname_timeout);
        let executor = ScanExecutor::new(
            collaborators.sweep,
            collaborators.arp,
            hostnames,
            config.max_concurrent_probes,
        );
        let registry = Arc::new(DeviceRegistry::new());
        let access = AccessController::new(
            Arc::clone(&registry),
            collaborators.enforcer,
            Arc::clone(&collaborators.network),
            config.kick_duration,
        );

        Self {
            network: collaborators.network,
            executor: Arc::new(executor),
            registry,
            access,
            stats: Arc::new(StatsAggregator::new(collaborators.counters)),
            scan_interval: Arc::new(AtomicU64::new(config.scan_interval_secs)),
            last_scan_time: Arc::new(Mutex::new(None)),
            scanning: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// One full pipeline pass: resolve, sweep, reconcile, stats.
    ///
    /// A failed sweep abandons the cycle; the registry, stats and last scan
    /// time are left exactly as they were.
    pub async fn run_cycle(&self) -> Result<ReconcileSummary> {
        let network = self.network_info().await;

        let hosts = match self.executor.sweep(&network).await {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::warn!("Scan cycle abandoned: {}", e);
                return Err(e);
            }
        };

        let summary = self.registry.reconcile(&hosts, network.local_ipv4()).await;

        if let Err(e) = self.stats.refresh(&self.registry, &network).await {
            tracing::warn!("Could not update traffic stats: {}", e);
        }

        *self.last_scan_time.lock().await = Some(Local::now());
        tracing::info!(
            "Scan complete: {} hosts up, {} new, {} went offline",
            summary.observed,
            summary.added,
            summary.went_offline
        );
        Ok(summary)
    }

    /// Starts an extra pipeline run in the background. While one triggered
    /// run is in flight, further triggers fold into it.
    pub fn trigger_scan(&self) -> ScanTrigger {
        if self.scanning.swap(true, Ordering::SeqCst) {
            tracing::debug!("Scan already in progress, request coalesced");
            return ScanTrigger::Coalesced;
        }

        let this = self.clone();
        tokio::spawn(async move {
            // Failures are logged inside run_cycle
            let _ = this.run_cycle().await;
            this.scanning.store(false, Ordering::SeqCst);
        });
        ScanTrigger::Started
    }

    /// Runs the pipeline every `scan_interval` seconds until [`shutdown`](Self::shutdown).
    pub fn spawn_background(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tracing::info!(
                "Background scanning started (interval: {}s)",
                this.scan_interval()
            );

            while !this.stopped.load(Ordering::SeqCst) {
                let _ = this.run_cycle().await;

                // Re-read each time so settings changes apply to the next wait
                let wait = Duration::from_secs(this.scan_interval());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = this.shutdown.notified() => break,
                }
            }

            tracing::info!("Background scanning stopped");
        })
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn scan_interval(&self) -> u64 {
        self.scan_interval.load(Ordering::SeqCst)
    }

    /// Validates and applies a new scan interval from a settings payload.
    pub fn set_scan_interval(&self, value: &Value) -> Result<u64> {
        let secs = parse_scan_interval(value)?;
        self.scan_interval.store(secs, Ordering::SeqCst);
        tracing::info!("Scan interval set to {}s", secs);
        Ok(secs)
    }

    pub async fn block(&self, identifier: &str) -> Result<NetworkDevice> {
        self.access.block(identifier).await
    }

    pub async fn unblock(&self, identifier: &str) -> Result<NetworkDevice> {
        self.access.unblock(identifier).await
    }

    pub async fn kick(&self, identifier: &str) -> Result<NetworkDevice> {
        self.access.kick(identifier).await
    }

    pub async fn devices(&self) -> Vec<NetworkDevice> {
        self.registry.snapshot().await
    }

    pub fn stats(&self) -> Option<NetworkStats> {
        self.stats.latest()
    }

    pub fn traffic_history(&self) -> Vec<TrafficSample> {
        self.stats.history()
    }

    pub fn traffic_series(&self) -> TrafficSeries {
        self.stats.history_series()
    }

    /// Fresh network identity, never cached.
    pub async fn network_info(&self) -> NetworkInfo {
        self.network.resolve().await
    }

    /// OS, uptime, memory and disk figures of this machine.
    pub async fn system_info(&self) -> SystemInfo {
        crate::system::system_info().await
    }

    pub async fn last_scan_time(&self) -> Option<DateTime<Local>> {
        *self.last_scan_time.lock().await
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }
}
