//! Interface counters, derived rates and the rolling traffic window.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::Networks;

use crate::config::TRAFFIC_HISTORY_CAPACITY;
use crate::errors::{NetGuardError, Result};
use crate::models::{DeviceCounts, IoCounters, NetworkInfo, NetworkStats, TrafficSample};
use crate::registry::DeviceRegistry;

const SERIES_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of cumulative interface counters.
pub trait CounterSource: Send + Sync {
    fn read(&self) -> Result<IoCounters>;
}

/// Counters summed over every interface sysinfo reports.
pub struct SysinfoCounters {
    networks: Mutex<Networks>,
}

impl SysinfoCounters {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounters {
    fn read(&self) -> Result<IoCounters> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|_| NetGuardError::Counters("counter state poisoned".to_string()))?;
        networks.refresh();

        let mut counters = IoCounters::default();
        for (_name, data) in networks.iter() {
            counters.bytes_sent += data.total_transmitted();
            counters.bytes_recv += data.total_received();
            counters.packets_sent += data.total_packets_transmitted();
            counters.packets_recv += data.total_packets_received();
        }
        Ok(counters)
    }
}

/// Bounded FIFO of traffic samples, oldest first.
#[derive(Debug, Clone)]
pub struct TrafficHistory {
    samples: VecDeque<TrafficSample>,
    capacity: usize,
}

/// Column form of the history, one entry per sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficSeries {
    pub timestamps: Vec<String>,
    pub upload: Vec<u64>,
    pub download: Vec<u64>,
}

impl TrafficHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: TrafficSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&TrafficSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_vec(&self) -> Vec<TrafficSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn to_series(&self) -> TrafficSeries {
        let mut series = TrafficSeries::default();
        for sample in &self.samples {
            series
                .timestamps
                .push(sample.timestamp.format(SERIES_TIME_FORMAT).to_string());
            series.upload.push(sample.bytes_sent);
            series.download.push(sample.bytes_recv);
        }
        series
    }
}

impl Default for TrafficHistory {
    fn default() -> Self {
        Self::new(TRAFFIC_HISTORY_CAPACITY)
    }
}

#[derive(Debug, Default)]
struct StatsState {
    history: TrafficHistory,
    latest: Option<NetworkStats>,
}

pub struct StatsAggregator {
    counters: Arc<dyn CounterSource>,
    state: Mutex<StatsState>,
}

impl StatsAggregator {
    pub fn new(counters: Arc<dyn CounterSource>) -> Self {
        Self {
            counters,
            state: Mutex::new(StatsState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builds a stats record from one counter reading and appends it to the
    /// history. Rates are zero without a previous sample, when no time has
    /// passed, or when a counter went backwards.
    pub fn update(
        &self,
        counters: IoCounters,
        counts: DeviceCounts,
        network: &NetworkInfo,
        now: DateTime<Local>,
    ) -> NetworkStats {
        let mut state = self.state();

        let (upload_rate, download_rate) = match state.history.latest() {
            Some(prev) => {
                let elapsed = (now - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                (
                    rate(prev.bytes_sent, counters.bytes_sent, elapsed),
                    rate(prev.bytes_recv, counters.bytes_recv, elapsed),
                )
            }
            None => (0.0, 0.0),
        };

        let stats = NetworkStats {
            bytes_sent: counters.bytes_sent,
            bytes_recv: counters.bytes_recv,
            packets_sent: counters.packets_sent,
            packets_recv: counters.packets_recv,
            upload_rate,
            download_rate,
            local_ip: network.local_ip.clone(),
            gateway_ip: network.gateway_ip.clone(),
            interface: network.interface.clone(),
            hostname: network.hostname.clone(),
            active_devices: counts.active,
            blocked_devices: counts.blocked,
            total_devices: counts.total,
            timestamp: now,
        };

        state.history.push(TrafficSample {
            timestamp: now,
            bytes_sent: counters.bytes_sent,
            bytes_recv: counters.bytes_recv,
        });
        state.latest = Some(stats.clone());
        stats
    }

    /// Reads the counter source and registry, then records a sample.
    pub async fn refresh(&self, registry: &DeviceRegistry, network: &NetworkInfo) -> Result<NetworkStats> {
        let counters = self.counters.read()?;
        let counts = registry.counts().await;
        let stats = self.update(counters, counts, network, Local::now());
        tracing::debug!(
            "Traffic: up {:.0} B/s, down {:.0} B/s",
            stats.upload_rate,
            stats.download_rate
        );
        Ok(stats)
    }

    pub fn latest(&self) -> Option<NetworkStats> {
        self.state().latest.clone()
    }

    pub fn history(&self) -> Vec<TrafficSample> {
        self.state().history.to_vec()
    }

    pub fn history_series(&self) -> TrafficSeries {
        self.state().history.to_series()
    }
}

fn rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || current < previous {
        return 0.0;
    }
    (current - previous) as f64 / elapsed_secs
}
