//! Host facts: OS, uptime, memory and usage of the root volume.

use std::path::Path;
use sysinfo::{Disks, System};

use crate::interface::local_hostname;
use crate::models::{SystemInfo, UNKNOWN};

/// Reads a fresh snapshot. Blocks while sysinfo walks the OS tables.
pub fn collect_system_info() -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    let disks = Disks::new_with_refreshed_list();
    let (disk_total, disk_free) = root_disk(
        disks
            .list()
            .iter()
            .map(|disk| (disk.mount_point(), disk.total_space(), disk.available_space())),
    )
    .unwrap_or((0, 0));

    let memory_total = sys.total_memory();
    let memory_available = sys.available_memory();

    SystemInfo {
        hostname: local_hostname(),
        platform: System::name().unwrap_or_else(unknown),
        platform_version: System::os_version().unwrap_or_else(unknown),
        processor: sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(unknown),
        architecture: System::cpu_arch().unwrap_or_else(unknown),
        uptime: System::uptime(),
        memory_total,
        memory_available,
        memory_percent: used_percent(memory_total, memory_available),
        disk_total,
        disk_free,
        disk_percent: used_percent(disk_total, disk_free),
    }
}

/// [`collect_system_info`] on a blocking thread. Never fails.
pub async fn system_info() -> SystemInfo {
    match tokio::task::spawn_blocking(collect_system_info).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!("System info task failed: {}", e);
            SystemInfo::default()
        }
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// `(total, free)` of the volume mounted at `/`, or of the largest volume
/// when nothing is mounted there (Windows drive letters).
fn root_disk<'a>(disks: impl IntoIterator<Item = (&'a Path, u64, u64)>) -> Option<(u64, u64)> {
    let mut largest: Option<(u64, u64)> = None;
    for (mount, total, free) in disks {
        if mount == Path::new("/") {
            return Some((total, free));
        }
        if largest.map_or(true, |(biggest, _)| total > biggest) {
            largest = Some((total, free));
        }
    }
    largest
}

/// Used share of `total`, rounded to one decimal.
fn used_percent(total: u64, free: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(free) as f64;
    (used / total as f64 * 1000.0).round() / 10.0
}
