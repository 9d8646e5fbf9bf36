use netguard::models::{DeviceStatus, IoCounters, UNKNOWN};
use netguard::ScanTrigger;
use serde_json::json;
use std::time::Duration;
use test_utils::{harness, ip, FakeEnforcer, LOCAL_HOSTNAME, LOCAL_MAC};

mod test_utils;

#[tokio::test]
async fn test_cycle_populates_registry() {
    let h = harness(FakeEnforcer::firewall_only());

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.observed, 3);
    assert_eq!(summary.added, 3);

    let devices = h.monitor.devices().await;
    assert_eq!(devices.len(), 3);
    assert!(devices.iter().all(|d| d.status == DeviceStatus::Up));

    let gateway = devices.iter().find(|d| d.ip == ip(1)).unwrap();
    assert_eq!(gateway.hostname, UNKNOWN);
    assert_eq!(gateway.mac, UNKNOWN);
    assert!(!gateway.is_local);

    let local = devices.iter().find(|d| d.ip == ip(10)).unwrap();
    assert!(local.is_local);
    assert_eq!(local.hostname, LOCAL_HOSTNAME);
    assert_eq!(local.mac, LOCAL_MAC);

    let printer = devices.iter().find(|d| d.ip == ip(20)).unwrap();
    assert_eq!(printer.hostname, "printer.lan");
    assert_eq!(printer.mac, "aa:bb:cc:dd:ee:20");
    assert_eq!(printer.first_seen, printer.last_seen);

    let stats = h.monitor.stats().unwrap();
    assert_eq!(stats.total_devices, 3);
    assert_eq!(stats.active_devices, 3);
    assert_eq!(stats.local_ip, "192.168.1.10");
    assert!(h.monitor.last_scan_time().await.is_some());
}

#[tokio::test]
async fn test_sweep_failure_leaves_state_untouched() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();
    let before = h.monitor.devices().await;
    let scanned_at = h.monitor.last_scan_time().await;

    h.sweep.fail();
    assert!(h.monitor.run_cycle().await.is_err());

    assert_eq!(h.monitor.devices().await, before);
    assert_eq!(h.monitor.last_scan_time().await, scanned_at);
    assert_eq!(h.monitor.traffic_history().len(), 1);
}

#[tokio::test]
async fn test_empty_sweep_marks_everything_down() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();

    h.sweep.set_up(&[]);
    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.went_offline, 3);

    let devices = h.monitor.devices().await;
    assert_eq!(devices.len(), 3);
    assert!(devices.iter().all(|d| d.status == DeviceStatus::Down));
}

#[tokio::test]
async fn test_absent_device_goes_down_and_keeps_identity() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();

    h.sweep.set_up(&[ip(1), ip(10)]);
    h.dns.names.lock().unwrap().clear();
    h.arp.table.lock().unwrap().clear();
    h.monitor.run_cycle().await.unwrap();

    let printer = h.monitor.registry().lookup("192.168.1.20").await.unwrap();
    assert_eq!(printer.status, DeviceStatus::Down);
    assert_eq!(printer.hostname, "printer.lan");
    assert_eq!(printer.mac, "aa:bb:cc:dd:ee:20");

    let stats = h.monitor.stats().unwrap();
    assert_eq!(stats.active_devices, 2);
    assert_eq!(stats.total_devices, 3);
}

#[tokio::test]
async fn test_resolved_names_upgrade_unknown_ones() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();

    h.dns.names.lock().unwrap().insert(ip(1), "router.lan".to_string());
    h.arp
        .table
        .lock()
        .unwrap()
        .insert(ip(1), "AA:BB:CC:DD:EE:01".to_string());
    h.monitor.run_cycle().await.unwrap();

    let gateway = h.monitor.registry().lookup("192.168.1.1").await.unwrap();
    assert_eq!(gateway.hostname, "router.lan");
    assert_eq!(gateway.mac, "aa:bb:cc:dd:ee:01");
}

#[tokio::test]
async fn test_mac_block_follows_device_to_new_address() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();
    h.monitor.block("AA:BB:CC:DD:EE:20").await.unwrap();

    h.sweep.set_up(&[ip(1), ip(10), ip(21)]);
    h.arp
        .table
        .lock()
        .unwrap()
        .insert(ip(21), "aa:bb:cc:dd:ee:20".to_string());
    h.monitor.run_cycle().await.unwrap();

    let moved = h.monitor.registry().lookup("192.168.1.21").await.unwrap();
    assert!(moved.blocked);
}

#[tokio::test]
async fn test_rates_follow_counter_deltas() {
    let h = harness(FakeEnforcer::firewall_only());
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.monitor.stats().unwrap().upload_rate, 0.0);

    *h.counters.current.lock().unwrap() = IoCounters {
        bytes_sent: 4_096,
        bytes_recv: 8_192,
        ..IoCounters::default()
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.monitor.run_cycle().await.unwrap();

    let stats = h.monitor.stats().unwrap();
    assert!(stats.upload_rate > 0.0);
    assert!(stats.download_rate > stats.upload_rate);

    let series = h.monitor.traffic_series();
    assert_eq!(series.upload, vec![0, 4_096]);
    assert_eq!(series.download, vec![0, 8_192]);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_coalesce_while_scanning() {
    let h = harness(FakeEnforcer::firewall_only());
    h.sweep.set_delay(Duration::from_secs(5));

    assert_eq!(h.monitor.trigger_scan(), ScanTrigger::Started);
    assert_eq!(h.monitor.trigger_scan(), ScanTrigger::Coalesced);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.sweep.calls(), 1);
    assert_eq!(h.monitor.devices().await.len(), 3);

    assert_eq!(h.monitor.trigger_scan(), ScanTrigger::Started);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_runs_until_shutdown() {
    let h = harness(FakeEnforcer::firewall_only());
    let handle = h.monitor.spawn_background();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.sweep.calls(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.sweep.calls(), 2);

    h.monitor.shutdown();
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.sweep.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_to_next_wait() {
    let h = harness(FakeEnforcer::firewall_only());
    let handle = h.monitor.spawn_background();

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.monitor.set_scan_interval(&json!(90)).unwrap();

    // The wait already in progress still uses 30s
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.sweep.calls(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.sweep.calls(), 2);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.sweep.calls(), 3);

    h.monitor.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_settings_validation() {
    let h = harness(FakeEnforcer::firewall_only());

    assert_eq!(h.monitor.set_scan_interval(&json!(30)).unwrap(), 30);
    assert!(h.monitor.set_scan_interval(&json!(29)).is_err());
    assert!(h.monitor.set_scan_interval(&json!("60")).is_err());
    assert!(h.monitor.set_scan_interval(&json!(45.5)).is_err());
    assert!(h.monitor.set_scan_interval(&json!(null)).is_err());
    assert_eq!(h.monitor.scan_interval(), 30);

    assert_eq!(h.monitor.set_scan_interval(&json!(300)).unwrap(), 300);
    assert_eq!(h.monitor.scan_interval(), 300);
}
