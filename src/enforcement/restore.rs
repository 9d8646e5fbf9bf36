use super::arp::{open_sender, send_arp_reply, ArpPeers};
use anyhow::{anyhow, Result};
use std::thread;
use std::time::Duration;

/// Re-announces the real mappings after a kick so both caches heal without
/// waiting for their entries to expire.
pub fn restore_target(peers: &ArpPeers, rounds: u32, pause: Duration) -> Result<()> {
    if !peers.knows_gateway_mac() {
        return Err(anyhow!(
            "Gateway MAC unknown; {} will recover when its ARP cache expires",
            peers.target_ip
        ));
    }

    let mut tx = open_sender(&peers.interface)?;

    for round in 0..rounds {
        // Restore target device
        send_arp_reply(
            &mut *tx,
            peers.our_mac,
            peers.gateway_ip,
            peers.gateway_mac,
            peers.target_ip,
            peers.target_mac,
        )?;

        // Restore gateway
        send_arp_reply(
            &mut *tx,
            peers.our_mac,
            peers.target_ip,
            peers.target_mac,
            peers.gateway_ip,
            peers.gateway_mac,
        )?;

        if round + 1 < rounds {
            thread::sleep(pause);
        }
    }

    tracing::info!("Restored ARP mappings for {}", peers.target_ip);
    Ok(())
}
