//! Raw ARP reply frames shared by the kick and restore paths.

use anyhow::{anyhow, Result};
use pnet::datalink::{self, Channel, DataLinkSender, MacAddr, NetworkInterface};
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::Packet;
use std::net::Ipv4Addr;

use crate::arp_table::normalize_mac;
use crate::models::NetworkInfo;

/// The two ends of the link a kick sits between.
#[derive(Debug, Clone)]
pub struct ArpPeers {
    pub interface: NetworkInterface,
    pub our_mac: MacAddr,
    pub target_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub gateway_ip: Ipv4Addr,
    /// Broadcast when the gateway's MAC could not be resolved.
    pub gateway_mac: MacAddr,
}

impl ArpPeers {
    pub fn resolve(
        network: &NetworkInfo,
        target_ip: Ipv4Addr,
        target_mac: &str,
        gateway_mac: Option<&str>,
    ) -> Result<Self> {
        let interface = find_interface(&network.interface)?;
        let our_mac = interface
            .mac
            .ok_or_else(|| anyhow!("Interface {} has no MAC address", interface.name))?;
        let gateway_ip = network
            .gateway_ipv4()
            .ok_or_else(|| anyhow!("Gateway address unknown ({})", network.gateway_ip))?;
        let target_mac = parse_mac(target_mac)?;
        let gateway_mac = match gateway_mac {
            Some(mac) => parse_mac(mac)?,
            None => MacAddr::broadcast(),
        };

        Ok(Self {
            interface,
            our_mac,
            target_ip,
            target_mac,
            gateway_ip,
            gateway_mac,
        })
    }

    pub fn knows_gateway_mac(&self) -> bool {
        self.gateway_mac != MacAddr::broadcast()
    }
}

fn parse_mac(raw: &str) -> Result<MacAddr> {
    normalize_mac(raw)
        .ok_or_else(|| anyhow!("'{}' is not a usable MAC address", raw))?
        .parse::<MacAddr>()
        .map_err(|e| anyhow!("Invalid MAC {}: {:?}", raw, e))
}

/// The named interface, or the first up, non-loopback interface with a MAC and IPv4.
pub fn find_interface(name: &str) -> Result<NetworkInterface> {
    let interfaces = datalink::interfaces();
    if let Some(found) = interfaces.iter().find(|iface| iface.name == name) {
        return Ok(found.clone());
    }
    interfaces
        .into_iter()
        .find(|iface| {
            iface.is_up()
                && !iface.is_loopback()
                && iface.mac.is_some()
                && iface.ips.iter().any(|ip| ip.is_ipv4())
        })
        .ok_or_else(|| anyhow!("No suitable network interface found"))
}

pub fn open_sender(interface: &NetworkInterface) -> Result<Box<dyn DataLinkSender>> {
    match datalink::channel(interface, Default::default()) {
        Ok(Channel::Ethernet(tx, _rx)) => Ok(tx),
        Ok(_) => Err(anyhow!("Unsupported channel type")),
        Err(e) => Err(anyhow!("Failed to create channel: {}", e)),
    }
}

/// Sends an ARP reply claiming `sender_ip` is at `sender_mac`, addressed to `target_*`.
pub fn send_arp_reply(
    tx: &mut dyn DataLinkSender,
    frame_source: MacAddr,
    sender_ip: Ipv4Addr,
    sender_mac: MacAddr,
    target_ip: Ipv4Addr,
    target_mac: MacAddr,
) -> Result<()> {
    let mut ethernet_buffer = [0u8; 42];
    let mut ethernet_packet = MutableEthernetPacket::new(&mut ethernet_buffer)
        .ok_or_else(|| anyhow!("Ethernet buffer too small"))?;

    ethernet_packet.set_destination(target_mac);
    ethernet_packet.set_source(frame_source);
    ethernet_packet.set_ethertype(EtherTypes::Arp);

    let mut arp_buffer = [0u8; 28];
    let mut arp_packet =
        MutableArpPacket::new(&mut arp_buffer).ok_or_else(|| anyhow!("ARP buffer too small"))?;

    arp_packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp_packet.set_protocol_type(EtherTypes::Ipv4);
    arp_packet.set_hw_addr_len(6);
    arp_packet.set_proto_addr_len(4);
    arp_packet.set_operation(ArpOperations::Reply);
    arp_packet.set_sender_hw_addr(sender_mac);
    arp_packet.set_sender_proto_addr(sender_ip);
    arp_packet.set_target_hw_addr(target_mac);
    arp_packet.set_target_proto_addr(target_ip);

    ethernet_packet.set_payload(arp_packet.packet());

    match tx.send_to(ethernet_packet.packet(), None) {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(anyhow!("Failed to send ARP reply to {}: {}", target_ip, e)),
        None => Err(anyhow!("ARP reply to {} was not sent", target_ip)),
    }
}
