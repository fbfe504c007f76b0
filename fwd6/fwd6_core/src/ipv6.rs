// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! IPv6 ingress classification, forwarding, and egress encapsulation.
//!
//! Ingress packets are classified as multicast (delivered locally only to
//! our solicited-node group), self (addressed to any device's unicast
//! address), or transit (forwarded by longest-prefix match). Egress packets
//! resolve their next hop through the neighbor cache; an unresolved hop
//! costs the packet and triggers a Neighbor Solicitation in its place.

use crate::DropReason;
use crate::packet::PacketChain;
use crate::router::DeviceId;
use crate::router::RouteEntry;
use crate::router::Router;
use crate::wire::ETHERTYPE_IPV6;
use crate::wire::IPPROTO_ICMPV6;
use crate::wire::Ipv6Header;
use crate::wire::MacAddr;
use std::net::Ipv6Addr;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

impl Router {
    pub(crate) fn handle_ipv6(&mut self, dev: DeviceId, packet: &[u8]) -> Result<(), DropReason> {
        let Some(binding) = self.device_binding(dev) else {
            return Err(DropReason::NoIpv6Binding);
        };
        let (hdr, _) =
            Ipv6Header::read_from_prefix(packet).map_err(|_| DropReason::PacketTooShort)?;
        if hdr.version() != 6 {
            return Err(DropReason::BadVersion(hdr.version()));
        }

        let src = hdr.src_addr();
        let dst = hdr.dst_addr();
        tracing::debug!(
            dev = %self.device_name(dev),
            next_header = %format_args!("{:#04x}", hdr.next_header),
            %src,
            %dst,
            "received ipv6 packet"
        );

        if dst.octets()[0] == 0xff {
            // Multicast. The only group we answer to is the solicited-node
            // group of the ingress interface, which shares its low 24 bits.
            if dst.octets()[13..] == binding.address.octets()[13..] {
                return self.deliver_local(dev, packet);
            }
            return Err(DropReason::MulticastNotOurs(dst));
        }

        if let Some(owner) = self.device_owning(&dst) {
            // One of our unicast addresses; the owning device becomes the
            // delivery context even if the packet arrived elsewhere.
            return self.deliver_local(owner, packet);
        }

        self.forward(dev, packet, &dst)
    }

    /// Hands a packet addressed to us to the matching protocol handler.
    fn deliver_local(&mut self, dev: DeviceId, packet: &[u8]) -> Result<(), DropReason> {
        let (hdr, payload) =
            Ipv6Header::read_from_prefix(packet).map_err(|_| DropReason::PacketTooShort)?;
        match hdr.next_header {
            IPPROTO_ICMPV6 => self.handle_icmpv6(dev, &hdr.src_addr(), payload),
            other => Err(DropReason::UnhandledNextHeader(other)),
        }
    }

    /// Forwards a transit packet toward `dst`.
    fn forward(
        &mut self,
        dev: DeviceId,
        packet: &[u8],
        dst: &Ipv6Addr,
    ) -> Result<(), DropReason> {
        let Some(route) = self.route_for(dst) else {
            tracing::info!(%dst, "no route");
            return Err(DropReason::NoRoute(*dst));
        };

        let mut forwarded = packet.to_vec();
        // read_from_prefix succeeded in handle_ipv6, so this cannot fail.
        let (hdr, _) = Ipv6Header::mut_from_prefix(&mut forwarded)
            .map_err(|_| DropReason::PacketTooShort)?;
        if hdr.hop_limit <= 1 {
            // The hop limit would expire here; tell the source instead of
            // forwarding a corpse.
            self.send_time_exceeded(dev, packet)?;
            return Err(DropReason::HopLimitExceeded);
        }
        hdr.hop_limit -= 1;

        let chain = PacketChain::with_payload(forwarded);
        match route {
            RouteEntry::Connected(out) => {
                tracing::debug!(dev = %self.device_name(out), "forwarding ipv6 packet to host");
                self.output_to_host(out, dst, chain)
            }
            RouteEntry::Network(next_hop) => {
                tracing::debug!(%next_hop, "forwarding ipv6 packet to next hop");
                self.output_to_next_hop(&next_hop, chain)
            }
        }
    }

    /// Sends a packet to a destination on a directly connected network.
    ///
    /// An unresolved destination costs the packet: a Neighbor Solicitation
    /// goes out in its place and the sender is expected to retransmit.
    pub(crate) fn output_to_host(
        &mut self,
        dev: DeviceId,
        dst: &Ipv6Addr,
        chain: PacketChain,
    ) -> Result<(), DropReason> {
        match self.neighbors.lookup(dst) {
            Some(entry) => {
                let (dev, mac) = (entry.dev, entry.mac);
                self.send_frame(dev, mac, chain, ETHERTYPE_IPV6)
            }
            None => {
                tracing::debug!(%dst, "no nd record for on-link destination");
                self.send_neighbor_solicit(dev, dst)?;
                Err(DropReason::NeighborUnresolved(*dst))
            }
        }
    }

    /// Sends a packet via the next-hop router at `dst`.
    pub(crate) fn output_to_next_hop(
        &mut self,
        dst: &Ipv6Addr,
        chain: PacketChain,
    ) -> Result<(), DropReason> {
        match self.neighbors.lookup(dst) {
            Some(entry) => {
                let (dev, mac) = (entry.dev, entry.mac);
                self.send_frame(dev, mac, chain, ETHERTYPE_IPV6)
            }
            None => {
                // The next hop itself must be on a connected network for a
                // solicitation to make sense.
                if let Some(RouteEntry::Connected(out)) = self.route_for(dst) {
                    self.send_neighbor_solicit(out, dst)?;
                    return Err(DropReason::NeighborUnresolved(*dst));
                }
                tracing::info!(%dst, "next hop unreachable");
                Err(DropReason::NextHopUnreachable(*dst))
            }
        }
    }

    /// Wraps `chain` in an IPv6 header from `src` and routes it to `dst`.
    pub(crate) fn send_ipv6(
        &mut self,
        dst: &Ipv6Addr,
        src: &Ipv6Addr,
        mut chain: PacketChain,
        next_header: u8,
    ) -> Result<(), DropReason> {
        let hdr = Ipv6Header::new(src, dst, chain.len() as u16, next_header);
        chain.push_header(hdr.as_bytes().to_vec());
        self.output_to_next_hop(dst, chain)
    }

    /// Wraps `chain` in an IPv6 header sourced from `dev`'s address and
    /// transmits it on `dev` to a known unicast MAC.
    pub(crate) fn send_ipv6_on_device(
        &mut self,
        dev: DeviceId,
        dst_mac: MacAddr,
        dst: &Ipv6Addr,
        mut chain: PacketChain,
        next_header: u8,
    ) -> Result<(), DropReason> {
        let binding = self.device_binding(dev).ok_or(DropReason::NoIpv6Binding)?;
        let hdr = Ipv6Header::new(&binding.address, dst, chain.len() as u16, next_header);
        chain.push_header(hdr.as_bytes().to_vec());
        self.send_frame(dev, dst_mac, chain, ETHERTYPE_IPV6)
    }

    /// Wraps `chain` in an IPv6 header sourced from `dev`'s address and
    /// transmits it on `dev` to the Ethernet mapping of the multicast group
    /// `dst`.
    pub(crate) fn send_ipv6_multicast(
        &mut self,
        dev: DeviceId,
        dst: &Ipv6Addr,
        chain: PacketChain,
        next_header: u8,
    ) -> Result<(), DropReason> {
        self.send_ipv6_on_device(dev, MacAddr::for_ipv6_multicast(dst), dst, chain, next_header)
    }
}
