// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The ICMPv6 subset the router participates in.
//!
//! Neighbor Solicitation and Advertisement keep the neighbor cache fed,
//! Echo makes the router pingable, and Time Exceeded reports expired hop
//! limits back to senders. Checksums cover the IPv6 pseudo-header chained
//! into the message body.

use crate::DropReason;
use crate::addr;
use crate::packet::PacketChain;
use crate::router::DeviceId;
use crate::router::Router;
use crate::wire::EchoMessage;
use crate::wire::ICMPV6_TYPE_ECHO_REPLY;
use crate::wire::ICMPV6_TYPE_ECHO_REQUEST;
use crate::wire::ICMPV6_TYPE_NEIGHBOR_ADVERT;
use crate::wire::ICMPV6_TYPE_NEIGHBOR_SOLICIT;
use crate::wire::ICMPV6_TYPE_TIME_EXCEEDED;
use crate::wire::IPPROTO_ICMPV6;
use crate::wire::Icmpv6Header;
use crate::wire::Ipv6Header;
use crate::wire::NA_FLAG_OVERRIDE;
use crate::wire::NA_FLAG_SOLICITED;
use crate::wire::ND_OPTION_SOURCE_LINK_ADDR;
use crate::wire::ND_OPTION_TARGET_LINK_ADDR;
use crate::wire::NeighborMessage;
use crate::wire::TimeExceededMessage;
use crate::wire::icmpv6_checksum;
use std::net::Ipv6Addr;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;
use zerocopy::byteorder::U16;
use zerocopy::byteorder::U32;

/// Largest Echo payload we are willing to reflect.
const MAX_ECHO_PAYLOAD: usize = 256;

/// How much of an invoking packet fits in a Time Exceeded message without
/// exceeding the IPv6 minimum MTU.
const MAX_TIME_EXCEEDED_QUOTE: usize =
    1280 - size_of::<Ipv6Header>() - size_of::<TimeExceededMessage>();

impl Router {
    pub(crate) fn handle_icmpv6(
        &mut self,
        dev: DeviceId,
        src: &Ipv6Addr,
        payload: &[u8],
    ) -> Result<(), DropReason> {
        let (hdr, _) =
            Icmpv6Header::read_from_prefix(payload).map_err(|_| DropReason::Icmpv6TooShort)?;
        tracing::debug!(
            dev = %self.device_name(dev),
            msg_type = hdr.msg_type,
            code = hdr.code,
            "received icmpv6 message"
        );

        match hdr.msg_type {
            ICMPV6_TYPE_NEIGHBOR_SOLICIT => self.handle_neighbor_solicit(dev, src, payload),
            ICMPV6_TYPE_NEIGHBOR_ADVERT => self.handle_neighbor_advert(dev, payload),
            ICMPV6_TYPE_ECHO_REQUEST => self.handle_echo_request(dev, src, payload),
            other => Err(DropReason::UnhandledIcmpv6Type(other)),
        }
    }

    /// Answers a solicitation for our own address and learns the asker.
    fn handle_neighbor_solicit(
        &mut self,
        dev: DeviceId,
        src: &Ipv6Addr,
        payload: &[u8],
    ) -> Result<(), DropReason> {
        let (ns, _) =
            NeighborMessage::read_from_prefix(payload).map_err(|_| DropReason::Icmpv6TooShort)?;
        let binding = self.device_binding(dev).ok_or(DropReason::NoIpv6Binding)?;

        let target = ns.target_addr();
        if target != binding.address {
            return Err(DropReason::NsTargetNotOurs(target));
        }
        tracing::debug!(%target, asker = %ns.option_mac, "neighbor solicitation for our address");

        // Learn the asker before replying so the unicast advertisement can
        // resolve its way out.
        self.neighbors.update(dev, ns.option_mac, *src);

        let mut na = NeighborMessage {
            hdr: Icmpv6Header {
                msg_type: ICMPV6_TYPE_NEIGHBOR_ADVERT,
                code: 0,
                checksum: U16::new(0),
            },
            flags: U32::new(NA_FLAG_SOLICITED | NA_FLAG_OVERRIDE),
            target: ns.target,
            option_type: ND_OPTION_TARGET_LINK_ADDR,
            option_len: 1,
            option_mac: self.device_mac(dev),
        };
        na.hdr.checksum = U16::new(icmpv6_checksum(&binding.address, src, na.as_bytes()));

        let chain = PacketChain::with_payload(na.as_bytes().to_vec());
        self.send_ipv6_on_device(dev, ns.option_mac, src, chain, IPPROTO_ICMPV6)
    }

    /// Learns the advertised neighbor.
    fn handle_neighbor_advert(&mut self, dev: DeviceId, payload: &[u8]) -> Result<(), DropReason> {
        let (na, _) =
            NeighborMessage::read_from_prefix(payload).map_err(|_| DropReason::Icmpv6TooShort)?;
        tracing::debug!(
            target = %na.target_addr(),
            mac = %na.option_mac,
            "updating nd entry from neighbor advertisement"
        );
        self.neighbors.update(dev, na.option_mac, na.target_addr());
        Ok(())
    }

    /// Reflects an Echo Request back at its sender.
    fn handle_echo_request(
        &mut self,
        dev: DeviceId,
        src: &Ipv6Addr,
        payload: &[u8],
    ) -> Result<(), DropReason> {
        let (echo, data) =
            EchoMessage::read_from_prefix(payload).map_err(|_| DropReason::Icmpv6TooShort)?;
        if data.len() > MAX_ECHO_PAYLOAD {
            return Err(DropReason::EchoPayloadTooLarge(data.len()));
        }
        let binding = self.device_binding(dev).ok_or(DropReason::NoIpv6Binding)?;
        tracing::debug!(
            ident = echo.ident.get(),
            seq = echo.seq.get(),
            len = data.len(),
            "received echo request"
        );

        let reply = EchoMessage {
            hdr: Icmpv6Header {
                msg_type: ICMPV6_TYPE_ECHO_REPLY,
                code: 0,
                checksum: U16::new(0),
            },
            ident: echo.ident,
            seq: echo.seq,
        };
        let mut message = reply.as_bytes().to_vec();
        message.extend_from_slice(data);
        let checksum = icmpv6_checksum(&binding.address, src, &message);
        message[2..4].copy_from_slice(&checksum.to_be_bytes());

        let chain = PacketChain::with_payload(message);
        self.send_ipv6(src, &binding.address, chain, IPPROTO_ICMPV6)
    }

    /// Solicits the link-layer address of `target` on `dev`.
    pub(crate) fn send_neighbor_solicit(
        &mut self,
        dev: DeviceId,
        target: &Ipv6Addr,
    ) -> Result<(), DropReason> {
        let binding = self.device_binding(dev).ok_or(DropReason::NoIpv6Binding)?;
        let group = addr::solicited_node_multicast(target);

        let mut ns = NeighborMessage {
            hdr: Icmpv6Header {
                msg_type: ICMPV6_TYPE_NEIGHBOR_SOLICIT,
                code: 0,
                checksum: U16::new(0),
            },
            flags: U32::new(0),
            target: target.octets(),
            option_type: ND_OPTION_SOURCE_LINK_ADDR,
            option_len: 1,
            option_mac: self.device_mac(dev),
        };
        ns.hdr.checksum = U16::new(icmpv6_checksum(&binding.address, &group, ns.as_bytes()));

        tracing::debug!(dev = %self.device_name(dev), %target, "sending neighbor solicitation");
        let chain = PacketChain::with_payload(ns.as_bytes().to_vec());
        self.send_ipv6_multicast(dev, &group, chain, IPPROTO_ICMPV6)
    }

    /// Reports an expired hop limit back to the source of `packet`.
    pub(crate) fn send_time_exceeded(
        &mut self,
        dev: DeviceId,
        packet: &[u8],
    ) -> Result<(), DropReason> {
        let binding = self.device_binding(dev).ok_or(DropReason::NoIpv6Binding)?;
        let (hdr, _) =
            Ipv6Header::read_from_prefix(packet).map_err(|_| DropReason::PacketTooShort)?;
        let source = hdr.src_addr();

        let header = TimeExceededMessage {
            hdr: Icmpv6Header {
                msg_type: ICMPV6_TYPE_TIME_EXCEEDED,
                code: 0,
                checksum: U16::new(0),
            },
            unused: U32::new(0),
        };
        let quote = &packet[..packet.len().min(MAX_TIME_EXCEEDED_QUOTE)];
        let mut message = header.as_bytes().to_vec();
        message.extend_from_slice(quote);
        let checksum = icmpv6_checksum(&binding.address, &source, &message);
        message[2..4].copy_from_slice(&checksum.to_be_bytes());

        tracing::debug!(%source, "sending time exceeded");
        let chain = PacketChain::with_payload(message);
        self.send_ipv6(&source, &binding.address, chain, IPPROTO_ICMPV6)
    }
}
