// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ethernet framing.
//!
//! Ingress: parse the 14-byte header, filter on the destination MAC, and
//! dispatch on the ethertype. Egress: prepend the header to the packet
//! chain, flatten the chain into the line buffer, and hand it to the
//! device's transmit sink.

use crate::DropReason;
use crate::packet::PacketChain;
use crate::router::DeviceId;
use crate::router::Router;
use crate::wire::ETHERTYPE_IPV6;
use crate::wire::EthernetHeader;
use crate::wire::MacAddr;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;
use zerocopy::byteorder::U16;

/// Upper bound on a serialized frame, and on the receive buffer the I/O
/// layer should use.
pub const MAX_FRAME_LEN: usize = 1550;

impl Router {
    pub(crate) fn handle_frame(&mut self, dev: DeviceId, frame: &[u8]) -> Result<(), DropReason> {
        let (eth, payload) =
            EthernetHeader::read_from_prefix(frame).map_err(|_| DropReason::FrameTooShort)?;

        // Take frames addressed to us, broadcasts, and IPv6 multicasts;
        // everything else on the wire is someone else's.
        let ours = eth.dst == self.device_mac(dev)
            || eth.dst == MacAddr::BROADCAST
            || eth.dst.is_ipv6_multicast();
        if !ours {
            return Err(DropReason::NotOurMac);
        }

        let ethertype = eth.ethertype.get();
        tracing::debug!(
            dev = %self.device_name(dev),
            ethertype = %format_args!("{ethertype:#06x}"),
            src = %eth.src,
            dst = %eth.dst,
            "received ethernet frame"
        );

        match ethertype {
            ETHERTYPE_IPV6 => self.handle_ipv6(dev, payload),
            other => Err(DropReason::UnhandledEtherType(other)),
        }
    }

    /// Encapsulates `chain` in an Ethernet header and transmits it on
    /// `dev`.
    pub(crate) fn send_frame(
        &mut self,
        dev: DeviceId,
        dst: MacAddr,
        mut chain: PacketChain,
        ethertype: u16,
    ) -> Result<(), DropReason> {
        let header = EthernetHeader {
            dst,
            src: self.device_mac(dev),
            ethertype: U16::new(ethertype),
        };
        chain.push_header(header.as_bytes().to_vec());

        let mut line = [0; MAX_FRAME_LEN];
        let len = chain
            .serialize_into(&mut line)
            .ok_or_else(|| DropReason::FrameTooLong(chain.len()))?;

        tracing::debug!(
            dev = %self.device_name(dev),
            ethertype = %format_args!("{ethertype:#06x}"),
            dst = %dst,
            len,
            "sending ethernet frame"
        );
        self.transmit(dev, &line[..len]);
        Ok(())
    }
}
