// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire formats for the protocols the router speaks.
//!
//! Bit-exact packed structs over Ethernet II, the IPv6 fixed header, and the
//! ICMPv6 subset we implement. Parsing is zero-copy via
//! [`FromBytes::read_from_prefix`]; building goes through [`IntoBytes`] into
//! a packet buffer chain.

use inet_checksum::Checksum;
use static_assertions::const_assert_eq;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::BigEndian;
use zerocopy::byteorder::U16;
use zerocopy::byteorder::U32;

/// Ethertype for IPv6.
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

/// IPv6 next-header value for ICMPv6.
pub const IPPROTO_ICMPV6: u8 = 0x3a;

/// ICMPv6 type: Time Exceeded.
pub const ICMPV6_TYPE_TIME_EXCEEDED: u8 = 3;
/// ICMPv6 type: Echo Request.
pub const ICMPV6_TYPE_ECHO_REQUEST: u8 = 128;
/// ICMPv6 type: Echo Reply.
pub const ICMPV6_TYPE_ECHO_REPLY: u8 = 129;
/// ICMPv6 type: Neighbor Solicitation.
pub const ICMPV6_TYPE_NEIGHBOR_SOLICIT: u8 = 135;
/// ICMPv6 type: Neighbor Advertisement.
pub const ICMPV6_TYPE_NEIGHBOR_ADVERT: u8 = 136;

/// Neighbor Advertisement flag: response to a solicitation.
pub const NA_FLAG_SOLICITED: u32 = 0x4000_0000;
/// Neighbor Advertisement flag: override an existing cache entry.
pub const NA_FLAG_OVERRIDE: u32 = 0x2000_0000;

/// ND option type: source link-layer address.
pub const ND_OPTION_SOURCE_LINK_ADDR: u8 = 1;
/// ND option type: target link-layer address.
pub const ND_OPTION_TARGET_LINK_ADDR: u8 = 2;

/// A 48-bit Ethernet MAC address.
#[repr(transparent)]
#[derive(
    Copy, Clone, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// True if this is the `33:33:xx:xx:xx:xx` IPv6 multicast range.
    pub fn is_ipv6_multicast(&self) -> bool {
        self.0[..2] == [0x33, 0x33]
    }

    /// The Ethernet multicast address for an IPv6 multicast group:
    /// `33:33` followed by the low 32 bits of the group address.
    pub fn for_ipv6_multicast(group: &Ipv6Addr) -> Self {
        let o = group.octets();
        Self([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error parsing a textual MAC address.
#[derive(Debug, Error)]
#[error("invalid MAC address")]
pub struct InvalidMacAddr;

impl FromStr for MacAddr {
    type Err = InvalidMacAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or(InvalidMacAddr)?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| InvalidMacAddr)?;
        }
        if parts.next().is_some() {
            return Err(InvalidMacAddr);
        }
        Ok(Self(octets))
    }
}

/// Ethernet II frame header.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct EthernetHeader {
    /// Destination MAC.
    pub dst: MacAddr,
    /// Source MAC.
    pub src: MacAddr,
    /// Ethertype of the payload.
    pub ethertype: U16<BigEndian>,
}

const_assert_eq!(size_of::<EthernetHeader>(), 14);

/// IPv6 fixed header (RFC 8200).
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct Ipv6Header {
    /// Version (4 bits), traffic class (8 bits), flow label (20 bits).
    pub ver_tc_flow: U32<BigEndian>,
    /// Length of everything after this header.
    pub payload_len: U16<BigEndian>,
    /// Protocol of the next header.
    pub next_header: u8,
    /// Remaining forwarding hops.
    pub hop_limit: u8,
    /// Source address.
    pub src: [u8; 16],
    /// Destination address.
    pub dst: [u8; 16],
}

const_assert_eq!(size_of::<Ipv6Header>(), 40);

impl Ipv6Header {
    /// Builds a header the way this router sources packets: traffic class
    /// and flow label zero, hop limit 255.
    pub fn new(src: &Ipv6Addr, dst: &Ipv6Addr, payload_len: u16, next_header: u8) -> Self {
        Self {
            ver_tc_flow: U32::new(0x6000_0000),
            payload_len: U16::new(payload_len),
            next_header,
            hop_limit: 0xff,
            src: src.octets(),
            dst: dst.octets(),
        }
    }

    /// The version nibble, taken from the high bits of the first byte.
    pub fn version(&self) -> u8 {
        (self.ver_tc_flow.get() >> 28) as u8
    }

    /// Source address.
    pub fn src_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src)
    }

    /// Destination address.
    pub fn dst_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst)
    }
}

/// Common 4-byte ICMPv6 header.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct Icmpv6Header {
    /// Message type.
    pub msg_type: u8,
    /// Message code.
    pub code: u8,
    /// Checksum over the pseudo-header and the full message.
    pub checksum: U16<BigEndian>,
}

const_assert_eq!(size_of::<Icmpv6Header>(), 4);

/// Neighbor Solicitation / Neighbor Advertisement message.
///
/// The two types share one layout: common header, a flags word (used only by
/// advertisements), the target address, and a single link-layer address
/// option (source link-layer for NS, target link-layer for NA).
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NeighborMessage {
    /// Common header.
    pub hdr: Icmpv6Header,
    /// NA flags (router/solicited/override); reserved and zero for NS.
    pub flags: U32<BigEndian>,
    /// The address being resolved or advertised.
    pub target: [u8; 16],
    /// ND option type.
    pub option_type: u8,
    /// ND option length in units of 8 octets; always 1 here.
    pub option_len: u8,
    /// The link-layer address carried by the option.
    pub option_mac: MacAddr,
}

const_assert_eq!(size_of::<NeighborMessage>(), 32);

impl NeighborMessage {
    /// Target address.
    pub fn target_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.target)
    }
}

/// ICMPv6 Echo Request / Echo Reply header; the data bytes follow.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct EchoMessage {
    /// Common header.
    pub hdr: Icmpv6Header,
    /// Echo identifier, echoed verbatim in the reply.
    pub ident: U16<BigEndian>,
    /// Echo sequence number, echoed verbatim in the reply.
    pub seq: U16<BigEndian>,
}

const_assert_eq!(size_of::<EchoMessage>(), 8);

/// ICMPv6 Time Exceeded header; the invoking packet follows.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct TimeExceededMessage {
    /// Common header.
    pub hdr: Icmpv6Header,
    /// Unused; must be zero.
    pub unused: U32<BigEndian>,
}

const_assert_eq!(size_of::<TimeExceededMessage>(), 8);

/// The virtual header prefixed to ICMPv6 messages for checksum purposes
/// (RFC 8200 section 8.1).
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct PseudoHeader {
    /// Source address of the enclosing packet.
    pub src: [u8; 16],
    /// Destination address of the enclosing packet.
    pub dst: [u8; 16],
    /// Upper-layer packet length.
    pub upper_len: U32<BigEndian>,
    /// Must be zero.
    pub zero: [u8; 3],
    /// Next-header value of the upper-layer protocol.
    pub next_header: u8,
}

const_assert_eq!(size_of::<PseudoHeader>(), 40);

/// Computes the ICMPv6 checksum for `message` carried between `src` and
/// `dst`, with the message's own checksum field already zeroed.
pub fn icmpv6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, message: &[u8]) -> u16 {
    let pseudo = PseudoHeader {
        src: src.octets(),
        dst: dst.octets(),
        upper_len: U32::new(message.len() as u32),
        zero: [0; 3],
        next_header: IPPROTO_ICMPV6,
    };
    let mut sum = Checksum::new();
    sum.add_bytes(pseudo.as_bytes());
    sum.add_bytes(message);
    sum.checksum()
}
