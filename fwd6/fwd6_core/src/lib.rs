// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Userspace IPv6 forwarding plane.
//!
//! This crate implements the protocol core of a small IPv6 router: an
//! Ethernet codec, IPv6 header validation and destination classification, a
//! Patricia-trie forwarding table, a Neighbor Discovery cache, and the
//! ICMPv6 subset needed to participate in a subnet (Neighbor
//! Solicitation/Advertisement and Echo).
//!
//! The crate owns no sockets. The I/O layer registers each interface as a
//! [`Router`] device with a [`LinkSender`] transmit sink and feeds received
//! frames to [`Router::receive`]; everything from frame parsing to the
//! transmit-sink call happens synchronously inside that call.

#![forbid(unsafe_code)]

pub mod addr;
mod eth;
pub mod fib;
mod icmpv6;
mod ipv6;
pub mod neighbor;
pub mod packet;
mod router;
pub mod wire;

pub use eth::MAX_FRAME_LEN;
pub use router::DeviceId;
pub use router::Ipv6Binding;
pub use router::LinkSender;
pub use router::RouteEntry;
pub use router::Router;

use std::net::Ipv6Addr;
use thiserror::Error;

/// Why an ingress frame or egress packet was discarded.
///
/// Every failure on the data path is recoverable: the packet is dropped, the
/// reason is logged, and the router keeps running. Fatal conditions exist
/// only on the control plane and are the caller's to handle.
#[derive(Debug, Error)]
pub enum DropReason {
    /// The destination MAC is neither ours, broadcast, nor IPv6 multicast.
    #[error("destination MAC is not for this device")]
    NotOurMac,
    /// The frame is too short for an Ethernet header.
    #[error("frame too short for an ethernet header")]
    FrameTooShort,
    /// The ethertype carries a protocol we do not speak.
    #[error("unhandled ethertype {0:#06x}")]
    UnhandledEtherType(u16),
    /// An IPv6 frame arrived on a device with no IPv6 binding.
    #[error("ingress device has no IPv6 binding")]
    NoIpv6Binding,
    /// The buffer is too short for an IPv6 fixed header.
    #[error("packet too short for an IPv6 header")]
    PacketTooShort,
    /// The version nibble is not 6.
    #[error("bad IP version {0}")]
    BadVersion(u8),
    /// A multicast destination other than our solicited-node group.
    #[error("multicast group {0} is not joined")]
    MulticastNotOurs(Ipv6Addr),
    /// Longest-prefix lookup found no covering route.
    #[error("no route to {0}")]
    NoRoute(Ipv6Addr),
    /// The hop limit expired in transit.
    #[error("hop limit exceeded in transit")]
    HopLimitExceeded,
    /// A next header other than ICMPv6 addressed to us.
    #[error("unhandled next header {0:#04x}")]
    UnhandledNextHeader(u8),
    /// The ICMPv6 message is shorter than its type requires.
    #[error("ICMPv6 message too short")]
    Icmpv6TooShort,
    /// An ICMPv6 type outside the supported subset.
    #[error("unhandled ICMPv6 type {0}")]
    UnhandledIcmpv6Type(u8),
    /// A Neighbor Solicitation for an address we do not own.
    #[error("neighbor solicitation target {0} is not ours")]
    NsTargetNotOurs(Ipv6Addr),
    /// An Echo Request with more payload than we are willing to reflect.
    #[error("echo payload too large ({0} bytes)")]
    EchoPayloadTooLarge(usize),
    /// No neighbor entry for the destination; a solicitation was sent
    /// instead of the packet.
    #[error("no neighbor entry for {0}, solicitation sent")]
    NeighborUnresolved(Ipv6Addr),
    /// The next hop is neither resolved nor on a connected network.
    #[error("next hop {0} unreachable")]
    NextHopUnreachable(Ipv6Addr),
    /// The serialized frame would exceed the line buffer.
    #[error("frame of {0} bytes exceeds the line buffer")]
    FrameTooLong(usize),
}
