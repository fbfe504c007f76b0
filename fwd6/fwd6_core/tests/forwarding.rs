// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end scenarios driven through [`Router::receive`], observing the
//! frames that reach each device's transmit sink.
//!
//! Router output is cross-checked against an independent wire
//! implementation: frames are re-parsed with `smoltcp` and ICMPv6 checksums
//! are re-verified from the pseudo-header up.

use fwd6_core::DeviceId;
use fwd6_core::LinkSender;
use fwd6_core::Router;
use fwd6_core::wire::ETHERTYPE_IPV6;
use fwd6_core::wire::EthernetHeader;
use fwd6_core::wire::IPPROTO_ICMPV6;
use fwd6_core::wire::Ipv6Header;
use fwd6_core::wire::MacAddr;
use inet_checksum::Checksum;
use smoltcp::wire::EthernetAddress;
use smoltcp::wire::EthernetFrame;
use smoltcp::wire::EthernetProtocol;
use smoltcp::wire::Icmpv6Message;
use smoltcp::wire::Icmpv6Packet;
use smoltcp::wire::IpProtocol;
use smoltcp::wire::Ipv6Packet;
use smoltcp::wire::NdiscNeighborFlags;
use smoltcp::wire::NdiscRepr;
use smoltcp::wire::RawHardwareAddress;
use std::cell::RefCell;
use std::net::Ipv6Addr;
use std::rc::Rc;
use zerocopy::IntoBytes;
use zerocopy::byteorder::U16;
use zerocopy::byteorder::U32;

const D1_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const D2_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
const HOST1_MAC: MacAddr = MacAddr([0x96, 0xe0, 0x07, 0xc6, 0x7f, 0xe1]);
const ROUTER2_MAC: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

/// Records every frame a device transmits.
#[derive(Clone, Default)]
struct Tap(Rc<RefCell<Vec<Vec<u8>>>>);

impl Tap {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.0.borrow().clone()
    }

    fn sole_frame(&self) -> Vec<u8> {
        let frames = self.0.borrow();
        assert_eq!(frames.len(), 1, "expected exactly one egress frame");
        frames[0].clone()
    }
}

impl LinkSender for Tap {
    fn transmit(&mut self, frame: &[u8]) {
        self.0.borrow_mut().push(frame.to_vec());
    }
}

/// The two-armed topology from the configuration driver: a host-facing
/// device and a router-facing device.
struct TestNet {
    router: Router,
    d1: DeviceId,
    d2: DeviceId,
    d1_tap: Tap,
    d2_tap: Tap,
}

fn ip(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

impl TestNet {
    fn new() -> Self {
        let mut router = Router::new();
        let d1_tap = Tap::default();
        let d2_tap = Tap::default();
        let d1 = router.add_device("router1-host1", D1_MAC, Box::new(d1_tap.clone()));
        let d2 = router.add_device("router1-router2", D2_MAC, Box::new(d2_tap.clone()));
        router.configure_address(d1, ip("2001:db8:0:1001::1"), 64);
        router.configure_address(d2, ip("2001:db8:0:1000::1"), 64);
        Self {
            router,
            d1,
            d2,
            d1_tap,
            d2_tap,
        }
    }
}

/// Builds an Ethernet frame carrying one IPv6 datagram.
fn ipv6_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: u8,
    hop_limit: u8,
    payload: &[u8],
) -> Vec<u8> {
    let eth = EthernetHeader {
        dst: dst_mac,
        src: src_mac,
        ethertype: U16::new(ETHERTYPE_IPV6),
    };
    let hdr = Ipv6Header {
        ver_tc_flow: U32::new(0x6000_0000),
        payload_len: U16::new(payload.len() as u16),
        next_header,
        hop_limit,
        src: src.octets(),
        dst: dst.octets(),
    };
    [eth.as_bytes(), hdr.as_bytes(), payload].concat()
}

/// Sums the ICMPv6 pseudo-header and message; a valid transmitted checksum
/// makes the one's-complement total fold to all ones.
fn icmpv6_checksum_is_valid(src: Ipv6Addr, dst: Ipv6Addr, message: &[u8]) -> bool {
    let mut sum = Checksum::new();
    sum.add_bytes(&src.octets());
    sum.add_bytes(&dst.octets());
    sum.add_bytes(&(message.len() as u32).to_be_bytes());
    sum.add_bytes(&[0, 0, 0, IPPROTO_ICMPV6]);
    sum.add_bytes(message);
    sum.fold() == 0xffff
}

/// Computes and stores a valid ICMPv6 checksum into `message`.
fn fill_icmpv6_checksum(src: Ipv6Addr, dst: Ipv6Addr, message: &mut [u8]) {
    message[2..4].copy_from_slice(&[0, 0]);
    let mut sum = Checksum::new();
    sum.add_bytes(&src.octets());
    sum.add_bytes(&dst.octets());
    sum.add_bytes(&(message.len() as u32).to_be_bytes());
    sum.add_bytes(&[0, 0, 0, IPPROTO_ICMPV6]);
    sum.add_bytes(message);
    let checksum = sum.checksum();
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
}

#[test]
fn connected_delivery() {
    let mut net = TestNet::new();
    net.router.add_neighbor(net.d1, HOST1_MAC, ip("2001:db8:0:1001::2"));

    let datagram_payload = [0xab; 24];
    let frame = ipv6_frame(
        D2_MAC,
        ROUTER2_MAC,
        ip("2001:db8::99"),
        ip("2001:db8:0:1001::2"),
        0x3b,
        64,
        &datagram_payload,
    );
    net.router.receive(net.d2, &frame);

    assert!(net.d2_tap.frames().is_empty());
    let out = net.d1_tap.sole_frame();
    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(HOST1_MAC.0));
    assert_eq!(eth.src_addr(), EthernetAddress(D1_MAC.0));
    assert_eq!(eth.ethertype(), EthernetProtocol::Ipv6);

    // The payload is the original datagram, aged by one hop.
    let mut expected = frame[14..].to_vec();
    expected[7] -= 1;
    assert_eq!(eth.payload(), &expected[..]);
}

#[test]
fn forward_via_next_hop() {
    let mut net = TestNet::new();
    net.router
        .configure_net_route(ip("2001:db8:0:1002::"), 64, ip("2001:db8:0:1000::2"));
    net.router.add_neighbor(net.d2, ROUTER2_MAC, ip("2001:db8:0:1000::2"));

    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2001:db8:0:1002::5"),
        0x3b,
        64,
        b"transit payload",
    );
    net.router.receive(net.d1, &frame);

    assert!(net.d1_tap.frames().is_empty());
    let out = net.d2_tap.sole_frame();
    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(ROUTER2_MAC.0));
    assert_eq!(eth.ethertype(), EthernetProtocol::Ipv6);

    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.dst_addr(), ip("2001:db8:0:1002::5"));
    assert_eq!(ipv6.hop_limit(), 63);
    assert_eq!(ipv6.payload(), b"transit payload");
}

#[test]
fn nd_miss_triggers_neighbor_solicitation() {
    let mut net = TestNet::new();
    net.router
        .configure_net_route(ip("2001:db8:0:1002::"), 64, ip("2001:db8:0:1000::2"));
    // No neighbor entry for the next hop.

    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2001:db8:0:1002::5"),
        0x3b,
        64,
        b"doomed",
    );
    net.router.receive(net.d1, &frame);

    // The packet itself went nowhere; the only egress is one solicitation
    // on the next hop's device.
    assert!(net.d1_tap.frames().is_empty());
    let out = net.d2_tap.sole_frame();

    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(
        eth.dst_addr(),
        EthernetAddress([0x33, 0x33, 0xff, 0x00, 0x00, 0x02])
    );
    assert_eq!(eth.src_addr(), EthernetAddress(D2_MAC.0));

    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.src_addr(), ip("2001:db8:0:1000::1"));
    assert_eq!(ipv6.dst_addr(), ip("ff02::1:ff00:2"));
    assert_eq!(ipv6.next_header(), IpProtocol::Icmpv6);
    assert_eq!(ipv6.hop_limit(), 255);

    let message = ipv6.payload().to_vec();
    assert!(icmpv6_checksum_is_valid(
        ipv6.src_addr(),
        ipv6.dst_addr(),
        &message
    ));
    let icmp = Icmpv6Packet::new_checked(&message[..]).unwrap();
    match NdiscRepr::parse(&icmp).unwrap() {
        NdiscRepr::NeighborSolicit {
            target_addr,
            lladdr,
        } => {
            assert_eq!(target_addr, ip("2001:db8:0:1000::2"));
            assert_eq!(lladdr, Some(RawHardwareAddress::from(EthernetAddress(D2_MAC.0))));
        }
        other => panic!("expected neighbor solicitation, got {other:?}"),
    }
}

#[test]
fn echo_request_round_trip() {
    let mut net = TestNet::new();
    net.router.add_neighbor(net.d1, HOST1_MAC, ip("2001:db8:0:1001::2"));

    let data: Vec<u8> = (0u8..32).collect();
    let src = ip("2001:db8:0:1001::2");
    let dst = ip("2001:db8:0:1001::1");
    let mut message = vec![128, 0, 0, 0, 0x12, 0x34, 0x00, 0x07];
    message.extend_from_slice(&data);
    fill_icmpv6_checksum(src, dst, &mut message);

    let frame = ipv6_frame(D1_MAC, HOST1_MAC, src, dst, IPPROTO_ICMPV6, 64, &message);
    net.router.receive(net.d1, &frame);

    let out = net.d1_tap.sole_frame();
    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(HOST1_MAC.0));

    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.src_addr(), dst);
    assert_eq!(ipv6.dst_addr(), src);

    let reply = ipv6.payload().to_vec();
    assert!(icmpv6_checksum_is_valid(dst, src, &reply));
    let icmp = Icmpv6Packet::new_checked(&reply[..]).unwrap();
    assert_eq!(icmp.msg_type(), Icmpv6Message::EchoReply);
    assert_eq!(&reply[4..6], &[0x12, 0x34]);
    assert_eq!(&reply[6..8], &[0x00, 0x07]);
    assert_eq!(&reply[8..], &data[..]);
}

#[test]
fn oversized_echo_request_is_dropped() {
    let mut net = TestNet::new();
    net.router.add_neighbor(net.d1, HOST1_MAC, ip("2001:db8:0:1001::2"));

    let mut message = vec![128, 0, 0, 0, 0, 1, 0, 1];
    message.extend_from_slice(&[0x5a; 300]);
    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2001:db8:0:1001::1"),
        IPPROTO_ICMPV6,
        64,
        &message,
    );
    net.router.receive(net.d1, &frame);

    assert!(net.d1_tap.frames().is_empty());
    assert!(net.d2_tap.frames().is_empty());
}

#[test]
fn neighbor_solicitation_earns_an_advertisement() {
    let mut net = TestNet::new();
    let host_ip = ip("2001:db8:0:1001::2");
    let our_ip = ip("2001:db8:0:1001::1");

    // Build the solicitation with smoltcp, the independent implementation.
    let ndisc = NdiscRepr::NeighborSolicit {
        target_addr: our_ip,
        lladdr: Some(RawHardwareAddress::from(EthernetAddress(HOST1_MAC.0))),
    };
    let group = ip("ff02::1:ff00:1");
    let mut message = vec![0; ndisc.buffer_len()];
    ndisc.emit(&mut Icmpv6Packet::new_unchecked(&mut message));
    fill_icmpv6_checksum(host_ip, group, &mut message);

    let frame = ipv6_frame(
        MacAddr([0x33, 0x33, 0xff, 0x00, 0x00, 0x01]),
        HOST1_MAC,
        host_ip,
        group,
        IPPROTO_ICMPV6,
        255,
        &message,
    );
    net.router.receive(net.d1, &frame);

    // The cache learned the asker.
    assert!(net.router.dump_neighbors().contains("2001:db8:0:1001::2"));
    assert!(net.router.dump_neighbors().contains("96:e0:07:c6:7f:e1"));

    let out = net.d1_tap.sole_frame();
    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(HOST1_MAC.0));

    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.src_addr(), our_ip);
    assert_eq!(ipv6.dst_addr(), host_ip);

    let reply = ipv6.payload().to_vec();
    assert!(icmpv6_checksum_is_valid(our_ip, host_ip, &reply));
    let icmp = Icmpv6Packet::new_checked(&reply[..]).unwrap();
    match NdiscRepr::parse(&icmp).unwrap() {
        NdiscRepr::NeighborAdvert {
            flags,
            target_addr,
            lladdr,
        } => {
            assert!(flags.contains(NdiscNeighborFlags::SOLICITED));
            assert!(flags.contains(NdiscNeighborFlags::OVERRIDE));
            assert!(!flags.contains(NdiscNeighborFlags::ROUTER));
            assert_eq!(target_addr, our_ip);
            assert_eq!(lladdr, Some(RawHardwareAddress::from(EthernetAddress(D1_MAC.0))));
        }
        other => panic!("expected neighbor advertisement, got {other:?}"),
    }
}

#[test]
fn solicitation_for_foreign_target_is_ignored() {
    let mut net = TestNet::new();
    let host_ip = ip("2001:db8:0:1001::2");

    let ndisc = NdiscRepr::NeighborSolicit {
        target_addr: ip("2001:db8:0:1001::77"),
        lladdr: Some(RawHardwareAddress::from(EthernetAddress(HOST1_MAC.0))),
    };
    let group = ip("ff02::1:ff00:77");
    let mut message = vec![0; ndisc.buffer_len()];
    ndisc.emit(&mut Icmpv6Packet::new_unchecked(&mut message));
    fill_icmpv6_checksum(host_ip, group, &mut message);

    // The solicited-node group of ::77 does not match our ::1 address, so
    // this is not even delivered locally.
    let frame = ipv6_frame(
        MacAddr([0x33, 0x33, 0xff, 0x00, 0x00, 0x77]),
        HOST1_MAC,
        host_ip,
        group,
        IPPROTO_ICMPV6,
        255,
        &message,
    );
    net.router.receive(net.d1, &frame);

    assert!(net.d1_tap.frames().is_empty());
    assert!(net.d2_tap.frames().is_empty());
}

#[test]
fn unroutable_packet_produces_no_egress() {
    let mut net = TestNet::new();
    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2002::1"),
        0x3b,
        64,
        b"nowhere to go",
    );
    net.router.receive(net.d1, &frame);

    assert!(net.d1_tap.frames().is_empty());
    assert!(net.d2_tap.frames().is_empty());
}

#[test]
fn foreign_destination_mac_is_filtered() {
    let mut net = TestNet::new();
    net.router.add_neighbor(net.d1, HOST1_MAC, ip("2001:db8:0:1001::2"));

    // A perfectly routable datagram, but the frame is not addressed to us.
    let frame = ipv6_frame(
        MacAddr([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]),
        ROUTER2_MAC,
        ip("2001:db8::99"),
        ip("2001:db8:0:1001::2"),
        0x3b,
        64,
        b"not for us",
    );
    net.router.receive(net.d2, &frame);

    assert!(net.d1_tap.frames().is_empty());
    assert!(net.d2_tap.frames().is_empty());
}

#[test]
fn expired_hop_limit_reports_time_exceeded() {
    let mut net = TestNet::new();
    net.router
        .configure_net_route(ip("2001:db8:0:1002::"), 64, ip("2001:db8:0:1000::2"));
    net.router.add_neighbor(net.d2, ROUTER2_MAC, ip("2001:db8:0:1000::2"));
    net.router.add_neighbor(net.d1, HOST1_MAC, ip("2001:db8:0:1001::2"));

    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2001:db8:0:1002::5"),
        0x3b,
        1,
        b"one hop too far",
    );
    net.router.receive(net.d1, &frame);

    // Nothing was forwarded; the source got a Time Exceeded instead.
    assert!(net.d2_tap.frames().is_empty());
    let out = net.d1_tap.sole_frame();
    let eth = EthernetFrame::new_checked(&out[..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(HOST1_MAC.0));

    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.dst_addr(), ip("2001:db8:0:1001::2"));
    assert_eq!(ipv6.src_addr(), ip("2001:db8:0:1001::1"));

    let message = ipv6.payload().to_vec();
    assert!(icmpv6_checksum_is_valid(
        ipv6.src_addr(),
        ipv6.dst_addr(),
        &message
    ));
    let icmp = Icmpv6Packet::new_checked(&message[..]).unwrap();
    assert_eq!(icmp.msg_type(), Icmpv6Message::TimeExceeded);
    // The quote starts with the invoking packet's unmodified header.
    assert_eq!(&message[8..8 + 40], &frame[14..14 + 40]);
}

#[test]
fn advertisement_populates_the_cache_for_later_traffic() {
    let mut net = TestNet::new();
    net.router
        .configure_net_route(ip("2001:db8:0:1002::"), 64, ip("2001:db8:0:1000::2"));

    // First attempt: unresolved, solicitation goes out.
    let frame = ipv6_frame(
        D1_MAC,
        HOST1_MAC,
        ip("2001:db8:0:1001::2"),
        ip("2001:db8:0:1002::5"),
        0x3b,
        64,
        b"first try",
    );
    net.router.receive(net.d1, &frame);
    assert_eq!(net.d2_tap.frames().len(), 1);

    // The next hop answers with an advertisement.
    let ndisc = NdiscRepr::NeighborAdvert {
        flags: NdiscNeighborFlags::SOLICITED | NdiscNeighborFlags::OVERRIDE,
        target_addr: ip("2001:db8:0:1000::2"),
        lladdr: Some(RawHardwareAddress::from(EthernetAddress(ROUTER2_MAC.0))),
    };
    let mut message = vec![0; ndisc.buffer_len()];
    ndisc.emit(&mut Icmpv6Packet::new_unchecked(&mut message));
    fill_icmpv6_checksum(
        ip("2001:db8:0:1000::2"),
        ip("2001:db8:0:1000::1"),
        &mut message,
    );
    let na_frame = ipv6_frame(
        D2_MAC,
        ROUTER2_MAC,
        ip("2001:db8:0:1000::2"),
        ip("2001:db8:0:1000::1"),
        IPPROTO_ICMPV6,
        255,
        &message,
    );
    net.router.receive(net.d2, &na_frame);

    // Second attempt: resolved, the packet forwards.
    net.router.receive(net.d1, &frame);
    let frames = net.d2_tap.frames();
    assert_eq!(frames.len(), 2);
    let eth = EthernetFrame::new_checked(&frames[1][..]).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress(ROUTER2_MAC.0));
    let ipv6 = Ipv6Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ipv6.dst_addr(), ip("2001:db8:0:1002::5"));
}
