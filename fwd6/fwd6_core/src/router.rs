// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Router state and the configuration contract.
//!
//! All process-wide state lives in a [`Router`] value: the device table, the
//! forwarding table, and the neighbor cache. The I/O layer registers devices
//! at startup, the configuration driver installs addresses, routes, and
//! static neighbors, and the readiness loop feeds frames to
//! [`Router::receive`].

use crate::addr;
use crate::fib::PatriciaTrie;
use crate::neighbor::NeighborTable;
use crate::wire::MacAddr;
use std::fmt::Write;
use std::net::Ipv6Addr;

/// Handle to a registered device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub(crate) usize);

/// Transmit sink for one device.
///
/// The sink must not block; an implementation that cannot take the whole
/// frame at once should drop it.
pub trait LinkSender {
    /// Queues one Ethernet frame for transmission.
    fn transmit(&mut self, frame: &[u8]);
}

/// An IPv6 address assignment on a device.
#[derive(Copy, Clone, Debug)]
pub struct Ipv6Binding {
    /// The interface address.
    pub address: Ipv6Addr,
    /// On-link prefix length, 0..=128.
    pub prefix_len: u8,
}

/// One entry in the forwarding table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RouteEntry {
    /// The destination network is directly attached to this device;
    /// destinations resolve via Neighbor Discovery.
    Connected(DeviceId),
    /// The destination is reached by forwarding to a next-hop router.
    Network(Ipv6Addr),
}

pub(crate) struct Device {
    pub name: String,
    pub mac: MacAddr,
    pub ipv6: Option<Ipv6Binding>,
    pub tx: Box<dyn LinkSender>,
}

/// A userspace IPv6 router: devices, forwarding table, neighbor cache.
pub struct Router {
    pub(crate) devices: Vec<Device>,
    pub(crate) fib: PatriciaTrie<RouteEntry>,
    pub(crate) neighbors: NeighborTable,
}

impl Router {
    /// Returns a router with no devices, no routes, and no neighbors.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            fib: PatriciaTrie::new(),
            neighbors: NeighborTable::new(),
        }
    }

    /// Registers a device and its transmit sink, returning its handle.
    pub fn add_device(
        &mut self,
        name: impl Into<String>,
        mac: MacAddr,
        tx: Box<dyn LinkSender>,
    ) -> DeviceId {
        let name = name.into();
        tracing::info!(dev = %name, %mac, "registered device");
        self.devices.push(Device {
            name,
            mac,
            ipv6: None,
            tx,
        });
        DeviceId(self.devices.len() - 1)
    }

    /// Finds a device by interface name.
    pub fn device_by_name(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|dev| dev.name == name)
            .map(DeviceId)
    }

    /// The interface name of `dev`.
    pub fn device_name(&self, dev: DeviceId) -> &str {
        &self.devices[dev.0].name
    }

    /// The MAC address of `dev`.
    pub fn device_mac(&self, dev: DeviceId) -> MacAddr {
        self.devices[dev.0].mac
    }

    /// The IPv6 binding of `dev`, if one has been configured.
    pub fn device_binding(&self, dev: DeviceId) -> Option<Ipv6Binding> {
        self.devices[dev.0].ipv6
    }

    /// Assigns an IPv6 address to `dev` and installs the connected route
    /// for its on-link prefix.
    pub fn configure_address(&mut self, dev: DeviceId, address: Ipv6Addr, prefix_len: u8) {
        self.devices[dev.0].ipv6 = Some(Ipv6Binding {
            address,
            prefix_len,
        });
        tracing::info!(dev = %self.devices[dev.0].name, %address, "configured ipv6 address");

        self.fib
            .insert(&address, prefix_len, RouteEntry::Connected(dev));
        tracing::info!(
            dev = %self.devices[dev.0].name,
            prefix = %addr::mask_prefix(&address, prefix_len.into()),
            prefix_len,
            "configured directly connected route"
        );
    }

    /// Installs a route to `prefix`/`prefix_len` via the router at
    /// `next_hop`.
    pub fn configure_net_route(&mut self, prefix: Ipv6Addr, prefix_len: u8, next_hop: Ipv6Addr) {
        self.fib
            .insert(&prefix, prefix_len, RouteEntry::Network(next_hop));
        tracing::info!(%prefix, prefix_len, %next_hop, "configured network route");
    }

    /// Installs a static neighbor entry on `dev`.
    pub fn add_neighbor(&mut self, dev: DeviceId, mac: MacAddr, address: Ipv6Addr) {
        self.neighbors.update(dev, mac, address);
        tracing::info!(dev = %self.devices[dev.0].name, %address, %mac, "added neighbor");
    }

    /// Handles one received Ethernet frame.
    ///
    /// Any outbound traffic the frame provokes (a forwarded copy, an ICMPv6
    /// reply, a solicitation) is delivered to the relevant transmit sinks
    /// before this returns. Undeliverable frames are dropped and logged.
    pub fn receive(&mut self, dev: DeviceId, frame: &[u8]) {
        if let Err(reason) = self.handle_frame(dev, frame) {
            tracing::debug!(
                dev = %self.devices[dev.0].name,
                reason = &reason as &dyn std::error::Error,
                "dropped frame"
            );
        }
    }

    /// Renders the neighbor cache as a fixed-column table.
    pub fn dump_neighbors(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "|--------------IPv6 ADDRESS---------------|----MAC ADDRESS----|----DEVICE-----|-BUCKET-|"
        );
        for (bucket, entry) in self.neighbors.iter() {
            let _ = writeln!(
                out,
                "| {:>39} | {:>17} | {:>13} |  {:04}  |",
                entry.addr,
                entry.mac,
                self.devices[entry.dev.0].name,
                bucket,
            );
        }
        let _ = writeln!(
            out,
            "|-----------------------------------------|-------------------|---------------|--------|"
        );
        out
    }

    /// Renders the forwarding table, one route per line.
    pub fn dump_routes(&self) -> String {
        let mut out = String::new();
        for (prefix, prefix_len, route) in self.fib.iter() {
            match route {
                RouteEntry::Connected(dev) => {
                    let _ = writeln!(
                        out,
                        "{}/{} dev {}",
                        prefix, prefix_len, self.devices[dev.0].name
                    );
                }
                RouteEntry::Network(next_hop) => {
                    let _ = writeln!(out, "{}/{} next hop {}", prefix, prefix_len, next_hop);
                }
            }
        }
        out
    }

    /// Looks up which device, if any, owns `addr` as its unicast address.
    pub(crate) fn device_owning(&self, addr: &Ipv6Addr) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|dev| dev.ipv6.is_some_and(|binding| binding.address == *addr))
            .map(DeviceId)
    }

    pub(crate) fn transmit(&mut self, dev: DeviceId, frame: &[u8]) {
        self.devices[dev.0].tx.transmit(frame);
    }

    pub(crate) fn route_for(&self, addr: &Ipv6Addr) -> Option<RouteEntry> {
        self.fib.lookup(addr).copied()
    }
}
