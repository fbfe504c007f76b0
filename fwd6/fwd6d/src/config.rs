// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Startup manifest.
//!
//! A JSON document listing interface address assignments, static network
//! routes, and static neighbor entries, applied once before the readiness
//! loop starts. A manifest that names an unknown interface is fatal: a
//! half-configured router is worse than none.
//!
//! ```json
//! {
//!     "interfaces": [
//!         { "device": "router1-host1", "address": "2001:db8:0:1001::1", "prefix_len": 64 }
//!     ],
//!     "routes": [
//!         { "prefix": "2001:db8:0:1002::", "prefix_len": 64, "next_hop": "2001:db8:0:1000::2" }
//!     ],
//!     "neighbors": [
//!         { "device": "router1-host1", "address": "2001:db8:0:1001::2", "mac": "96:e0:07:c6:7f:e1" }
//!     ]
//! }
//! ```

use anyhow::Context;
use anyhow::bail;
use fwd6_core::Router;
use fwd6_core::wire::MacAddr;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::path::Path;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    interfaces: Vec<Interface>,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    neighbors: Vec<Neighbor>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Interface {
    device: String,
    address: Ipv6Addr,
    prefix_len: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Route {
    prefix: Ipv6Addr,
    prefix_len: u8,
    next_hop: Ipv6Addr,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Neighbor {
    device: String,
    address: Ipv6Addr,
    mac: String,
}

/// Reads and parses the manifest at `path`.
pub fn load(path: &Path) -> anyhow::Result<Manifest> {
    let contents = fs_err::read_to_string(path)?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse manifest {}", path.display()))
}

/// Applies `manifest` to `router`.
pub fn apply(router: &mut Router, manifest: &Manifest) -> anyhow::Result<()> {
    for interface in &manifest.interfaces {
        let Some(dev) = router.device_by_name(&interface.device) else {
            bail!("interface {} not found", interface.device);
        };
        if interface.prefix_len > 128 {
            bail!("prefix length {} out of range", interface.prefix_len);
        }
        router.configure_address(dev, interface.address, interface.prefix_len);
    }
    for route in &manifest.routes {
        if route.prefix_len > 128 {
            bail!("prefix length {} out of range", route.prefix_len);
        }
        router.configure_net_route(route.prefix, route.prefix_len, route.next_hop);
    }
    for neighbor in &manifest.neighbors {
        let Some(dev) = router.device_by_name(&neighbor.device) else {
            bail!("interface {} not found", neighbor.device);
        };
        let mac: MacAddr = neighbor
            .mac
            .parse()
            .with_context(|| format!("invalid MAC address {}", neighbor.mac))?;
        router.add_neighbor(dev, mac, neighbor.address);
    }
    Ok(())
}
