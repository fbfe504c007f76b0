// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Neighbor Discovery cache.
//!
//! Maps on-link IPv6 addresses to the MAC address and device they were
//! learned on. The table is a fixed bucket array with per-bucket collision
//! chains; entries are never aged out, matching the router's static view of
//! its links.

use crate::router::DeviceId;
use crate::wire::MacAddr;
use std::net::Ipv6Addr;

/// Number of hash buckets. A small prime keeps the word-sum hash spread.
const BUCKET_COUNT: usize = 1111;

/// One resolved neighbor.
pub struct NeighborEntry {
    /// The neighbor's IPv6 address.
    pub addr: Ipv6Addr,
    /// The neighbor's link-layer address.
    pub mac: MacAddr,
    /// The device this neighbor is reachable through.
    pub dev: DeviceId,
    next: Option<Box<NeighborEntry>>,
}

/// Hash-chained neighbor cache.
pub struct NeighborTable {
    buckets: Vec<Option<Box<NeighborEntry>>>,
}

/// Buckets an address by the wrapping sum of its four 32-bit words.
fn bucket(addr: &Ipv6Addr) -> usize {
    let octets = addr.octets();
    let sum = octets
        .chunks_exact(4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0u32, u32::wrapping_add);
    sum as usize % BUCKET_COUNT
}

impl NeighborTable {
    /// Returns an empty table.
    pub fn new() -> Self {
        let mut buckets = Vec::new();
        buckets.resize_with(BUCKET_COUNT, || None);
        Self { buckets }
    }

    /// Inserts or refreshes the entry for `addr`.
    ///
    /// The chain is scanned from its head; an existing entry for the same
    /// address is overwritten in place, otherwise a new entry is appended at
    /// the tail. There is at most one entry per address.
    pub fn update(&mut self, dev: DeviceId, mac: MacAddr, addr: Ipv6Addr) {
        let mut slot = &mut self.buckets[bucket(&addr)];
        loop {
            match slot {
                Some(entry) if entry.addr == addr => {
                    entry.mac = mac;
                    entry.dev = dev;
                    return;
                }
                Some(entry) => slot = &mut entry.next,
                None => {
                    *slot = Some(Box::new(NeighborEntry {
                        addr,
                        mac,
                        dev,
                        next: None,
                    }));
                    return;
                }
            }
        }
    }

    /// Looks up the entry for `addr`. Addresses compare on all 128 bits.
    pub fn lookup(&self, addr: &Ipv6Addr) -> Option<&NeighborEntry> {
        let mut cursor = self.buckets[bucket(addr)].as_deref();
        while let Some(entry) = cursor {
            if entry.addr == *addr {
                return Some(entry);
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    /// Visits every entry with its bucket index, in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &NeighborEntry)> + '_ {
        self.buckets.iter().enumerate().flat_map(|(index, head)| {
            std::iter::successors(head.as_deref(), |entry| entry.next.as_deref())
                .map(move |entry| (index, entry))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    const MAC_A: MacAddr = MacAddr([0x96, 0xe0, 0x07, 0xc6, 0x7f, 0xe1]);
    const MAC_B: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

    #[test]
    fn lookup_returns_what_update_stored() {
        let mut table = NeighborTable::new();
        let addr = ip("2001:db8:0:1001::2");
        table.update(DeviceId(0), MAC_A, addr);

        let entry = table.lookup(&addr).unwrap();
        assert_eq!(entry.mac, MAC_A);
        assert_eq!(entry.dev, DeviceId(0));
        assert!(table.lookup(&ip("2001:db8:0:1001::3")).is_none());
    }

    #[test]
    fn update_is_last_writer_wins() {
        let mut table = NeighborTable::new();
        let addr = ip("2001:db8::9");
        table.update(DeviceId(0), MAC_A, addr);
        table.update(DeviceId(1), MAC_B, addr);

        let entry = table.lookup(&addr).unwrap();
        assert_eq!(entry.mac, MAC_B);
        assert_eq!(entry.dev, DeviceId(1));
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn colliding_addresses_chain_in_one_bucket() {
        // The bucket hash is a word sum, so swapping two words collides.
        let first = ip("2001:db8::aaaa:1");
        let second = ip("aaaa:1::2001:db8");
        assert_eq!(bucket(&first), bucket(&second));

        let mut table = NeighborTable::new();
        table.update(DeviceId(0), MAC_A, first);
        table.update(DeviceId(1), MAC_B, second);

        assert_eq!(table.lookup(&first).unwrap().mac, MAC_A);
        assert_eq!(table.lookup(&second).unwrap().mac, MAC_B);

        // Refreshing the chained entry must not touch the head.
        table.update(DeviceId(0), MAC_A, second);
        assert_eq!(table.lookup(&first).unwrap().mac, MAC_A);
        assert_eq!(table.lookup(&second).unwrap().mac, MAC_A);
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn addresses_compare_on_all_128_bits() {
        // These differ only in their last word, which a truncated
        // comparison would miss.
        let first = ip("2001:db8::1");
        let second = ip("2001:db8::2");

        let mut table = NeighborTable::new();
        table.update(DeviceId(0), MAC_A, first);
        assert!(table.lookup(&second).is_none());
    }

    #[test]
    fn iter_reports_bucket_indices() {
        let mut table = NeighborTable::new();
        let addr = ip("::1");
        table.update(DeviceId(0), MAC_A, addr);

        let entries: Vec<_> = table.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, bucket(&addr));
        assert_eq!(entries[0].1.addr, addr);
    }
}
