// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Outbound packet assembly.
//!
//! Egress packets are built innermost-first: each protocol layer prepends
//! its header as a new segment rather than shifting payload bytes. The chain
//! is flattened exactly once, into the line buffer handed to the device.

use std::collections::VecDeque;

/// An outbound datagram under construction: an ordered chain of contiguous
/// byte runs.
pub struct PacketChain {
    segments: VecDeque<Vec<u8>>,
}

impl PacketChain {
    /// Returns an empty chain.
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    /// Returns a chain holding `payload` as its only segment.
    pub fn with_payload(payload: Vec<u8>) -> Self {
        let mut chain = Self::new();
        chain.segments.push_back(payload);
        chain
    }

    /// Links `header` in front of everything already in the chain.
    pub fn push_header(&mut self, header: Vec<u8>) {
        self.segments.push_front(header);
    }

    /// Total length of the assembled packet in bytes.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Concatenates the chain into the front of `line`, returning the
    /// number of bytes written, or `None` if the packet does not fit.
    pub fn serialize_into(&self, line: &mut [u8]) -> Option<usize> {
        let mut offset: usize = 0;
        for segment in &self.segments {
            let end = offset.checked_add(segment.len())?;
            line.get_mut(offset..end)?.copy_from_slice(segment);
            offset = end;
        }
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_prepend_in_reverse_order() {
        let mut chain = PacketChain::with_payload(vec![4, 5, 6]);
        chain.push_header(vec![2, 3]);
        chain.push_header(vec![1]);
        assert_eq!(chain.len(), 6);

        let mut line = [0u8; 16];
        let len = chain.serialize_into(&mut line).unwrap();
        assert_eq!(&line[..len], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn oversized_chain_does_not_serialize() {
        let chain = PacketChain::with_payload(vec![0u8; 32]);
        let mut line = [0u8; 16];
        assert_eq!(chain.serialize_into(&mut line), None);

        let mut exact = [0u8; 32];
        assert_eq!(chain.serialize_into(&mut exact), Some(32));
    }

    #[test]
    fn empty_chain_serializes_to_nothing() {
        let chain = PacketChain::new();
        let mut line = [0u8; 4];
        assert_eq!(chain.serialize_into(&mut line), Some(0));
    }
}
