// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! RFC 1071 Internet checksum.
//!
//! This crate implements the 16-bit one's-complement checksum used by the
//! Internet protocol family, exposed as an incremental accumulator so that a
//! pseudo-header partial sum can be carried into a payload sum without
//! serializing the two into one contiguous buffer.

#![no_std]
#![forbid(unsafe_code)]

/// Incremental one's-complement sum over a byte stream.
///
/// Bytes are treated as a sequence of big-endian 16-bit words. The stream may
/// be fed in arbitrary chunks; a chunk ending on an odd byte is carried over
/// and paired with the first byte of the next chunk. If the total stream
/// length is odd, the final word is the trailing byte padded with a zero in
/// its low half.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    sum: u32,
    pending: Option<u8>,
}

impl Checksum {
    /// Returns an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an accumulator seeded with a previously folded partial sum.
    pub fn with_seed(seed: u16) -> Self {
        Self {
            sum: seed.into(),
            pending: None,
        }
    }

    /// Folds `bytes` into the running sum.
    pub fn add_bytes(&mut self, mut bytes: &[u8]) {
        if let Some(hi) = self.pending.take() {
            match bytes.split_first() {
                Some((&lo, rest)) => {
                    self.sum += u32::from(u16::from_be_bytes([hi, lo]));
                    bytes = rest;
                }
                None => {
                    self.pending = Some(hi);
                    return;
                }
            }
        }
        let mut chunks = bytes.chunks_exact(2);
        for word in &mut chunks {
            self.sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        }
        if let &[last] = chunks.remainder() {
            self.pending = Some(last);
        }
    }

    /// Returns the folded 16-bit partial sum, without complementing.
    ///
    /// Suitable as a seed for [`Checksum::with_seed`] when chaining a
    /// pseudo-header sum into a payload sum.
    pub fn fold(&self) -> u16 {
        let mut sum = self.sum;
        if let Some(hi) = self.pending {
            sum += u32::from(u16::from_be_bytes([hi, 0]));
        }
        while sum > 0xffff {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        sum as u16
    }

    /// Returns the complemented checksum, ready to store in a header field.
    pub fn checksum(&self) -> u16 {
        !self.fold()
    }
}

/// One-shot seeded checksum over `bytes`.
///
/// Equivalent to seeding an accumulator with `seed`, folding in `bytes`, and
/// complementing the result.
pub fn checksum16(bytes: &[u8], seed: u16) -> u16 {
    let mut sum = Checksum::with_seed(seed);
    sum.add_bytes(bytes);
    sum.checksum()
}
