//! Block-header reconstruction from signature fields.

use serde::Serialize;
use sha2::{Digest, Sha256};

pub const HEADER_LEN: usize = 80;

/// Difficulty-1 target, big-endian.
pub const DIFF1_TARGET: [u8; 32] = {
    let mut t = [0u8; 32];
    t[4] = 0xff;
    t[5] = 0xff;
    t
};

/// How a hex field's bytes are laid into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    AsGiven,
    Reversed,
    WordSwapped,
}

impl ByteOrder {
    pub const ALL: [ByteOrder; 3] = [ByteOrder::AsGiven, ByteOrder::Reversed, ByteOrder::WordSwapped];

    pub fn apply(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            ByteOrder::AsGiven => bytes.to_vec(),
            ByteOrder::Reversed => bytes.iter().rev().copied().collect(),
            ByteOrder::WordSwapped => swap_words(bytes),
        }
    }
}

/// Reverses bytes inside each 4-byte group; a trailing partial group is dropped.
pub fn swap_words(bytes: &[u8]) -> Vec<u8> {
    bytes.chunks_exact(4).flat_map(|w| w.iter().rev().copied()).collect()
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// `32 zero bytes || 4 zero bytes || extranonce2 || 32 zero bytes`.
pub fn placeholder_coinbase(extranonce2: &[u8]) -> Vec<u8> {
    let mut cb = vec![0u8; 36];
    cb.extend_from_slice(extranonce2);
    cb.extend_from_slice(&[0u8; 32]);
    cb
}

/// With an empty branch the merkle root is the coinbase's double hash.
pub fn merkle_root(extranonce2: &[u8]) -> [u8; 32] {
    sha256d(&placeholder_coinbase(extranonce2))
}

/// Header fields already laid out in their chosen byte order.
#[derive(Debug, Clone, Copy)]
pub struct HeaderFields<'a> {
    pub version: &'a [u8],
    pub prevhash: &'a [u8],
    pub merkle_root: &'a [u8],
    pub ntime: &'a [u8],
    pub nbits: &'a [u8],
    pub nonce: &'a [u8],
}

impl HeaderFields<'_> {
    pub fn serialize(&self) -> Vec<u8> {
        let mut h = Vec::with_capacity(HEADER_LEN);
        h.extend_from_slice(self.version);
        h.extend_from_slice(self.prevhash);
        h.extend_from_slice(self.merkle_root);
        h.extend_from_slice(self.ntime);
        h.extend_from_slice(self.nbits);
        h.extend_from_slice(self.nonce);
        h
    }
}

/// Double hash of the header, byte-reversed into display order.
pub fn pow_hash(header: &[u8]) -> [u8; 32] {
    let mut h = sha256d(header);
    h.reverse();
    h
}

/// Big-endian comparison of two 256-bit values.
pub fn below_target(hash_be: &[u8; 32], target_be: &[u8; 32]) -> bool {
    hash_be < target_be
}

/// Expands a compact `nbits` value into a big-endian target.
pub fn target_from_nbits(nbits: u32) -> [u8; 32] {
    let exponent = (nbits >> 24) as usize;
    let mantissa = nbits & 0x007f_ffff;
    let mut target = [0u8; 32];
    let mbytes = mantissa.to_be_bytes();
    // Mantissa occupies bytes [32 - exponent, 32 - exponent + 3).
    for (i, &b) in mbytes[1..].iter().enumerate() {
        let pos = 32 + i;
        if pos >= exponent && pos - exponent < 32 {
            target[pos - exponent] = b;
        }
    }
    target
}
