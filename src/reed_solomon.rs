//! Systematic Reed-Solomon encoding and syndrome checks over GF(256).
//!
//! Only detection is provided: a block with non-zero syndromes is reported
//! as damaged, never repaired. A codeword is at most [`BLOCK_LEN`] symbols;
//! longer messages are split into consecutive codewords of
//! `BLOCK_LEN - nsym` data bytes each.

use crate::gf256;

/// Longest codeword GF(256) supports.
pub const BLOCK_LEN: usize = 255;

/// Generator polynomial with roots `alpha^0 .. alpha^(nsym-1)`.
pub fn generator_poly(nsym: usize) -> Vec<u8> {
    let mut g = vec![1u8];
    for i in 0..nsym {
        g = gf256::poly_mul(&g, &[1, gf256::pow_alpha(i)]);
    }
    g
}

/// Returns `data || parity` where parity is the remainder of
/// `data(x) * x^nsym` divided by the generator.
pub fn encode(data: &[u8], nsym: usize) -> Vec<u8> {
    let generator = generator_poly(nsym);
    let mut buf = vec![0u8; data.len() + nsym];
    buf[..data.len()].copy_from_slice(data);
    for i in 0..data.len() {
        let coef = buf[i];
        if coef != 0 {
            for (j, &g) in generator.iter().enumerate().skip(1) {
                buf[i + j] ^= gf256::mul(g, coef);
            }
        }
    }
    let mut out = data.to_vec();
    out.extend_from_slice(&buf[data.len()..]);
    out
}

pub fn syndromes(block: &[u8], nsym: usize) -> Vec<u8> {
    (0..nsym).map(|i| gf256::poly_eval(block, gf256::pow_alpha(i))).collect()
}

/// Strips parity from an intact block; `None` if any syndrome is non-zero
/// or the block is shorter than its parity.
pub fn check(block: &[u8], nsym: usize) -> Option<&[u8]> {
    if block.len() < nsym {
        return None;
    }
    if syndromes(block, nsym).iter().any(|&s| s != 0) {
        return None;
    }
    Some(&block[..block.len() - nsym])
}

/// Encodes `data` as back-to-back codewords, each at most [`BLOCK_LEN`] long.
pub fn encode_blocks(data: &[u8], nsym: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(data.len(), nsym));
    for chunk in data.chunks(BLOCK_LEN - nsym) {
        out.extend_from_slice(&encode(chunk, nsym));
    }
    out
}

/// Encoded size of a `data_len`-byte message under [`encode_blocks`].
pub fn encoded_len(data_len: usize, nsym: usize) -> usize {
    data_len + data_len.div_ceil(BLOCK_LEN - nsym) * nsym
}

/// Checks every codeword of an [`encode_blocks`] stream and returns the
/// joined data; `None` if any codeword is damaged.
pub fn check_blocks(stream: &[u8], nsym: usize) -> Option<Vec<u8>> {
    let mut data = Vec::with_capacity(stream.len());
    for block in stream.chunks(BLOCK_LEN) {
        if block.len() <= nsym {
            return None;
        }
        data.extend_from_slice(check(block, nsym)?);
    }
    Some(data)
}
