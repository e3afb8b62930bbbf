//! Redundant LSB watermark carrying a [`SignatureRecord`].
//!
//! Layout of one copy: `len: u32 BE || json || parity`, where `len` counts
//! the json and parity bytes. `REPEAT` copies are written back to back, one
//! bit per channel byte, most significant bit first. Decoding accepts the
//! first copy whose syndromes are all zero; damaged copies are discarded,
//! not repaired. The parity-extended block is a run of Reed-Solomon
//! codewords of at most 255 bytes each, so records longer than one
//! codeword keep full detection strength.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pixels::PixelImage;
use crate::reed_solomon;
use crate::types::SignatureRecord;

pub const NSYM: usize = 32;
pub const REPEAT: usize = 5;
pub const MAX_BLOCK_LEN: usize = 10_000;
const HEADER_BITS: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WatermarkError {
    #[error("payload needs {needed} bits, image holds {capacity}")]
    Capacity { needed: usize, capacity: usize },
    #[error("encoded record is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("invalid length header: {0}")]
    InvalidHeader(usize),
    #[error("no intact copy among {tried} candidates")]
    NoIntactCopy { tried: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub payload_bytes: usize,
    pub encoded_bytes: usize,
    pub embedded_bits: usize,
    pub capacity_bits: usize,
}

/// One copy: length prefix plus the parity-extended block.
pub fn encode_copy(record: &SignatureRecord) -> Vec<u8> {
    let encoded = reed_solomon::encode_blocks(&record.to_json_bytes(), NSYM);
    let mut copy = Vec::with_capacity(4 + encoded.len());
    copy.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
    copy.extend_from_slice(&encoded);
    copy
}

/// The full byte stream written into the image.
pub fn build_payload(record: &SignatureRecord) -> Vec<u8> {
    encode_copy(record).repeat(REPEAT)
}

pub fn required_bits(record: &SignatureRecord) -> usize {
    build_payload(record).len() * 8
}

/// Writes the watermark into `image`. The image is untouched on error.
pub fn embed(image: &mut PixelImage, record: &SignatureRecord) -> Result<EmbedReport, WatermarkError> {
    let encoded_len = reed_solomon::encoded_len(record.to_json_bytes().len(), NSYM);
    if encoded_len > MAX_BLOCK_LEN {
        return Err(WatermarkError::PayloadTooLarge { len: encoded_len, max: MAX_BLOCK_LEN });
    }
    let payload = build_payload(record);
    let needed = payload.len() * 8;
    let capacity = image.capacity_bits();
    if needed > capacity {
        return Err(WatermarkError::Capacity { needed, capacity });
    }

    let pixels = image.as_bytes_mut();
    for (i, byte) in payload.iter().enumerate() {
        for b in 0..8 {
            let bit = (byte >> (7 - b)) & 1;
            let idx = i * 8 + b;
            pixels[idx] = (pixels[idx] & 0xfe) | bit;
        }
    }

    let report = EmbedReport {
        payload_bytes: record.to_json_bytes().len(),
        encoded_bytes: payload.len() / REPEAT - 4,
        embedded_bits: needed,
        capacity_bits: capacity,
    };
    debug!(bits = needed, capacity, "watermark embedded");
    Ok(report)
}

/// Recovers the record from the first intact copy.
pub fn extract(image: &PixelImage) -> Result<SignatureRecord, WatermarkError> {
    let pixels = image.as_bytes();
    let header = read_u32(pixels, 0).ok_or(WatermarkError::InvalidHeader(0))? as usize;

    let mut tried = 0;
    if valid_len(header) {
        match scan_copies(pixels, header, &mut tried) {
            Some(record) => return Ok(record),
            None => warn!(len = header, tried, "no intact copy at leading header length"),
        }
    }

    // The leading header may itself be damaged; trust any length that a
    // later copy's own header confirms.
    for len in (NSYM + 1)..=MAX_BLOCK_LEN {
        if len == header {
            continue;
        }
        let copy_bits = (4 + len) * 8;
        let confirmed = (1..REPEAT).any(|k| read_u32(pixels, k * copy_bits) == Some(len as u32));
        if confirmed {
            if let Some(record) = scan_copies(pixels, len, &mut tried) {
                return Ok(record);
            }
        }
    }

    if !valid_len(header) && tried == 0 {
        return Err(WatermarkError::InvalidHeader(header));
    }
    Err(WatermarkError::NoIntactCopy { tried })
}

fn valid_len(len: usize) -> bool {
    len > NSYM && len <= MAX_BLOCK_LEN
}

fn scan_copies(pixels: &[u8], len: usize, tried: &mut usize) -> Option<SignatureRecord> {
    let copy_bits = (4 + len) * 8;
    for rep in 0..REPEAT {
        let start = rep * copy_bits;
        if start + copy_bits > pixels.len() {
            break;
        }
        *tried += 1;
        let block = read_bytes(&pixels[start + HEADER_BITS..start + copy_bits]);
        let Some(message) = reed_solomon::check_blocks(&block, NSYM) else {
            debug!(copy = rep, "syndrome check failed");
            continue;
        };
        match SignatureRecord::from_json_bytes(&message) {
            Ok(record) => {
                debug!(copy = rep, "watermark copy accepted");
                return Some(record);
            }
            Err(e) => debug!(copy = rep, error = %e, "copy passed parity but not parsing"),
        }
    }
    None
}

fn read_u32(pixels: &[u8], bit_offset: usize) -> Option<u32> {
    let bits = pixels.get(bit_offset..bit_offset + HEADER_BITS)?;
    Some(bits.iter().fold(0u32, |acc, &p| (acc << 1) | (p & 1) as u32))
}

fn read_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &p| (acc << 1) | (p & 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn record() -> SignatureRecord {
        SignatureRecord {
            hash: "65501a37b306f5ac183848bab643350219c18111bfa97c706856b668d3bd5996".into(),
            nonce: "f16823b5".into(),
            extranonce2: "00000000".into(),
            ntime: "6964c85e".into(),
            version: "20000000".into(),
            nbits: "1d00ffff".into(),
            status: "AUTHENTICATED_BY_BM1387".into(),
        }
    }

    fn noisy_image(width: usize, height: usize, seed: u64) -> PixelImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..width * height * 3).map(|_| rng.r#gen::<u8>()).collect();
        PixelImage::new(width, height, 3, data).unwrap()
    }

    fn copy_bits() -> usize {
        encode_copy(&record()).len() * 8
    }

    #[test]
    fn round_trip_without_damage() {
        let mut img = noisy_image(64, 64, 1);
        let report = embed(&mut img, &record()).unwrap();
        assert_eq!(report.encoded_bytes, report.payload_bytes + NSYM);
        assert_eq!(report.embedded_bits, required_bits(&record()));
        assert_eq!(extract(&img).unwrap(), record());
    }

    #[test]
    fn embedding_only_touches_lsbs_of_the_payload_region() {
        let original = noisy_image(64, 64, 2);
        let mut img = original.clone();
        let report = embed(&mut img, &record()).unwrap();
        for (i, (a, b)) in original.as_bytes().iter().zip(img.as_bytes()).enumerate() {
            assert_eq!(a & 0xfe, b & 0xfe);
            if i >= report.embedded_bits {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn capacity_rejection_leaves_image_untouched() {
        let original = noisy_image(32, 32, 3);
        let mut img = original.clone();
        let needed = required_bits(&record());
        assert!(needed > img.capacity_bits());
        assert_eq!(
            embed(&mut img, &record()),
            Err(WatermarkError::Capacity { needed, capacity: 32 * 32 * 3 })
        );
        assert_eq!(img, original);
    }

    #[test]
    fn survives_four_of_five_copies_destroyed() {
        let mut img = noisy_image(64, 64, 4);
        embed(&mut img, &record()).unwrap();
        let bits = copy_bits();
        // Scramble everything but the last copy, leading header included.
        let mut rng = StdRng::seed_from_u64(99);
        for b in &mut img.as_bytes_mut()[..4 * bits] {
            *b = rng.r#gen();
        }
        assert_eq!(extract(&img).unwrap(), record());
    }

    #[test]
    fn survives_a_contiguous_edit() {
        let mut img = noisy_image(64, 64, 5);
        embed(&mut img, &record()).unwrap();
        // Paint a dark band across the middle copies.
        let row = 64 * 3;
        for b in &mut img.as_bytes_mut()[12 * row..30 * row] {
            *b = 0x14;
        }
        assert_eq!(extract(&img).unwrap(), record());
    }

    #[test]
    fn all_copies_damaged_is_a_failure_not_a_wrong_record() {
        let mut img = noisy_image(64, 64, 6);
        embed(&mut img, &record()).unwrap();
        let bits = copy_bits();
        for rep in 0..REPEAT {
            // One flipped bit in the data area of every copy.
            img.as_bytes_mut()[rep * bits + HEADER_BITS + 40] ^= 1;
        }
        assert!(matches!(extract(&img), Err(WatermarkError::NoIntactCopy { .. })));
    }

    #[test]
    fn unmarked_image_reports_failure() {
        let img = PixelImage::filled(64, 64, 3, 0).unwrap();
        assert_eq!(extract(&img), Err(WatermarkError::InvalidHeader(0)));
    }

    #[test]
    fn tiny_image_has_no_header() {
        let img = PixelImage::filled(2, 2, 3, 1).unwrap();
        assert_eq!(extract(&img), Err(WatermarkError::InvalidHeader(0)));
    }

    #[test]
    fn oversized_record_is_refused_before_writing() {
        let big = SignatureRecord { status: "X".repeat(10_000), ..record() };
        let original = noisy_image(400, 400, 7);
        let mut img = original.clone();
        assert!(matches!(
            embed(&mut img, &big),
            Err(WatermarkError::PayloadTooLarge { max: MAX_BLOCK_LEN, .. })
        ));
        assert_eq!(img, original);
    }

    #[test]
    fn multi_codeword_record_round_trips() {
        let long = SignatureRecord { status: "S".repeat(600), ..record() };
        let mut img = noisy_image(128, 128, 8);
        let report = embed(&mut img, &long).unwrap();
        assert!(report.encoded_bytes > 255);
        assert_eq!(extract(&img).unwrap(), long);
    }
}
