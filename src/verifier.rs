//! Self-calibrating proof-of-work check for a [`SignatureRecord`].
//!
//! The byte order used when the proof was produced is not recorded, so
//! every field is tried as given, fully reversed and word swapped, and the
//! derived merkle root likewise. Success means some header under some
//! ordering hashes below the target; it says nothing about a real
//! transaction set, since the coinbase is a fixed placeholder.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::header::{self, ByteOrder, HeaderFields, DIFF1_TARGET};
use crate::pixels::{pixel_hash, PixelImage};
use crate::types::SignatureRecord;

const FIELD_ORDERS: usize = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("pixel hash {actual} does not match signed hash {expected}")]
    Integrity { expected: String, actual: String },
    #[error("malformed field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("no header below target after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Byte-order choice that produced a valid header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderProfile {
    pub version: ByteOrder,
    pub prevhash: ByteOrder,
    pub ntime: ByteOrder,
    pub nbits: ByteOrder,
    pub nonce: ByteOrder,
    pub extranonce2: ByteOrder,
    pub merkle_root: ByteOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    pub pow_hash: String,
    pub profile: HeaderProfile,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct Verifier {
    target: [u8; 32],
}

impl Default for Verifier {
    fn default() -> Self {
        Self { target: DIFF1_TARGET }
    }
}

impl Verifier {
    pub fn with_target(target: [u8; 32]) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &[u8; 32] { &self.target }

    /// Integrity check first, then the header search.
    pub fn verify(&self, record: &SignatureRecord, pixels: &[u8]) -> Result<Authentication, VerifyError> {
        let actual = pixel_hash(pixels);
        if !actual.eq_ignore_ascii_case(&record.hash) {
            return Err(VerifyError::Integrity { expected: record.hash.clone(), actual });
        }
        debug!("structural integrity verified");
        self.search(record)
    }

    pub fn verify_image(&self, record: &SignatureRecord, image: &PixelImage) -> Result<Authentication, VerifyError> {
        self.verify(record, image.as_bytes())
    }

    pub fn is_authentic(&self, record: &SignatureRecord, pixels: &[u8]) -> bool {
        self.verify(record, pixels).is_ok()
    }

    /// Exhaustive search over 3^6 field orderings times 3 merkle orderings.
    pub fn search(&self, record: &SignatureRecord) -> Result<Authentication, VerifyError> {
        let version = decode_field("version", &record.version, Some(4))?;
        let prevhash = decode_field("hash", &record.hash, Some(32))?;
        let ntime = decode_field("ntime", &record.ntime, Some(4))?;
        let nbits = decode_field("nbits", &record.nbits, Some(4))?;
        let nonce = decode_field("nonce", &record.nonce, Some(4))?;
        let extranonce2 = decode_field("extranonce2", &record.extranonce2, None)?;

        let fields = [
            variants(&version),
            variants(&prevhash),
            variants(&ntime),
            variants(&nbits),
            variants(&nonce),
            variants(&extranonce2),
        ];
        // Merkle roots only depend on the extranonce2 ordering.
        let roots: Vec<[(ByteOrder, Vec<u8>); 3]> = fields[5]
            .iter()
            .map(|(_, en2)| variants(&header::merkle_root(en2)))
            .collect();

        let mut attempts = 0;
        let mut idx = [0usize; FIELD_ORDERS];
        loop {
            let [v, p, nt, nb, no, en2] = idx;
            for (mr_order, mr) in &roots[en2] {
                attempts += 1;
                let candidate = HeaderFields {
                    version: &fields[0][v].1,
                    prevhash: &fields[1][p].1,
                    merkle_root: mr,
                    ntime: &fields[2][nt].1,
                    nbits: &fields[3][nb].1,
                    nonce: &fields[4][no].1,
                }
                .serialize();
                let hash = header::pow_hash(&candidate);
                if header::below_target(&hash, &self.target) {
                    let profile = HeaderProfile {
                        version: fields[0][v].0,
                        prevhash: fields[1][p].0,
                        ntime: fields[2][nt].0,
                        nbits: fields[3][nb].0,
                        nonce: fields[4][no].0,
                        extranonce2: fields[5][en2].0,
                        merkle_root: *mr_order,
                    };
                    let pow_hash = hex::encode(hash);
                    info!(%pow_hash, attempts, "proof of work matched");
                    return Ok(Authentication { pow_hash, profile, attempts });
                }
            }
            if !advance(&mut idx) {
                break;
            }
        }
        debug!(attempts, "header search exhausted");
        Err(VerifyError::Exhausted { attempts })
    }
}

fn variants(bytes: &[u8]) -> [(ByteOrder, Vec<u8>); 3] {
    ByteOrder::ALL.map(|o| (o, o.apply(bytes)))
}

/// Odometer step with the last field varying fastest.
fn advance(idx: &mut [usize; FIELD_ORDERS]) -> bool {
    for slot in idx.iter_mut().rev() {
        *slot += 1;
        if *slot < ByteOrder::ALL.len() {
            return true;
        }
        *slot = 0;
    }
    false
}

fn decode_field(field: &'static str, hex_str: &str, len: Option<usize>) -> Result<Vec<u8>, VerifyError> {
    let bytes = hex::decode(hex_str).map_err(|e| VerifyError::Malformed { field, reason: e.to_string() })?;
    match len {
        Some(n) if bytes.len() != n => Err(VerifyError::Malformed {
            field,
            reason: format!("expected {n} bytes, got {}", bytes.len()),
        }),
        _ => Ok(bytes),
    }
}
