use thiserror::Error;
use tracing::info;

use crate::client::{BridgeClient, ClientError};
use crate::config::Config;
use crate::pixels::PixelImage;
use crate::types::{ProofResponse, SignatureRecord};
use crate::watermark::{self, EmbedReport, WatermarkError};

#[derive(Error, Debug)]
pub enum SigningError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("proof is missing {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidHex { field: &'static str, value: String },
    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}

/// Header version after the device rolled the bits under `mask`.
pub fn rolled_version(base: u32, bits: u32, mask: u32) -> u32 {
    (base & !mask) | (bits & mask)
}

fn hex_word(field: &'static str, value: &str) -> Result<u32, SigningError> {
    u32::from_str_radix(value, 16).map_err(|_| SigningError::InvalidHex { field, value: value.to_string() })
}

/// Requests a proof over an image's pixel hash and turns it into a record.
pub struct SignatureEngine {
    client: BridgeClient,
    base_version: String,
    rolling_mask: u32,
    nbits: String,
    status: String,
}

impl SignatureEngine {
    pub fn new(client: BridgeClient, config: &Config) -> Self {
        Self {
            client,
            base_version: config.block_version.clone(),
            rolling_mask: config.rolling_mask(),
            nbits: config.nbits.clone(),
            status: config.signature_status.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(BridgeClient::from_config(config), config)
    }

    pub fn record_from_proof(&self, pixel_hash: &str, proof: &ProofResponse) -> Result<SignatureRecord, SigningError> {
        let extranonce2 = proof.extranonce2().ok_or(SigningError::MissingField("extranonce2"))?;
        let ntime = proof.ntime().ok_or(SigningError::MissingField("ntime"))?;
        let version = match proof.version_bits() {
            Some(bits) => {
                let base = hex_word("version", &self.base_version)?;
                let bits = hex_word("version_bits", bits)?;
                format!("{:08x}", rolled_version(base, bits, self.rolling_mask))
            }
            None => self.base_version.clone(),
        };
        Ok(SignatureRecord {
            hash: pixel_hash.to_string(),
            nonce: proof.nonce.clone(),
            extranonce2: extranonce2.to_string(),
            ntime: ntime.to_string(),
            version,
            nbits: self.nbits.clone(),
            status: self.status.clone(),
        })
    }

    pub async fn sign(&self, image: &PixelImage) -> Result<SignatureRecord, SigningError> {
        let hash = image.pixel_hash();
        let proof = self.client.request_proof(&hash).await?;
        let record = self.record_from_proof(&hash, &proof)?;
        info!(hash = %record.hash, nonce = %record.nonce, job_id = %proof.job_id, "image signed");
        Ok(record)
    }

    /// Signs the pixels as they are now, then hides the record in them.
    ///
    /// The record's hash covers the pre-embed pixels, so it verifies only
    /// against those; callers that want to verify later must keep a copy.
    pub async fn sign_and_embed(&self, image: &mut PixelImage) -> Result<(SignatureRecord, EmbedReport), SigningError> {
        let record = self.sign(image).await?;
        let report = watermark::embed(image, &record)?;
        Ok((record, report))
    }
}
