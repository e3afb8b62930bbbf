use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NBITS: &str = "1d00ffff";
pub const DEFAULT_VERSION: &str = "20000000";

pub const META_HASH: &str = "Silicon-Auth-Hash";
pub const META_NONCE: &str = "Silicon-Auth-Nonce";
pub const META_EXTRANONCE2: &str = "Silicon-Auth-Extranonce2";
pub const META_NTIME: &str = "Silicon-Auth-Ntime";
pub const META_VERSION: &str = "Silicon-Auth-Version";
pub const META_STATUS: &str = "Silicon-Auth-Status";

fn default_nbits() -> String { DEFAULT_NBITS.to_string() }

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing metadata key: {0}")]
    MissingKey(&'static str),
    #[error("invalid record json: {0}")]
    Json(String),
}

/// Portable proof attached to an image, either as text metadata or inside
/// the watermark payload. Field order is the JSON order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub hash: String,
    pub nonce: String,
    #[serde(default)]
    pub extranonce2: String,
    pub ntime: String,
    pub version: String,
    #[serde(default = "default_nbits")]
    pub nbits: String,
    pub status: String,
}

impl SignatureRecord {
    /// Compact JSON, the byte form carried by the watermark.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // A struct of plain strings always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        serde_json::from_slice(bytes).map_err(|e| RecordError::Json(e.to_string()))
    }

    /// The six `Silicon-Auth-*` text pairs of the plain format.
    pub fn to_text_metadata(&self) -> Vec<(String, String)> {
        vec![
            (META_HASH.to_string(), self.hash.clone()),
            (META_NONCE.to_string(), self.nonce.clone()),
            (META_EXTRANONCE2.to_string(), self.extranonce2.clone()),
            (META_NTIME.to_string(), self.ntime.clone()),
            (META_VERSION.to_string(), self.version.clone()),
            (META_STATUS.to_string(), self.status.clone()),
        ]
    }

    pub fn from_text_metadata(meta: &HashMap<String, String>) -> Result<Self, RecordError> {
        let get = |key: &'static str| meta.get(key).cloned().ok_or(RecordError::MissingKey(key));
        Ok(Self {
            hash: get(META_HASH)?,
            nonce: get(META_NONCE)?,
            extranonce2: get(META_EXTRANONCE2)?,
            ntime: get(META_NTIME)?,
            version: get(META_VERSION)?,
            nbits: default_nbits(),
            status: get(META_STATUS)?,
        })
    }
}

/// Request body on the API port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequest {
    pub data: String,
}

/// Successful reply on the API port. `params` is the device's submit array verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofResponse {
    pub job_id: String,
    pub nonce: String,
    pub params: Vec<serde_json::Value>,
    pub status: String,
}

impl ProofResponse {
    fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).and_then(|v| v.as_str())
    }
    pub fn extranonce2(&self) -> Option<&str> { self.param(2) }
    pub fn ntime(&self) -> Option<&str> { self.param(3) }
    pub fn version_bits(&self) -> Option<&str> { self.param(5) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Proof(ProofResponse),
    Error { error: String },
}

impl ApiResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        ApiResponse::Error { error: msg.into() }
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}

/// Protocol phase of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Connected,
    Subscribed,
    Authorized,
    Mining,
    Disconnected,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Connected => "connected",
            SessionPhase::Subscribed => "subscribed",
            SessionPhase::Authorized => "authorized",
            SessionPhase::Mining => "mining",
            SessionPhase::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SignatureRecord {
        SignatureRecord {
            hash: "65501a37b306f5ac183848bab643350219c18111bfa97c706856b668d3bd5996".into(),
            nonce: "f16823b5".into(),
            extranonce2: "00000001".into(),
            ntime: "6964c85e".into(),
            version: DEFAULT_VERSION.into(),
            nbits: DEFAULT_NBITS.into(),
            status: "AUTHENTICATED_BY_BM1387".into(),
        }
    }

    #[test]
    fn json_is_compact_and_ordered() {
        let json = String::from_utf8(record().to_json_bytes()).unwrap();
        assert!(json.starts_with("{\"hash\":\"6550"));
        assert!(!json.contains(' '));
        let order: Vec<usize> = ["\"hash\"", "\"nonce\"", "\"extranonce2\"", "\"ntime\"", "\"version\"", "\"nbits\"", "\"status\""]
            .iter()
            .map(|k| json.find(k).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn legacy_json_without_extranonce_or_nbits_parses() {
        let raw = br#"{"hash":"ab","nonce":"f16823b5","ntime":"6964c85e","version":"20000000","status":"ok"}"#;
        let rec = SignatureRecord::from_json_bytes(raw).unwrap();
        assert_eq!(rec.extranonce2, "");
        assert_eq!(rec.nbits, DEFAULT_NBITS);
    }

    #[test]
    fn text_metadata_has_six_keys_and_reads_back() {
        let rec = record();
        let pairs = rec.to_text_metadata();
        assert_eq!(pairs.len(), 6);
        let map: HashMap<String, String> = pairs.into_iter().collect();
        assert_eq!(SignatureRecord::from_text_metadata(&map).unwrap(), rec);
    }

    #[test]
    fn text_metadata_missing_key() {
        let mut map: HashMap<String, String> = record().to_text_metadata().into_iter().collect();
        map.remove(META_NONCE);
        assert_eq!(SignatureRecord::from_text_metadata(&map), Err(RecordError::MissingKey(META_NONCE)));
    }

    #[test]
    fn api_response_shapes() {
        let err = ApiResponse::error("S9 not connected").to_line();
        assert_eq!(err, "{\"error\":\"S9 not connected\"}\n");
        let ok: ApiResponse = serde_json::from_str(
            r#"{"job_id":"1","nonce":"deadbeef","params":["w","1","00000000","6964c85e","deadbeef"],"status":"success"}"#,
        ).unwrap();
        match ok {
            ApiResponse::Proof(p) => {
                assert_eq!(p.extranonce2(), Some("00000000"));
                assert_eq!(p.version_bits(), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
