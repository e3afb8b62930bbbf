//! The subset of Stratum v1 needed to drive a single hashing device.
//!
//! One JSON object per line in both directions.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const PLACEHOLDER_COINBASE: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(String),
    #[error("line is not a request")]
    NotRequest,
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    id: Value,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// `mining.submit` params: `[worker, job_id, extranonce2, ntime, nonce, version_bits?]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub worker: String,
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
    pub version_bits: Option<String>,
    /// The params array exactly as received.
    pub raw: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Subscribe,
    Authorize { worker: Option<String> },
    Configure,
    ExtranonceSubscribe,
    Submit(Submission),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub id: Value,
    pub message: DeviceMessage,
}

pub fn parse_line(line: &str) -> Result<DeviceRequest, ProtocolError> {
    let raw: RawRequest = serde_json::from_str(line).map_err(|e| ProtocolError::Json(e.to_string()))?;
    let method = raw.method.ok_or(ProtocolError::NotRequest)?;
    let message = match method.as_str() {
        "mining.subscribe" => DeviceMessage::Subscribe,
        "mining.authorize" => DeviceMessage::Authorize {
            worker: raw.params.get(0).and_then(Value::as_str).map(str::to_string),
        },
        "mining.configure" => DeviceMessage::Configure,
        "mining.extranonce.subscribe" => DeviceMessage::ExtranonceSubscribe,
        "mining.submit" => DeviceMessage::Submit(parse_submission(raw.params)?),
        _ => return Err(ProtocolError::UnsupportedMethod(method)),
    };
    Ok(DeviceRequest { id: raw.id, message })
}

fn parse_submission(params: Value) -> Result<Submission, ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidParams { method: "mining.submit", reason: reason.to_string() };
    let Value::Array(raw) = params else {
        return Err(invalid("params must be an array"));
    };
    if raw.len() < 5 {
        return Err(invalid("expected at least 5 params"));
    }
    let field = |i: usize| -> Result<String, ProtocolError> {
        raw[i].as_str().map(str::to_string).ok_or_else(|| invalid("params must be strings"))
    };
    let version_bits = match raw.get(5) {
        Some(v) => Some(v.as_str().map(str::to_string).ok_or_else(|| invalid("version bits must be a string"))?),
        None => None,
    };
    let (worker, job_id, extranonce2, ntime, nonce) = (field(0)?, field(1)?, field(2)?, field(3)?, field(4)?);
    Ok(Submission { worker, job_id, extranonce2, ntime, nonce, version_bits, raw })
}

/// Parameters of one `mining.notify`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyJob {
    pub job_id: String,
    pub prevhash: String,
    pub version: String,
    pub nbits: String,
    pub ntime: String,
    pub clean_jobs: bool,
}

fn line(value: Value) -> String {
    let mut s = value.to_string();
    s.push('\n');
    s
}

pub fn result_line(id: &Value, result: Value) -> String {
    line(json!({ "id": id, "result": result, "error": null }))
}

pub fn subscribe_reply(id: &Value, subscription_id: &str, extranonce1: &str, extranonce2_size: u32) -> String {
    result_line(
        id,
        json!([[["mining.notify", subscription_id], extranonce1, extranonce2_size], extranonce1, extranonce2_size]),
    )
}

pub fn configure_reply(id: &Value, mask: &str) -> String {
    result_line(id, json!({ "version-rolling": true, "version-rolling.mask": mask }))
}

pub fn ack(id: &Value) -> String {
    result_line(id, Value::Bool(true))
}

pub fn set_difficulty(difficulty: f64) -> String {
    line(json!({ "id": null, "method": "mining.set_difficulty", "params": [difficulty] }))
}

pub fn notify(job: &NotifyJob) -> String {
    line(json!({
        "id": null,
        "method": "mining.notify",
        "params": [
            job.job_id,
            job.prevhash,
            PLACEHOLDER_COINBASE,
            PLACEHOLDER_COINBASE,
            [],
            job.version,
            job.nbits,
            job.ntime,
            job.clean_jobs,
        ],
    }))
}
