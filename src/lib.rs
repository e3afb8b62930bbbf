pub mod types;
pub mod config;
pub mod gf256;
pub mod reed_solomon;
pub mod pixels;
pub mod watermark;
pub mod header;
pub mod verifier;
pub mod stratum;
pub mod bridge;
pub mod client;
pub mod signing;
pub mod metrics;
pub mod prometheus_metrics;
pub mod error_handling;
pub mod health;
pub mod server;

pub use bridge::{Bridge, BridgeError, BridgeState, BridgeStatus};
pub use client::{BridgeClient, ClientError};
pub use config::{Config, ConfigError};
pub use pixels::PixelImage;
pub use signing::SignatureEngine;
pub use types::SignatureRecord;
pub use verifier::{Authentication, Verifier, VerifyError};
