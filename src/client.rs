//! Client side of the bridge API: one connection per proof request.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Config;
use crate::error_handling::{RetryPolicy, Retryable};
use crate::types::{ApiResponse, ProofRequest, ProofResponse};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not reach bridge at {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connect { .. } | ClientError::Io(_))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeClient {
    addr: SocketAddr,
    timeout: Duration,
    retry: RetryPolicy,
}

impl BridgeClient {
    pub fn new(addr: SocketAddr, timeout: Duration, retry: RetryPolicy) -> Self {
        Self { addr, timeout, retry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bridge_addr, config.get_client_timeout(), RetryPolicy::from_config(config))
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    pub async fn request_proof(&self, data_hex: &str) -> Result<ProofResponse, ClientError> {
        self.retry.execute_with_retry(|| self.request_once(data_hex)).await
    }

    async fn request_once(&self, data_hex: &str) -> Result<ProofResponse, ClientError> {
        let mut line = serde_json::to_string(&ProofRequest { data: data_hex.to_string() })
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        line.push('\n');

        // The write side stays open until the reply is read; the bridge
        // treats end of stream as the caller giving up.
        let exchange = async {
            let mut stream = TcpStream::connect(self.addr).await
                .map_err(|source| ClientError::Connect { addr: self.addr, source })?;
            stream.write_all(line.as_bytes()).await?;
            let mut reader = BufReader::new(stream);
            let mut reply = String::new();
            reader.read_line(&mut reply).await?;
            Ok::<_, ClientError>(reply)
        };
        let reply = tokio::time::timeout(self.timeout, exchange).await
            .map_err(|_| ClientError::Timeout(self.timeout))??;
        debug!(addr = %self.addr, reply = reply.trim_end(), "bridge replied");

        parse_reply(&reply)
    }
}

pub fn parse_reply(reply: &str) -> Result<ProofResponse, ClientError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ClientError::Malformed("connection closed without a reply".to_string()));
    }
    match serde_json::from_str::<ApiResponse>(reply) {
        Ok(ApiResponse::Proof(proof)) => Ok(proof),
        Ok(ApiResponse::Error { error }) => Err(ClientError::Bridge(error)),
        Err(e) => Err(ClientError::Malformed(e.to_string())),
    }
}
