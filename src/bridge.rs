//! Pool-facing stratum endpoint for one hashing device plus a one-shot
//! request/response API for clients that want a proof over some bytes.
//!
//! API requests go through a FIFO queue to a single dispatcher, which turns
//! each into a `mining.notify` with `clean_jobs = true`. The device's
//! `mining.submit` is matched back to the waiting requester by job id.
//! The job table is the only state shared between connections; its lock is
//! never held across an await.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::{ErrorType, MetricsCollector};
use crate::stratum::{self, DeviceMessage, NotifyJob, ProtocolError, Submission};
use crate::types::{ApiResponse, ProofRequest, ProofResponse, SessionPhase};

pub const PREVHASH_HEX_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("stratum protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("device connection closed")]
    DeviceGone,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// One outstanding unit of work, owned by the job table.
#[derive(Debug)]
pub struct HashJob {
    pub job_id: String,
    pub payload_hex: String,
    requester: oneshot::Sender<ApiResponse>,
    dispatched_at: Instant,
}

/// The active device connection.
#[derive(Debug)]
pub struct DeviceSession {
    id: u64,
    peer: SocketAddr,
    phase: SessionPhase,
    difficulty: Option<f64>,
    outbound: mpsc::UnboundedSender<String>,
    evicted: Arc<Notify>,
}

/// A parsed API request waiting in the dispatch queue.
#[derive(Debug)]
pub struct ApiRequest {
    pub payload_hex: String,
    pub reply: oneshot::Sender<ApiResponse>,
}

#[derive(Debug, Default)]
struct JobTable {
    next_id: u64,
    pending: HashMap<String, HashJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub device_peer: Option<String>,
    pub phase: SessionPhase,
    pub difficulty: Option<f64>,
    pub pending_jobs: usize,
    pub jobs_issued: u64,
}

pub struct BridgeState {
    config: Config,
    jobs: Mutex<JobTable>,
    device: Mutex<Option<DeviceSession>>,
    session_seq: AtomicU64,
    metrics: Arc<MetricsCollector>,
}

/// First 64 hex characters of the payload, right-padded with zeros.
pub fn derive_prevhash(payload_hex: &str) -> String {
    let mut prevhash: String = payload_hex.chars().take(PREVHASH_HEX_LEN).collect();
    while prevhash.len() < PREVHASH_HEX_LEN {
        prevhash.push('0');
    }
    prevhash
}

/// Validates one API request line and returns its hex payload.
pub fn parse_api_request(line: &str) -> Result<String, String> {
    let req: ProofRequest = serde_json::from_str(line.trim())
        .map_err(|e| format!("invalid request: {e}"))?;
    if req.data.is_empty() {
        return Err("data must not be empty".to_string());
    }
    if !req.data.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("data must be hex".to_string());
    }
    Ok(req.data)
}

impl BridgeState {
    pub fn new(config: Config, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config,
            jobs: Mutex::new(JobTable::default()),
            device: Mutex::new(None),
            session_seq: AtomicU64::new(0),
            metrics,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self) -> MutexGuard<'_, Option<DeviceSession>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> { &self.metrics }

    pub fn status(&self) -> BridgeStatus {
        let (device_peer, phase, difficulty) = match &*self.device() {
            Some(s) => (Some(s.peer.to_string()), s.phase, s.difficulty),
            None => (None, SessionPhase::Disconnected, None),
        };
        let jobs = self.jobs();
        BridgeStatus {
            device_peer,
            phase,
            difficulty,
            pending_jobs: jobs.pending.len(),
            jobs_issued: jobs.next_id,
        }
    }

    /// Installs a new device session, evicting any previous one.
    pub fn attach_device(&self, peer: SocketAddr, outbound: mpsc::UnboundedSender<String>) -> (u64, Arc<Notify>) {
        let id = self.session_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let evicted = Arc::new(Notify::new());
        let session = DeviceSession {
            id,
            peer,
            phase: SessionPhase::Connected,
            difficulty: None,
            outbound,
            evicted: evicted.clone(),
        };
        if let Some(old) = self.device().replace(session) {
            info!(old_peer = %old.peer, %peer, "replacing device session");
            old.evicted.notify_one();
        }
        self.metrics.record_device_connected();
        (id, evicted)
    }

    /// Clears the session if it is still the current one.
    pub fn detach_device(&self, session_id: u64) {
        let mut device = self.device();
        if device.as_ref().is_some_and(|s| s.id == session_id) {
            *device = None;
            drop(device);
            self.metrics.record_device_disconnected();
        }
    }

    fn set_phase(&self, session_id: u64, phase: SessionPhase) {
        if let Some(s) = self.device().as_mut().filter(|s| s.id == session_id) {
            if s.phase != phase {
                debug!(peer = %s.peer, from = %s.phase, to = %phase, "device phase change");
                s.phase = phase;
            }
        }
    }

    fn set_difficulty(&self, session_id: u64, difficulty: f64) {
        if let Some(s) = self.device().as_mut().filter(|s| s.id == session_id) {
            s.difficulty = Some(difficulty);
        }
    }

    /// Turns one queued request into a device job, or fails it at once when
    /// no device is connected.
    pub fn dispatch(&self, req: ApiRequest) {
        let target = self.device().as_ref().map(|s| (s.id, s.outbound.clone()));
        let Some((session_id, outbound)) = target else {
            warn!("request refused: device not connected");
            self.metrics.record_rejection();
            let _ = req.reply.send(ApiResponse::error("device not connected"));
            return;
        };

        let prevhash = derive_prevhash(&req.payload_hex);
        let job_id = {
            let mut jobs = self.jobs();
            jobs.next_id += 1;
            let job_id = format!("{:x}", jobs.next_id);
            jobs.pending.insert(job_id.clone(), HashJob {
                job_id: job_id.clone(),
                payload_hex: prevhash.clone(),
                requester: req.reply,
                dispatched_at: Instant::now(),
            });
            self.metrics.set_pending(jobs.pending.len());
            job_id
        };

        let notify = stratum::notify(&NotifyJob {
            job_id: job_id.clone(),
            prevhash,
            version: self.config.block_version.clone(),
            nbits: self.config.nbits.clone(),
            ntime: format!("{:x}", chrono::Utc::now().timestamp()),
            clean_jobs: true,
        });

        if outbound.send(notify).is_err() {
            warn!(%job_id, "device went away before the job was sent");
            if let Some(job) = self.take_job(&job_id) {
                let _ = job.requester.send(ApiResponse::error("device disconnected"));
            }
            return;
        }
        self.metrics.record_dispatch();
        self.set_phase(session_id, SessionPhase::Mining);
        info!(%job_id, "job dispatched to device");
    }

    fn take_job(&self, job_id: &str) -> Option<HashJob> {
        let mut jobs = self.jobs();
        let job = jobs.pending.remove(job_id);
        self.metrics.set_pending(jobs.pending.len());
        job
    }

    /// Hands a device submit back to its requester; unknown jobs are dropped.
    pub fn complete_job(&self, submission: Submission) {
        let Some(job) = self.take_job(&submission.job_id) else {
            debug!(job_id = %submission.job_id, "submit for unknown job dropped");
            self.metrics.record_stale_submit();
            return;
        };
        let latency_ms = job.dispatched_at.elapsed().as_millis() as u64;
        let response = ApiResponse::Proof(ProofResponse {
            job_id: job.job_id.clone(),
            nonce: submission.nonce.clone(),
            params: submission.raw,
            status: "success".to_string(),
        });
        if job.requester.send(response).is_err() {
            debug!(job_id = %job.job_id, "requester gone, proof dropped");
            self.metrics.record_stale_submit();
        } else {
            info!(job_id = %job.job_id, nonce = %submission.nonce, latency_ms, "proof delivered");
            self.metrics.record_completion(latency_ms);
        }
    }

    /// Fails every job pending for at least `timeout`.
    pub fn expire_jobs(&self, timeout: Duration) -> usize {
        let expired: Vec<HashJob> = {
            let mut jobs = self.jobs();
            let ids: Vec<String> = jobs.pending.values()
                .filter(|j| j.dispatched_at.elapsed() >= timeout)
                .map(|j| j.job_id.clone())
                .collect();
            let expired: Vec<HashJob> = ids.iter().filter_map(|id| jobs.pending.remove(id)).collect();
            self.metrics.set_pending(jobs.pending.len());
            expired
        };
        let count = expired.len();
        if count > 0 {
            self.metrics.record_expiry(count as u64);
        }
        for job in expired {
            warn!(job_id = %job.job_id, "job expired without a submit");
            let _ = job.requester.send(ApiResponse::error("job timed out"));
        }
        count
    }

    fn handle_device_line(&self, session_id: u64, outbound: &mpsc::UnboundedSender<String>, line: &str) -> Result<(), BridgeError> {
        let send = |msg: String| outbound.send(msg).map_err(|_| BridgeError::DeviceGone);
        let req = stratum::parse_line(line)?;
        match req.message {
            DeviceMessage::Subscribe => {
                self.set_phase(session_id, SessionPhase::Subscribed);
                send(stratum::subscribe_reply(
                    &req.id,
                    &self.config.subscription_id,
                    &self.config.extranonce1,
                    self.config.extranonce2_size,
                ))?;
            }
            DeviceMessage::Configure => {
                send(stratum::configure_reply(&req.id, &self.config.version_rolling_mask))?;
            }
            DeviceMessage::ExtranonceSubscribe => {
                send(stratum::ack(&req.id))?;
            }
            DeviceMessage::Authorize { worker } => {
                self.set_difficulty(session_id, self.config.device_difficulty);
                self.set_phase(session_id, SessionPhase::Authorized);
                send(stratum::ack(&req.id))?;
                send(stratum::set_difficulty(self.config.device_difficulty))?;
                info!(worker = worker.as_deref().unwrap_or("-"), difficulty = self.config.device_difficulty, "device authorized");
            }
            DeviceMessage::Submit(submission) => {
                if let Some(bits) = &submission.version_bits {
                    info!(job_id = %submission.job_id, version_bits = %bits, "submit carries rolled version bits");
                }
                // Every submit is accepted, matched or not.
                send(stratum::ack(&req.id))?;
                self.complete_job(submission);
            }
        }
        Ok(())
    }
}

pub struct Bridge {
    state: Arc<BridgeState>,
    pool_listener: TcpListener,
    api_listener: TcpListener,
}

impl Bridge {
    pub async fn bind(config: &Config, metrics: Arc<MetricsCollector>) -> Result<Self, BridgeError> {
        let pool_listener = TcpListener::bind(config.stratum_addr).await
            .map_err(|source| BridgeError::Bind { addr: config.stratum_addr, source })?;
        let api_listener = TcpListener::bind(config.api_addr).await
            .map_err(|source| BridgeError::Bind { addr: config.api_addr, source })?;
        Ok(Self {
            state: Arc::new(BridgeState::new(config.clone(), metrics)),
            pool_listener,
            api_listener,
        })
    }

    pub fn pool_addr(&self) -> io::Result<SocketAddr> { self.pool_listener.local_addr() }
    pub fn api_addr(&self) -> io::Result<SocketAddr> { self.api_listener.local_addr() }
    pub fn state(&self) -> Arc<BridgeState> { self.state.clone() }

    /// Runs both listeners, the dispatcher and the expiry sweeper.
    pub async fn run(self) -> Result<(), BridgeError> {
        let Bridge { state, pool_listener, api_listener } = self;
        info!(
            pool = %pool_listener.local_addr()?,
            api = %api_listener.local_addr()?,
            "bridge ready"
        );
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        tokio::select! {
            res = serve_pool(state.clone(), pool_listener) => res,
            res = serve_api(state.clone(), api_listener, queue_tx) => res,
            _ = run_dispatcher(state.clone(), queue_rx) => Ok(()),
            _ = sweep_expired(state.clone()) => Ok(()),
        }
    }
}

async fn run_dispatcher(state: Arc<BridgeState>, mut queue: mpsc::UnboundedReceiver<ApiRequest>) {
    while let Some(req) = queue.recv().await {
        state.dispatch(req);
    }
}

async fn sweep_expired(state: Arc<BridgeState>) {
    let Some(timeout) = state.config.job_timeout() else {
        return std::future::pending().await;
    };
    let period = (timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        state.expire_jobs(timeout);
    }
}

async fn serve_pool(state: Arc<BridgeState>, listener: TcpListener) -> Result<(), BridgeError> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "stratum accept failed");
                state.metrics.record_error(ErrorType::Connectivity);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move { run_device_session(state, socket, peer).await });
    }
}

async fn run_device_session(state: Arc<BridgeState>, socket: TcpStream, peer: SocketAddr) {
    let (read_half, mut write_half) = socket.into_split();
    let (outbound, mut rx) = mpsc::unbounded_channel::<String>();
    let (session_id, evicted) = state.attach_device(peer, outbound.clone());
    info!(%peer, session_id, "device connected");

    let mut writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            write_half.write_all(line.as_bytes()).await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut lines = BufReader::new(read_half).lines();
    let reason = loop {
        tokio::select! {
            _ = evicted.notified() => break "replaced",
            res = &mut writer => {
                if let Ok(Err(e)) = res {
                    debug!(%peer, error = %e, "device write failed");
                }
                state.metrics.record_error(ErrorType::Connectivity);
                break "write failed";
            }
            next = lines.next_line() => match next {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = state.handle_device_line(session_id, &outbound, &line) {
                        warn!(%peer, error = %e, "dropping device connection");
                        let kind = match e {
                            BridgeError::Protocol(_) => ErrorType::Protocol,
                            _ => ErrorType::Connectivity,
                        };
                        state.metrics.record_error(kind);
                        break "error";
                    }
                }
                Ok(None) => break "eof",
                Err(e) => {
                    debug!(%peer, error = %e, "device read failed");
                    state.metrics.record_error(ErrorType::Connectivity);
                    break "read failed";
                }
            }
        }
    };

    state.detach_device(session_id);
    writer.abort();
    info!(%peer, session_id, reason, "device disconnected, waiting for reconnection");
}

async fn serve_api(
    state: Arc<BridgeState>,
    listener: TcpListener,
    queue: mpsc::UnboundedSender<ApiRequest>,
) -> Result<(), BridgeError> {
    let slots = Arc::new(Semaphore::new(state.config.max_concurrent_requests as usize));
    loop {
        let Ok(permit) = slots.clone().acquire_owned().await else {
            return Ok(());
        };
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "api accept failed");
                state.metrics.record_error(ErrorType::Connectivity);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let state = state.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_api_connection(state, socket, queue).await {
                debug!(%peer, error = %e, "api connection ended with error");
            }
        });
    }
}

/// One request, one reply. A client may half-close after its request and
/// still gets the reply. A reset connection drops the pending reply; a later
/// submit for that job then counts as stale.
async fn handle_api_connection(
    state: Arc<BridgeState>,
    socket: TcpStream,
    queue: mpsc::UnboundedSender<ApiRequest>,
) -> Result<(), BridgeError> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let limit = state.config.max_request_bytes;

    let mut line = String::new();
    let read = (&mut reader).take(limit as u64).read_line(&mut line).await;
    let reply = match read {
        Ok(0) => return Ok(()),
        Ok(n) if n >= limit && !line.ends_with('\n') => Err("request too large".to_string()),
        Ok(_) => parse_api_request(&line),
        Err(e) => Err(format!("invalid request: {e}")),
    };

    let reply = match reply {
        Err(msg) => {
            state.metrics.record_error(ErrorType::Request);
            ApiResponse::error(msg)
        }
        Ok(payload_hex) => {
            state.metrics.record_request();
            let (tx, rx) = oneshot::channel();
            if queue.send(ApiRequest { payload_hex, reply: tx }).is_err() {
                ApiResponse::error("bridge shutting down")
            } else {
                tokio::select! {
                    res = rx => res.unwrap_or_else(|_| ApiResponse::error("bridge shutting down")),
                    _ = wait_for_reset(&mut reader) => {
                        debug!("requester reset the connection before its reply");
                        return Ok(());
                    }
                }
            }
        }
    };

    if let Err(e) = write_half.write_all(reply.to_line().as_bytes()).await {
        debug!(error = %e, "requester gone, reply dropped");
        return Ok(());
    }
    write_half.shutdown().await?;
    Ok(())
}

/// Resolves only on a read error. End of stream is a half-close, after which
/// the requester is still owed its reply.
async fn wait_for_reset<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return std::future::pending().await,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn state() -> BridgeState {
        BridgeState::new(Config::default(), Arc::new(MetricsCollector::new()))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn request(data: &str) -> (ApiRequest, oneshot::Receiver<ApiResponse>) {
        let (tx, rx) = oneshot::channel();
        (ApiRequest { payload_hex: data.to_string(), reply: tx }, rx)
    }

    fn submission(job_id: &str, nonce: &str) -> Submission {
        let raw = vec![json!("w"), json!(job_id), json!("00000000"), json!("6964c85e"), json!(nonce)];
        Submission {
            worker: "w".into(),
            job_id: job_id.into(),
            extranonce2: "00000000".into(),
            ntime: "6964c85e".into(),
            nonce: nonce.into(),
            version_bits: None,
            raw,
        }
    }

    #[test]
    fn prevhash_truncates_and_pads() {
        assert_eq!(derive_prevhash(&"ab".repeat(40)), "ab".repeat(32));
        assert_eq!(derive_prevhash("abc"), format!("abc{}", "0".repeat(61)));
    }

    #[test]
    fn api_request_validation() {
        assert_eq!(parse_api_request("{\"data\":\"abcd\"}\n"), Ok("abcd".to_string()));
        assert!(parse_api_request("{\"data\":\"\"}").is_err());
        assert!(parse_api_request("{\"data\":\"xyz\"}").is_err());
        assert!(parse_api_request("{\"other\":1}").is_err());
        assert!(parse_api_request("not json").is_err());
    }

    #[test]
    fn no_device_fails_fast_without_a_job() {
        let state = state();
        let (req, mut rx) = request("ab");
        state.dispatch(req);
        assert_eq!(rx.try_recv().unwrap(), ApiResponse::error("device not connected"));
        assert_eq!(state.status().pending_jobs, 0);
        assert_eq!(state.status().jobs_issued, 0);
    }

    #[test]
    fn dispatch_sends_clean_notify_with_hex_job_ids() {
        let state = state();
        let (tx, mut device_rx) = mpsc::unbounded_channel();
        state.attach_device(peer(), tx);

        let mut receivers = Vec::new();
        for _ in 0..17 {
            let (req, rx) = request(&"ab".repeat(32));
            state.dispatch(req);
            receivers.push(rx);
        }
        let mut last = Value::Null;
        while let Ok(line) = device_rx.try_recv() {
            last = serde_json::from_str(line.trim_end()).unwrap();
        }
        assert_eq!(last["method"], "mining.notify");
        assert_eq!(last["params"][0], "11");
        assert_eq!(last["params"][1], json!("ab".repeat(32)));
        assert_eq!(last["params"][8], true);
        assert_eq!(state.status().phase, SessionPhase::Mining);
        assert_eq!(state.status().pending_jobs, 17);
    }

    #[test]
    fn submits_reach_their_own_requesters() {
        let state = state();
        let (tx, _device_rx) = mpsc::unbounded_channel();
        state.attach_device(peer(), tx);

        let (first, mut first_rx) = request("aa");
        let (second, mut second_rx) = request("bb");
        state.dispatch(first);
        state.dispatch(second);

        // Device answers out of order.
        state.complete_job(submission("2", "0000bbbb"));
        state.complete_job(submission("1", "0000aaaa"));

        let ApiResponse::Proof(p1) = first_rx.try_recv().unwrap() else { panic!("first failed") };
        let ApiResponse::Proof(p2) = second_rx.try_recv().unwrap() else { panic!("second failed") };
        assert_eq!((p1.job_id.as_str(), p1.nonce.as_str()), ("1", "0000aaaa"));
        assert_eq!((p2.job_id.as_str(), p2.nonce.as_str()), ("2", "0000bbbb"));
        assert_eq!(p1.status, "success");
        assert_eq!(p1.params.len(), 5);
    }

    #[test]
    fn duplicate_and_unknown_submits_are_dropped() {
        let state = state();
        let (tx, _device_rx) = mpsc::unbounded_channel();
        state.attach_device(peer(), tx);
        let (req, _rx) = request("aa");
        state.dispatch(req);

        state.complete_job(submission("1", "00000001"));
        state.complete_job(submission("1", "00000002"));
        state.complete_job(submission("ff", "00000003"));
        assert_eq!(state.metrics().get_metrics().stale_submits, 2);
        assert_eq!(state.metrics().get_metrics().jobs_completed, 1);
    }

    #[test]
    fn expired_jobs_get_an_error_reply() {
        let state = state();
        let (tx, _device_rx) = mpsc::unbounded_channel();
        state.attach_device(peer(), tx);
        let (req, mut rx) = request("aa");
        state.dispatch(req);

        assert_eq!(state.expire_jobs(Duration::from_secs(3600)), 0);
        assert_eq!(state.expire_jobs(Duration::ZERO), 1);
        assert_eq!(rx.try_recv().unwrap(), ApiResponse::error("job timed out"));
        // A submit arriving afterwards finds nobody.
        state.complete_job(submission("1", "00000001"));
        assert_eq!(state.metrics().get_metrics().stale_submits, 1);
    }

    #[test]
    fn newer_device_evicts_older_and_stale_detach_is_ignored() {
        let state = state();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (first, _evicted_first) = state.attach_device(peer(), tx1);
        let (second, _) = state.attach_device("127.0.0.1:50001".parse().unwrap(), tx2);
        state.detach_device(first);
        assert_eq!(state.status().device_peer.as_deref(), Some("127.0.0.1:50001"));
        state.detach_device(second);
        assert_eq!(state.status().phase, SessionPhase::Disconnected);
    }

    #[test]
    fn handshake_moves_through_phases() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (id, _) = state.attach_device(peer(), tx.clone());
        state.handle_device_line(id, &tx, r#"{"id":1,"method":"mining.subscribe","params":[]}"#).unwrap();
        assert_eq!(state.status().phase, SessionPhase::Subscribed);
        state.handle_device_line(id, &tx, r#"{"id":2,"method":"mining.authorize","params":["w","x"]}"#).unwrap();
        assert_eq!(state.status().phase, SessionPhase::Authorized);
        assert_eq!(state.status().difficulty, Some(4.0));

        let replies: Vec<Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|l| serde_json::from_str(l.trim_end()).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[1], json!({"id": 2, "result": true, "error": null}));
        assert_eq!(replies[2]["method"], "mining.set_difficulty");

        assert!(matches!(
            state.handle_device_line(id, &tx, "garbage"),
            Err(BridgeError::Protocol(_))
        ));
    }
}
