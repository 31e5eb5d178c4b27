use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

use crate::error::{Result, ShellError};

/// Parameters forwarded to the backend's `/separate` endpoint.
///
/// The page sends camelCase keys, the backend expects snake_case. Values are
/// not checked here and unknown keys travel along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparationRequest {
    #[serde(alias = "inputPath", skip_serializing_if = "Option::is_none")]
    pub input_path: Option<Value>,
    #[serde(alias = "outputDir", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationEvent {
    pub job_id: u64,
    pub status: JobStatus,
    pub elapsed_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SeparationEvent {
    fn new(job_id: u64, status: JobStatus, elapsed: Duration) -> Self {
        Self {
            job_id,
            status,
            elapsed_secs: elapsed.as_secs(),
            output_file: None,
            message: None,
        }
    }
}

/// Where job progress goes. The app publishes to the webview; tests collect.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &SeparationEvent);
}

#[derive(Debug, Clone)]
pub struct SeparationClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Option<Duration>,
    heartbeat: Duration,
}

impl SeparationClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            timeout: None,
            heartbeat: Duration::from_secs(crate::config::DEFAULT_HEARTBEAT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// One POST to the backend. A 2xx JSON object comes back with
    /// `success: true` merged in; the backend's own keys win.
    pub async fn dispatch(&self, request: &SeparationRequest) -> Result<Map<String, Value>> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(backend_error(status, &body));
        }
        merge_success(&body)
    }

    async fn race(
        &self,
        job_id: u64,
        request: &SeparationRequest,
        cancel: oneshot::Receiver<()>,
        sink: &dyn ProgressSink,
        started: Instant,
    ) -> Result<Map<String, Value>> {
        let outcome = self.dispatch(request);
        tokio::pin!(outcome);

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        // A dropped sender is not a cancellation.
        let cancelled = async move {
            if cancel.await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(cancelled);

        let mut heartbeat = tokio::time::interval_at(started + self.heartbeat, self.heartbeat);

        loop {
            tokio::select! {
                result = &mut outcome => return result,
                _ = &mut cancelled => return Err(ShellError::Cancelled(job_id)),
                _ = &mut deadline => {
                    return Err(ShellError::TimedOut(timeout.unwrap_or_default()));
                }
                _ = heartbeat.tick() => {
                    sink.publish(&SeparationEvent::new(job_id, JobStatus::Running, started.elapsed()));
                }
            }
        }
    }
}

fn backend_error(status: StatusCode, body: &[u8]) -> ShellError {
    let reported = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .filter(|message| !message.is_empty());

    match reported {
        Some(message) => ShellError::Backend(message),
        None => ShellError::Backend(format!(
            "Request failed with status code {}",
            status.as_u16()
        )),
    }
}

fn merge_success(body: &[u8]) -> Result<Map<String, Value>> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ShellError::InvalidResponse(e.to_string()))?;

    match value {
        Value::Object(fields) => {
            let mut merged = Map::new();
            merged.insert("success".to_string(), Value::Bool(true));
            merged.extend(fields);
            Ok(merged)
        }
        other => Err(ShellError::InvalidResponse(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// In-flight separation jobs, each with a way to cancel it.
#[derive(Debug, Default)]
pub struct SeparationJobs {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, oneshot::Sender<()>>>,
}

impl SeparationJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new id, its cancel signal and how many other jobs were
    /// already running.
    fn register(&self) -> (u64, oneshot::Receiver<()>, usize) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        let mut active = self.active.lock();
        let others = active.len();
        active.insert(id, tx);
        (id, rx, others)
    }

    fn finish(&self, id: u64) {
        self.active.lock().remove(&id);
    }

    /// Cancels one job, or every job when `id` is `None`. Returns how many
    /// were signalled.
    pub fn cancel(&self, id: Option<u64>) -> usize {
        let mut active = self.active.lock();
        let senders: Vec<oneshot::Sender<()>> = match id {
            Some(id) => active.remove(&id).into_iter().collect(),
            None => active.drain().map(|(_, tx)| tx).collect(),
        };
        drop(active);

        senders
            .into_iter()
            .map(|tx| tx.send(()))
            .filter(|sent| sent.is_ok())
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.active.lock().len()
    }
}

struct JobGuard<'a> {
    jobs: &'a SeparationJobs,
    id: u64,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.jobs.finish(self.id);
    }
}

/// Runs one separation as a tracked job: registered so it can be cancelled,
/// bounded by the client's timeout, and reported to `sink` from start to end.
pub async fn run_separation(
    client: &SeparationClient,
    jobs: &SeparationJobs,
    request: &SeparationRequest,
    sink: &dyn ProgressSink,
) -> Result<Map<String, Value>> {
    let (job_id, cancel, others) = jobs.register();
    let _guard = JobGuard { jobs, id: job_id };

    if others > 0 {
        warn!(job_id, others, "separation started while other jobs are in flight");
    }
    info!(job_id, endpoint = %client.endpoint(), "separation started");

    let started = Instant::now();
    sink.publish(&SeparationEvent::new(job_id, JobStatus::Started, Duration::ZERO));

    let outcome = client.race(job_id, request, cancel, sink, started).await;
    let elapsed = started.elapsed();

    let event = match &outcome {
        Ok(body) => {
            let mut event = SeparationEvent::new(job_id, JobStatus::Completed, elapsed);
            event.output_file = body
                .get("output_file")
                .and_then(Value::as_str)
                .map(str::to_owned);
            info!(job_id, elapsed_secs = elapsed.as_secs(), "separation completed");
            event
        }
        Err(e) => {
            let status = match e {
                ShellError::Cancelled(_) => JobStatus::Cancelled,
                ShellError::TimedOut(_) => JobStatus::TimedOut,
                _ => JobStatus::Failed,
            };
            let mut event = SeparationEvent::new(job_id, status, elapsed);
            event.message = Some(e.to_string());
            warn!(job_id, error = %e, "separation did not complete");
            event
        }
    };
    sink.publish(&event);

    outcome
}
