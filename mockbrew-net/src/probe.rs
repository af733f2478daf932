// mockbrew-net/src/probe.rs
// HTTP control calls against a locally running server: liveness probing with
// bounded exponential backoff, and the shutdown request.

use std::time::{Duration, Instant};

use mockbrew_common::error::{MbError, Result};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

pub const STATUS_PATH: &str = "/status";
pub const STOP_PATH: &str = "/stop";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT_STRING: &str = "mockbrew smoke test";

/// Exponential retry delays: `initial * factor^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            factor: 2,
        }
    }

    /// Delay to sleep after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(multiplier)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(2))
    }
}

/// Result of a successful readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyReport {
    pub attempts: u32,
    pub elapsed: Duration,
    pub status: StatusCode,
}

/// Issues control requests to a server at a fixed base URL.
#[derive(Debug, Clone)]
pub struct ServerProbe {
    client: Client,
    base_url: Url,
}

impl ServerProbe {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            MbError::ValidationError(format!("Invalid server URL '{base_url}': {e}"))
        })?;
        let client = Client::builder()
            .user_agent(USER_AGENT_STRING)
            .no_proxy()
            .build()
            .map_err(|e| MbError::HttpError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// `http://localhost:<port>`
    pub fn localhost(port: u16) -> Result<Self> {
        Self::new(&format!("http://localhost:{port}"))
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| MbError::ValidationError(format!("Invalid endpoint path '{path}': {e}")))
    }

    /// Sends an empty `PUT` and returns the response status. Transport
    /// failures (refused connection, timeout) are errors; any HTTP status,
    /// including non-2xx, is returned as-is.
    pub async fn put(&self, path: &str, timeout: Duration) -> Result<StatusCode> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .put(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| MbError::HttpError(format!("PUT {url} failed: {e}")))?;
        let status = response.status();
        debug!("PUT {} -> {}", url, status);
        Ok(status)
    }

    pub async fn stop(&self) -> Result<StatusCode> {
        self.put(STOP_PATH, REQUEST_TIMEOUT).await
    }

    /// Polls `PUT /status` until it returns 2xx or `timeout` elapses.
    ///
    /// `check_alive` runs before every attempt; returning an error from it
    /// aborts the wait with that error (used to notice a server process that
    /// died during startup).
    pub async fn wait_until_ready<F>(
        &self,
        backoff: &Backoff,
        timeout: Duration,
        mut check_alive: F,
    ) -> Result<ReadyReport>
    where
        F: FnMut() -> Result<()>,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts: u32 = 0;

        loop {
            check_alive()?;
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let request_timeout = remaining.min(REQUEST_TIMEOUT).max(Duration::from_millis(1));
            let last_failure = match self.put(STATUS_PATH, request_timeout).await {
                Ok(status) if status.is_success() => {
                    let elapsed = started.elapsed();
                    debug!(
                        "Server ready after {} attempt(s) in {:?}",
                        attempts, elapsed
                    );
                    return Ok(ReadyReport {
                        attempts,
                        elapsed,
                        status,
                    });
                }
                Ok(status) => {
                    debug!("Status attempt {} answered {}", attempts, status);
                    format!("HTTP {status}")
                }
                Err(e) => {
                    debug!("Status attempt {} failed: {}", attempts, e);
                    e.to_string()
                }
            };

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Server not ready after {} attempt(s); last failure: {}",
                    attempts, last_failure
                );
                return Err(MbError::Timeout(format!(
                    "{} did not succeed within {:?} ({} attempts, last failure: {})",
                    self.endpoint(STATUS_PATH)?,
                    timeout,
                    attempts,
                    last_failure
                )));
            }
            let delay = backoff.delay_for(attempts - 1).min(deadline - now);
            tokio::time::sleep(delay).await;
        }
    }
}
