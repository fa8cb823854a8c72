//! ExternalCallGateway: one timeout-bounded HTTP attempt per call.
//!
//! Every collaborator call funnels through [`Gateway`]. Transport errors, non-2xx
//! statuses, undecodable bodies and deadline expiry all come back as a
//! [`ServiceOutcome`] variant; nothing here returns `Err` or panics, so callers
//! apply their own policy to each outcome. No retries.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Timeout class for the ML collaborators (prediction, sentiment, explanation, extraction).
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout class for the trending-news provider.
pub const TRENDING_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "fake-news-orchestrator/0.1";

/// Why a call did not succeed (timeouts are reported separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    /// HTTP status if the collaborator answered at all.
    pub status: Option<StatusCode>,
    pub reason: String,
}

impl CallFailure {
    fn transport(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status.as_u16(), self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// Outcome of exactly one collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome<T> {
    Success(T),
    Failed(CallFailure),
    TimedOut,
}

impl<T> ServiceOutcome<T> {
    /// Short label for logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Transform the success value, leaving failures untouched.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, String>) -> ServiceOutcome<U> {
        match self {
            Self::Success(v) => match f(v) {
                Ok(u) => ServiceOutcome::Success(u),
                Err(reason) => ServiceOutcome::Failed(CallFailure::transport(reason)),
            },
            Self::Failed(e) => ServiceOutcome::Failed(e),
            Self::TimedOut => ServiceOutcome::TimedOut,
        }
    }

    /// Human-readable reason for a non-success outcome.
    pub fn describe(&self, timeout: Duration) -> String {
        match self {
            Self::Success(_) => "ok".to_string(),
            Self::Failed(e) => e.to_string(),
            Self::TimedOut => format!("timed out after {}s", timeout.as_secs_f32()),
        }
    }
}

/// Shared HTTP client for all collaborator traffic. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    http: Client,
}

impl Gateway {
    /// # Errors
    ///
    /// Returns the `reqwest` builder error if TLS initialisation fails.
    pub fn new() -> Result<Self, reqwest::Error> {
        // Per-call deadlines are enforced in `execute`; the client only bounds connects.
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { http })
    }

    /// POST `payload` as JSON and decode a JSON response.
    pub async fn post_json<P, R>(
        &self,
        endpoint: &str,
        payload: &P,
        timeout: Duration,
    ) -> ServiceOutcome<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(endpoint, self.http.post(endpoint).json(payload), timeout)
            .await
            .and_then(|body| decode(&body))
    }

    /// POST `payload` as JSON; any 2xx counts as success and the body is ignored.
    pub async fn post_discard<P>(
        &self,
        endpoint: &str,
        payload: &P,
        timeout: Duration,
    ) -> ServiceOutcome<()>
    where
        P: Serialize + ?Sized,
    {
        self.execute(endpoint, self.http.post(endpoint).json(payload), timeout)
            .await
            .and_then(|_| Ok(()))
    }

    /// GET with query parameters and decode a JSON response.
    pub async fn get_json<R>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> ServiceOutcome<R>
    where
        R: DeserializeOwned,
    {
        self.execute(endpoint, self.http.get(endpoint).query(query), timeout)
            .await
            .and_then(|body| decode(&body))
    }

    /// Send once under `timeout` and return the 2xx body text.
    async fn execute(
        &self,
        endpoint: &str,
        req: RequestBuilder,
        timeout: Duration,
    ) -> ServiceOutcome<String> {
        let started = Instant::now();
        let call = async {
            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => return ServiceOutcome::TimedOut,
                Err(e) => {
                    return ServiceOutcome::Failed(CallFailure::transport(format!(
                        "request failed: {e}"
                    )))
                }
            };

            let status = resp.status();
            if !status.is_success() {
                // Body is context for logs only.
                let body = resp.text().await.unwrap_or_default();
                return ServiceOutcome::Failed(CallFailure {
                    status: Some(status),
                    reason: snippet(&body),
                });
            }

            match resp.text().await {
                Ok(body) => ServiceOutcome::Success(body),
                Err(e) if e.is_timeout() => ServiceOutcome::TimedOut,
                Err(e) => ServiceOutcome::Failed(CallFailure {
                    status: Some(status),
                    reason: format!("reading response body failed: {e}"),
                }),
            }
        };

        let outcome = tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(ServiceOutcome::TimedOut);

        tracing::debug!(
            endpoint,
            outcome = outcome.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway call settled"
        );
        outcome
    }
}

fn decode<R: DeserializeOwned>(body: &str) -> Result<R, String> {
    serde_json::from_str(body).map_err(|e| format!("invalid response body: {e}"))
}

/// First 200 chars of an error body, single line.
fn snippet(body: &str) -> String {
    let flat: String = body
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(200)
        .collect();
    let flat = flat.trim();
    if flat.is_empty() {
        "empty response body".to_string()
    } else {
        flat.to_string()
    }
}
