//! Where finished analyses go after the response is built.
//!
//! The document store itself is an external collaborator; this module only
//! knows how to hand a result over. Writes are best-effort: the dispatcher logs
//! failures and moves on.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::analyze::AnalysisResult;
use crate::gateway::{Gateway, ServiceOutcome};

const MAX_CAPACITY: usize = 10_000;

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save(&self, result: &AnalysisResult) -> anyhow::Result<()>;

    /// Up to `n` most recent analyses, oldest first. Stores that cannot read back return nothing.
    async fn recent(&self, _n: usize) -> Vec<AnalysisResult> {
        Vec::new()
    }

    fn name(&self) -> &'static str;
}

/// Bounded in-process history; the oldest entries fall off past `cap`.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Vec<AnalysisResult>>,
    cap: usize,
}

impl MemoryStore {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, MAX_CAPACITY);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn save(&self, result: &AnalysisResult) -> anyhow::Result<()> {
        let mut v = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        v.push(result.clone());
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        Ok(())
    }

    async fn recent(&self, n: usize) -> Vec<AnalysisResult> {
        let v = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// POSTs each result as JSON to an external document-store endpoint.
pub struct HttpStore {
    gateway: Gateway,
    url: String,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(gateway: Gateway, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AnalysisStore for HttpStore {
    async fn save(&self, result: &AnalysisResult) -> anyhow::Result<()> {
        match self
            .gateway
            .post_discard(&self.url, result, self.timeout)
            .await
        {
            ServiceOutcome::Success(_) => Ok(()),
            other => Err(anyhow!(
                "document store write to {} failed: {}",
                self.url,
                other.describe(self.timeout)
            )),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
