//! Error taxonomy for the orchestrator.
//!
//! Degraded secondary signals (sentiment, explanation) are not errors and never
//! appear here; they are substituted inside the dispatcher.

use thiserror::Error;

/// Fixed retry hint attached to every local rate-limit rejection.
pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 3600;
/// Retry hint when the provider itself reports an exhausted quota.
pub const PROVIDER_QUOTA_RETRY_AFTER_SECS: u64 = 3600;
/// Retry hint for generic trending upstream failures.
pub const UPSTREAM_RETRY_AFTER_SECS: u64 = 60;
/// Retry hint when the prediction collaborator is unavailable.
pub const ANALYSIS_RETRY_AFTER_SECS: u64 = 30;

/// Errors returned by [`crate::analyze::AnalysisDispatcher::analyze`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Missing, malformed or too-short input. User-correctable.
    #[error("{0}")]
    Validation(String),

    /// URL extraction failed or produced no usable text.
    #[error("could not extract article from URL: {0}")]
    Extraction(String),

    /// The prediction collaborator failed or timed out.
    #[error("prediction service unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Rejections from the trending-feed [`crate::ratelimit::RateLimiter`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("daily request quota of {limit} exhausted")]
    DailyQuotaExceeded { limit: u32 },

    #[error("requests must be at least {min_interval_ms} ms apart")]
    TooFrequent { min_interval_ms: u64 },
}

impl RateLimitError {
    /// Stable snake_case kind used in HTTP bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DailyQuotaExceeded { .. } => "daily_quota_exceeded",
            Self::TooFrequent { .. } => "too_frequent",
        }
    }

    pub fn retry_after_secs(&self) -> u64 {
        RATE_LIMIT_RETRY_AFTER_SECS
    }
}

/// Errors returned by [`crate::trending::TrendingFeedService::fetch_trending`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Local quota or pacing gate refused the call.
    #[error("trending feed rate limited: {0}")]
    RateLimited(#[from] RateLimitError),

    /// Provider answered HTTP 429.
    #[error("news provider quota exhausted")]
    ProviderQuotaExhausted,

    /// Provider answered HTTP 401.
    #[error("news provider rejected the API key")]
    ProviderUnauthorized,

    /// Any other transport failure, non-2xx status, bad body or timeout.
    #[error("news provider unavailable: {0}")]
    Upstream(String),

    /// No provider API key configured.
    #[error("trending feed is not configured: {0}")]
    NotConfigured(String),
}

impl FeedError {
    /// Default retry hint for the caller, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited(e) => Some(e.retry_after_secs()),
            Self::ProviderQuotaExhausted => Some(PROVIDER_QUOTA_RETRY_AFTER_SECS),
            Self::Upstream(_) => Some(UPSTREAM_RETRY_AFTER_SECS),
            Self::ProviderUnauthorized | Self::NotConfigured(_) => None,
        }
    }
}
