// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod persistence;
pub mod ratelimit;
pub mod telemetry;
pub mod trending;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{AnalysisDispatcher, AnalysisRequest, AnalysisResult, Verdict};
pub use crate::api::{router, AppState};
pub use crate::cache::ResultCache;
pub use crate::config::OrchestratorConfig;
pub use crate::error::{AnalysisError, FeedError, RateLimitError};
pub use crate::gateway::{Gateway, ServiceOutcome};
pub use crate::persistence::{AnalysisStore, HttpStore, MemoryStore};
pub use crate::ratelimit::{QuotaStatus, RateLimiter};
pub use crate::trending::{FeedResult, TrendingFeedService};

use axum::Router;

/// Build the full application router: API routes plus `/metrics`.
///
/// Configuration comes from `OrchestratorConfig::load` (TOML file, then env).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = OrchestratorConfig::load()?;
    app_with_config(&cfg)
}

/// Same as [`app`] with an already-loaded configuration.
pub fn app_with_config(cfg: &OrchestratorConfig) -> anyhow::Result<Router> {
    let metrics = crate::metrics::Metrics::init()?;
    let state = AppState::from_config(cfg)?;
    Ok(router(state).merge(metrics.router()))
}
