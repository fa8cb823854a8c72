use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::analyze::{AnalysisDispatcher, AnalysisRequest, AnalysisResult};
use crate::config::OrchestratorConfig;
use crate::error::{AnalysisError, FeedError, ANALYSIS_RETRY_AFTER_SECS};
use crate::gateway::Gateway;
use crate::persistence::{AnalysisStore, HttpStore, MemoryStore};
use crate::ratelimit::QuotaStatus;
use crate::trending::{FeedResult, TrendingFeedService};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AnalysisDispatcher>,
    pub trending: Arc<TrendingFeedService>,
    pub store: Arc<dyn AnalysisStore>,
}

impl AppState {
    /// Wire the components from a loaded configuration.
    pub fn from_config(cfg: &OrchestratorConfig) -> anyhow::Result<Self> {
        let gateway = Gateway::new()?;
        let collab = &cfg.collaborators;

        let store: Arc<dyn AnalysisStore> = match collab.persist_url.as_deref() {
            Some(url) => Arc::new(HttpStore::new(gateway.clone(), url, collab.timeout())),
            None => Arc::new(MemoryStore::with_capacity(collab.history_capacity)),
        };
        tracing::info!(store = store.name(), "analysis store selected");
        if cfg.trending.api_key.is_none() {
            tracing::warn!("GNEWS_API_KEY not set; /api/trending will answer not_configured");
        }

        let dispatcher = AnalysisDispatcher::new(
            gateway.clone(),
            collab.endpoints(),
            collab.timeout(),
            Arc::clone(&store),
        );
        let trending = TrendingFeedService::new(gateway, cfg.trending.clone());

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            trending: Arc::new(trending),
            store,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/trending", get(trending))
        .route("/api/trending/quota", get(trending_quota))
        .route("/api/history", get(history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- errors ----

/// Error body: `{"error":{"code","message","retryAfter"?,"kind"?}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
                retry_after: None,
                kind: None,
            },
        }
    }

    fn retry_after(mut self, secs: Option<u64>) -> Self {
        self.body.retry_after = secs;
        self
    }

    fn kind(mut self, kind: &'static str) -> Self {
        self.body.kind = Some(kind);
        self
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        let message = e.to_string();
        match e {
            AnalysisError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
            }
            AnalysisError::Extraction(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "extraction_error", message)
            }
            AnalysisError::UpstreamUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
                    .retry_after(Some(ANALYSIS_RETRY_AFTER_SECS))
            }
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        let message = e.to_string();
        let retry = e.retry_after_secs();
        let err = match &e {
            FeedError::RateLimited(rl) => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message).kind(rl.kind())
            }
            FeedError::ProviderQuotaExhausted => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "provider_quota_exceeded", message)
            }
            FeedError::ProviderUnauthorized => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_unauthorized", message)
            }
            FeedError::Upstream(_) => Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message),
            FeedError::NotConfigured(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "not_configured", message)
            }
        };
        err.retry_after(retry)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (
            self.status,
            Json(ErrorEnvelope { error: &self.body }),
        )
            .into_response();
        if let Some(secs) = self.body.retry_after {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        resp
    }
}

// ---- handlers ----

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(req) = body.map_err(|rej| {
        ApiError::new(StatusCode::BAD_REQUEST, "validation_error", rej.body_text())
    })?;
    let result = state.dispatcher.analyze(req).await?;
    Ok(Json(result))
}

async fn trending(State(state): State<AppState>) -> Result<Response, ApiError> {
    let feed: FeedResult = state.trending.fetch_trending().await?;
    let cache = if feed.cached { "HIT" } else { "MISS" };
    let mut resp = Json(feed).into_response();
    resp.headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(cache));
    Ok(resp)
}

async fn trending_quota(State(state): State<AppState>) -> Json<QuotaStatus> {
    Json(state.trending.quota_status())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<AnalysisResult>> {
    let n = q
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    Json(state.store.recent(n).await)
}
