// src/trending.rs
//! TrendingFeedService: cached, quota-guarded proxy for the news provider.
//!
//! Order on every fetch: cache, key check, local rate limiter, provider.
//! Cache hits never touch the limiter; a refused or failed provider call
//! never touches the cache.

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::cache::ResultCache;
use crate::config::TrendingConfig;
use crate::error::FeedError;
use crate::gateway::{Gateway, ServiceOutcome};
use crate::ratelimit::{QuotaStatus, RateLimiter};

/// Article descriptions are capped at this many characters.
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// One normalized headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// What `/api/trending` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResult {
    pub articles: Vec<TrendingArticle>,
    pub total_results: u64,
    /// When the provider was fetched, ISO-8601 UTC. Unchanged on cache hits.
    pub timestamp: String,
    /// Provider calls left today, computed at response time.
    pub remaining_requests: u32,
    pub cached: bool,
}

// ---- provider wire format ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderResponse {
    #[serde(default)]
    total_articles: Option<u64>,
    #[serde(default)]
    articles: Vec<ProviderArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<ProviderSource>,
}

#[derive(Debug, Deserialize)]
struct ProviderSource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct TrendingFeedService {
    gateway: Gateway,
    config: TrendingConfig,
    limiter: RateLimiter,
    cache: ResultCache<FeedResult>,
    // Serializes cache misses so concurrent callers share one provider call.
    fetch_lock: tokio::sync::Mutex<()>,
}

impl TrendingFeedService {
    pub fn new(gateway: Gateway, config: TrendingConfig) -> Self {
        Self::new_at(gateway, config, Utc::now())
    }

    pub fn new_at(gateway: Gateway, config: TrendingConfig, now: DateTime<Utc>) -> Self {
        let limiter = RateLimiter::new_at(config.daily_limit, now);
        gauge!("trending_cache_ttl_secs").set(config.cache_ttl_secs as f64);
        gauge!("trending_quota_remaining").set(f64::from(config.daily_limit));
        Self {
            gateway,
            config,
            limiter,
            cache: ResultCache::new(),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrendingConfig {
        &self.config
    }

    /// Fetch on the wall clock. The clock is read again after waiting on the
    /// fetch lock, so pacing sees the moment of consumption.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_trending_at`].
    pub async fn fetch_trending(&self) -> Result<FeedResult, FeedError> {
        self.fetch_with_clock(Utc::now).await
    }

    /// # Errors
    ///
    /// - [`FeedError::NotConfigured`] without an API key (only on a cache miss).
    /// - [`FeedError::RateLimited`] when the local daily quota or pacing gate refuses.
    /// - [`FeedError::ProviderQuotaExhausted`] / [`FeedError::ProviderUnauthorized`]
    ///   for provider 429 / 401.
    /// - [`FeedError::Upstream`] for anything else, timeouts included.
    pub async fn fetch_trending_at(&self, now: DateTime<Utc>) -> Result<FeedResult, FeedError> {
        self.fetch_with_clock(|| now).await
    }

    async fn fetch_with_clock<C>(&self, clock: C) -> Result<FeedResult, FeedError>
    where
        C: Fn() -> DateTime<Utc>,
    {
        if let Some(hit) = self.cached_at(clock()) {
            return Ok(hit);
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| FeedError::NotConfigured("GNEWS_API_KEY is not set".to_string()))?;

        let _guard = self.fetch_lock.lock().await;
        let now = clock();
        // Another caller may have refilled the cache while we waited.
        if let Some(hit) = self.cached_at(now) {
            return Ok(hit);
        }
        counter!("trending_cache_misses_total").increment(1);

        if let Err(e) = self.limiter.check_and_consume_at(now) {
            counter!("trending_rate_limited_total", "kind" => e.kind()).increment(1);
            tracing::warn!(kind = e.kind(), error = %e, "trending fetch refused by local rate limiter");
            return Err(e.into());
        }
        let quota = self.limiter.status_at(now);
        gauge!("trending_quota_remaining").set(f64::from(quota.remaining));

        let max = self.config.max_articles.to_string();
        let query = [
            ("apikey", api_key),
            ("lang", self.config.lang.as_str()),
            ("country", self.config.country.as_str()),
            ("max", max.as_str()),
            ("category", self.config.category.as_str()),
        ];
        let outcome = self
            .gateway
            .get_json::<ProviderResponse>(&self.config.url, &query, self.config.timeout())
            .await;
        counter!(
            "collaborator_calls_total",
            "collaborator" => "trending",
            "outcome" => outcome.label()
        )
        .increment(1);

        let resp = match outcome {
            ServiceOutcome::Success(resp) => resp,
            ServiceOutcome::Failed(f) if f.status == Some(StatusCode::TOO_MANY_REQUESTS) => {
                tracing::warn!("news provider reported quota exhaustion");
                return Err(FeedError::ProviderQuotaExhausted);
            }
            ServiceOutcome::Failed(f) if f.status == Some(StatusCode::UNAUTHORIZED) => {
                tracing::error!("news provider rejected the API key");
                return Err(FeedError::ProviderUnauthorized);
            }
            other => {
                let reason = other.describe(self.config.timeout());
                tracing::warn!(reason = %reason, "trending fetch failed");
                return Err(FeedError::Upstream(reason));
            }
        };

        let articles = normalize_articles(resp.articles);
        let feed = FeedResult {
            total_results: resp.total_articles.unwrap_or(articles.len() as u64),
            articles,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            remaining_requests: quota.remaining,
            cached: false,
        };
        self.cache.set_at(feed.clone(), self.config.cache_ttl(), now);

        tracing::info!(
            articles = feed.articles.len(),
            remaining = quota.remaining,
            "trending feed refreshed"
        );
        Ok(feed)
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.limiter.status()
    }

    pub fn quota_status_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        self.limiter.status_at(now)
    }

    fn cached_at(&self, now: DateTime<Utc>) -> Option<FeedResult> {
        let mut hit = self.cache.get_at(now)?;
        counter!("trending_cache_hits_total").increment(1);
        hit.cached = true;
        // Hits leave the limiter untouched, pending rollover included.
        hit.remaining_requests = self.limiter.snapshot_at(now).remaining;
        tracing::debug!(
            ttl_left_secs = self.cache.ttl_remaining_at(now).map(|d| d.num_seconds()),
            "trending served from cache"
        );
        Some(hit)
    }
}

/// Drop articles without a title or URL and clean up the text fields.
fn normalize_articles(raw: Vec<ProviderArticle>) -> Vec<TrendingArticle> {
    raw.into_iter()
        .filter_map(|a| {
            let title = normalize_text(a.title.as_deref().unwrap_or_default(), DESCRIPTION_MAX_CHARS);
            let url = a.url.map(|u| u.trim().to_string()).unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            let (source_name, source_url) = match a.source {
                Some(s) => (s.name.unwrap_or_default(), s.url),
                None => (String::new(), None),
            };
            Some(TrendingArticle {
                title,
                description: normalize_text(
                    a.description.as_deref().unwrap_or_default(),
                    DESCRIPTION_MAX_CHARS,
                ),
                url,
                image: a.image.filter(|s| !s.trim().is_empty()),
                published_at: a.published_at,
                source_name: source_name.trim().to_string(),
                source_url,
            })
        })
        .collect()
}

/// Decode entities, strip tags, collapse whitespace, cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    let decoded = html_escape::decode_html_entities(s);
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    let stripped = re_tags.replace_all(&decoded, " ");
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    let collapsed = re_ws.replace_all(&stripped, " ");

    collapsed.trim().chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_markup_and_entities() {
        let s = normalize_text("  <b>Rates</b> &amp; markets\n\n <i>rally</i> ", 500);
        assert_eq!(s, "Rates & markets rally");
    }

    #[test]
    fn normalize_caps_length_in_chars() {
        let s = normalize_text(&"é".repeat(800), DESCRIPTION_MAX_CHARS);
        assert_eq!(s.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn articles_without_title_or_url_are_dropped() {
        let raw: ProviderResponse = serde_json::from_str(
            r#"{
                "totalArticles": 54,
                "articles": [
                    {"title": "Kept", "description": "d", "url": "https://n.test/1",
                     "publishedAt": "2025-03-14T08:00:00Z",
                     "source": {"name": " Wire ", "url": "https://n.test"}},
                    {"title": "", "url": "https://n.test/2"},
                    {"title": "No url"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(raw.total_articles, Some(54));
        let out = normalize_articles(raw.articles);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "Wire");
        assert_eq!(out[0].published_at.as_deref(), Some("2025-03-14T08:00:00Z"));
    }

    #[test]
    fn feed_serializes_camel_case() {
        let feed = FeedResult {
            articles: vec![],
            total_results: 0,
            timestamp: "2025-03-14T09:00:00.000Z".into(),
            remaining_requests: 99,
            cached: true,
        };
        let v = serde_json::to_value(&feed).unwrap();
        assert_eq!(v["remainingRequests"], 99);
        assert_eq!(v["totalResults"], 0);
        assert_eq!(v["cached"], true);
    }
}
