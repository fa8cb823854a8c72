// src/config/orchestrator.rs
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::cache::DEFAULT_TTL_SECS;
use crate::gateway::{ANALYSIS_TIMEOUT, TRENDING_TIMEOUT};
use crate::ratelimit::DEFAULT_DAILY_LIMIT;

pub const DEFAULT_CONFIG_PATH: &str = "config/orchestrator.toml";
pub const ENV_CONFIG_PATH: &str = "ORCHESTRATOR_CONFIG_PATH";

const DEFAULT_ML_API_URL: &str = "http://localhost:5000";
const DEFAULT_TRENDING_URL: &str = "https://gnews.io/api/v4/top-headlines";
const MAX_HISTORY_CAPACITY: usize = 10_000;

fn default_ml_api_url() -> String {
    DEFAULT_ML_API_URL.to_string()
}
fn default_history_capacity() -> usize {
    200
}
fn default_analysis_timeout_secs() -> u64 {
    ANALYSIS_TIMEOUT.as_secs()
}

/// Endpoints of the ML collaborators and the optional document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollaboratorConfig {
    #[serde(default = "default_ml_api_url")]
    pub ml_api_url: String,
    /// Per-endpoint overrides; derived from `ml_api_url` when absent.
    #[serde(default)]
    pub predict_url: Option<String>,
    #[serde(default)]
    pub sentiment_url: Option<String>,
    #[serde(default)]
    pub explain_url: Option<String>,
    #[serde(default)]
    pub extract_url: Option<String>,
    /// Document-store write endpoint. Unset keeps analyses in memory.
    #[serde(default)]
    pub persist_url: Option<String>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            ml_api_url: default_ml_api_url(),
            predict_url: None,
            sentiment_url: None,
            explain_url: None,
            extract_url: None,
            persist_url: None,
            history_capacity: default_history_capacity(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

/// Resolved collaborator URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub predict: String,
    pub sentiment: String,
    pub explain: String,
    pub extract: String,
}

impl CollaboratorConfig {
    pub fn endpoints(&self) -> Endpoints {
        let base = self.ml_api_url.trim_end_matches('/');
        let pick = |over: &Option<String>, path: &str| {
            over.clone().unwrap_or_else(|| format!("{base}{path}"))
        };
        Endpoints {
            predict: pick(&self.predict_url, "/predict"),
            sentiment: pick(&self.sentiment_url, "/sentiment"),
            explain: pick(&self.explain_url, "/explain"),
            extract: pick(&self.extract_url, "/extract-article"),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_trending_url() -> String {
    DEFAULT_TRENDING_URL.to_string()
}
fn default_lang() -> String {
    "en".to_string()
}
fn default_country() -> String {
    "us".to_string()
}
fn default_category() -> String {
    "general".to_string()
}
fn default_max_articles() -> u32 {
    10
}
fn default_daily_limit() -> u32 {
    DEFAULT_DAILY_LIMIT
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}
fn default_trending_timeout_secs() -> u64 {
    TRENDING_TIMEOUT.as_secs()
}

/// Trending-news provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendingConfig {
    /// "ENV" means: read from GNEWS_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_trending_url")]
    pub url: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_max_articles")]
    pub max_articles: u32,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_trending_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: default_trending_url(),
            lang: default_lang(),
            country: default_country(),
            category: default_category(),
            max_articles: default_max_articles(),
            daily_limit: default_daily_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
            timeout_secs: default_trending_timeout_secs(),
        }
    }
}

impl TrendingConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub trending: TrendingConfig,
}

impl OrchestratorConfig {
    /// Defaults, then the optional TOML file, then environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", path.display());
                }
                Self::load_from_file(&path)?
            }
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env()?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading orchestrator config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: OrchestratorConfig = toml::from_str(s).context("parsing orchestrator config")?;

        // "ENV" defers to GNEWS_API_KEY; unset leaves trending unconfigured (503 at request time).
        if cfg
            .trending
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("env"))
        {
            cfg.trending.api_key = env_str("GNEWS_API_KEY");
            if cfg.trending.api_key.is_none() {
                tracing::warn!("trending api_key is \"ENV\" but GNEWS_API_KEY is not set");
            }
        }

        cfg.sanitize();
        Ok(cfg)
    }

    /// Environment variables override whatever the file said.
    fn apply_env(&mut self) -> anyhow::Result<()> {
        let c = &mut self.collaborators;
        if let Some(v) = env_str("ML_API_URL") {
            c.ml_api_url = v;
        }
        override_opt(&mut c.predict_url, "PREDICT_URL");
        override_opt(&mut c.sentiment_url, "SENTIMENT_URL");
        override_opt(&mut c.explain_url, "EXPLAIN_URL");
        override_opt(&mut c.extract_url, "EXTRACT_URL");
        override_opt(&mut c.persist_url, "PERSIST_URL");
        override_num(&mut c.history_capacity, "HISTORY_CAPACITY")?;
        override_num(&mut c.timeout_secs, "ANALYSIS_TIMEOUT_SECS")?;

        let t = &mut self.trending;
        override_opt(&mut t.api_key, "GNEWS_API_KEY");
        if let Some(v) = env_str("TRENDING_URL") {
            t.url = v;
        }
        if let Some(v) = env_str("TRENDING_LANG") {
            t.lang = v;
        }
        if let Some(v) = env_str("TRENDING_COUNTRY") {
            t.country = v;
        }
        if let Some(v) = env_str("TRENDING_CATEGORY") {
            t.category = v;
        }
        override_num(&mut t.max_articles, "TRENDING_MAX")?;
        override_num(&mut t.daily_limit, "TRENDING_DAILY_LIMIT")?;
        override_num(&mut t.cache_ttl_secs, "TRENDING_CACHE_TTL_SECS")?;
        override_num(&mut t.timeout_secs, "TRENDING_TIMEOUT_SECS")?;
        Ok(())
    }

    fn sanitize(&mut self) {
        let c = &mut self.collaborators;
        c.history_capacity = c.history_capacity.clamp(1, MAX_HISTORY_CAPACITY);
        if c.timeout_secs == 0 {
            c.timeout_secs = default_analysis_timeout_secs();
        }

        let t = &mut self.trending;
        t.max_articles = t.max_articles.clamp(1, 100);
        if t.timeout_secs == 0 {
            t.timeout_secs = default_trending_timeout_secs();
        }
        // An empty key is the same as no key.
        if t.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            t.api_key = None;
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_opt(slot: &mut Option<String>, key: &str) {
    if let Some(v) = env_str(key) {
        *slot = Some(v);
    }
}

fn override_num<T>(slot: &mut T, key: &str) -> anyhow::Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env_str(key) {
        *slot = raw
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}"))?;
    }
    Ok(())
}
