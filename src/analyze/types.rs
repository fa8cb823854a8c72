// src/analyze/types.rs
//! Request/result shapes for the analysis endpoint, plus the collaborator wire formats.

use serde::{Deserialize, Serialize};

/// Minimum resolved text length (Unicode scalar values) accepted for analysis.
pub const MIN_TEXT_CHARS: usize = 50;
/// Stored article text is capped at this many characters.
pub const STORED_TEXT_CHARS: usize = 2000;

/// Client input: either pasted article text or a URL to extract it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(alias = "text", default)]
    pub article_text: String,
    #[serde(default)]
    pub source_is_url: bool,
}

impl AnalysisRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            article_text: text.into(),
            source_is_url: false,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            article_text: url.into(),
            source_is_url: true,
        }
    }
}

/// Verdict of the prediction collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Real,
    Fake,
}

impl Verdict {
    /// Case-insensitive parse of the collaborator's label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "real" => Some(Self::Real),
            "fake" => Some(Self::Fake),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

impl Sentiment {
    /// Substituted when the sentiment collaborator fails or times out.
    pub fn neutral() -> Self {
        Self {
            label: "neutral".to_string(),
            score: 0.5,
        }
    }
}

/// Keyword attribution; `keywords` and `importance_scores` always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub keywords: Vec<String>,
    pub importance_scores: Vec<f64>,
}

impl Explanation {
    /// Pairs up keywords and scores, dropping any unpaired tail.
    pub fn paired(mut keywords: Vec<String>, mut importance_scores: Vec<f64>) -> Self {
        let n = keywords.len().min(importance_scores.len());
        keywords.truncate(n);
        importance_scores.truncate(n);
        Self {
            keywords,
            importance_scores,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Assembled verdict returned to the client and handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub prediction: Verdict,
    pub confidence: f64,
    pub sentiment: Sentiment,
    pub explanation: Explanation,
    /// First 2000 characters of the analyzed text.
    pub article_text: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

// ---- collaborator wire formats ----

#[derive(Debug, Serialize)]
pub(crate) struct TextPayload<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UrlPayload<'a> {
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractResponse {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PredictResponse {
    pub prediction: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SentimentResponse {
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExplainResponse {
    pub explanation: ExplainBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExplainBody {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub importance_scores: Vec<f64>,
}

/// First `max` characters of `s` (char boundary safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
