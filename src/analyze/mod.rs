// src/analyze/mod.rs
//! AnalysisDispatcher: resolve text, fan out to prediction/sentiment/explanation,
//! join every outcome, then apply the criticality policy.
//!
//! Policy:
//! - prediction is load-bearing: failure or timeout fails the request,
//! - sentiment falls back to `{neutral, 0.5}`,
//! - explanation falls back to no keywords.
//!
//! The finished result is handed to the [`AnalysisStore`] on a detached task.

pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use metrics::{counter, histogram};

use crate::config::Endpoints;
use crate::error::AnalysisError;
use crate::gateway::{Gateway, ServiceOutcome};
use crate::persistence::AnalysisStore;
use crate::telemetry::anon_hash;

pub use types::{
    truncate_chars, AnalysisRequest, AnalysisResult, Explanation, Sentiment, Verdict,
    MIN_TEXT_CHARS, STORED_TEXT_CHARS,
};
use types::{
    ExplainResponse, ExtractResponse, PredictResponse, SentimentResponse, TextPayload, UrlPayload,
};

/// Signals surviving the join, before the result is assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedSignals {
    pub prediction: Verdict,
    pub confidence: f64,
    pub sentiment: Sentiment,
    pub explanation: Explanation,
    /// Secondary signals replaced by their fallback values.
    pub degraded: Vec<&'static str>,
}

pub struct AnalysisDispatcher {
    gateway: Gateway,
    endpoints: Endpoints,
    timeout: Duration,
    store: Arc<dyn AnalysisStore>,
}

impl AnalysisDispatcher {
    pub fn new(
        gateway: Gateway,
        endpoints: Endpoints,
        timeout: Duration,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            gateway,
            endpoints,
            timeout,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    /// Analyze one article.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Validation`] for missing, malformed or short input;
    ///   no collaborator is called in that case.
    /// - [`AnalysisError::Extraction`] when a URL could not be turned into text.
    /// - [`AnalysisError::UpstreamUnavailable`] when prediction failed or timed out.
    pub async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let res = self.run(req).await;

        let outcome = match &res {
            Ok(_) => "ok",
            Err(AnalysisError::Validation(_)) => "validation_error",
            Err(AnalysisError::Extraction(_)) => "extraction_error",
            Err(AnalysisError::UpstreamUnavailable(_)) => "upstream_unavailable",
        };
        counter!("analysis_requests_total", "outcome" => outcome).increment(1);
        histogram!("analysis_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        res
    }

    async fn run(&self, req: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let (text, source_url) = self.resolve_text(&req).await?;
        validate_length(&text)?;

        let text_id = anon_hash(&text);
        let payload = TextPayload { text: &text };

        // Join-all-settled: every branch yields its own outcome, none short-circuits.
        let (prediction, sentiment, explanation) = tokio::join!(
            self.gateway
                .post_json::<_, PredictResponse>(&self.endpoints.predict, &payload, self.timeout),
            self.gateway
                .post_json::<_, SentimentResponse>(&self.endpoints.sentiment, &payload, self.timeout),
            self.gateway
                .post_json::<_, ExplainResponse>(&self.endpoints.explain, &payload, self.timeout),
        );
        record_call("prediction", &prediction);
        record_call("sentiment", &sentiment);
        record_call("explanation", &explanation);

        let signals = match join_outcomes(prediction, sentiment, explanation, self.timeout) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(text_id = %text_id, error = %e, "prediction unavailable; failing request");
                return Err(e);
            }
        };
        for signal in &signals.degraded {
            counter!("analysis_degraded_total", "signal" => *signal).increment(1);
        }

        let result = AnalysisResult {
            prediction: signals.prediction,
            confidence: signals.confidence,
            sentiment: signals.sentiment,
            explanation: signals.explanation,
            article_text: truncate_chars(&text, STORED_TEXT_CHARS),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source_url,
        };

        tracing::info!(
            text_id = %text_id,
            prediction = ?result.prediction,
            confidence = result.confidence,
            degraded = ?signals.degraded,
            "analysis complete"
        );

        self.persist(result.clone());
        Ok(result)
    }

    /// Pasted text passes through; a URL goes through the extraction collaborator.
    async fn resolve_text(
        &self,
        req: &AnalysisRequest,
    ) -> Result<(String, Option<String>), AnalysisError> {
        let input = req.article_text.trim();
        if input.is_empty() {
            return Err(AnalysisError::Validation(
                "article text or URL is required".to_string(),
            ));
        }
        if !req.source_is_url {
            return Ok((input.to_string(), None));
        }
        if !is_http_url(input) {
            return Err(AnalysisError::Validation(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let outcome = self
            .gateway
            .post_json::<_, ExtractResponse>(
                &self.endpoints.extract,
                &UrlPayload { url: input },
                self.timeout,
            )
            .await;
        record_call("extraction", &outcome);

        match outcome {
            ServiceOutcome::Success(resp) => {
                let text = resp.text.unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    return Err(AnalysisError::Extraction(
                        "no article text found at the URL; paste the article text directly"
                            .to_string(),
                    ));
                }
                Ok((text, Some(input.to_string())))
            }
            other => {
                let reason = other.describe(self.timeout);
                tracing::warn!(url = input, reason = %reason, "article extraction failed");
                Err(AnalysisError::Extraction(format!(
                    "{reason}; paste the article text directly"
                )))
            }
        }
    }

    fn persist(&self, result: AnalysisResult) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.save(&result).await {
                counter!("persistence_failures_total").increment(1);
                tracing::warn!(store = store.name(), error = ?e, "persisting analysis failed");
            }
        });
    }
}

/// Apply the criticality policy to the three settled outcomes.
///
/// # Errors
///
/// [`AnalysisError::UpstreamUnavailable`] if prediction did not succeed or
/// returned a label other than `real`/`fake`.
pub(crate) fn join_outcomes(
    prediction: ServiceOutcome<PredictResponse>,
    sentiment: ServiceOutcome<SentimentResponse>,
    explanation: ServiceOutcome<ExplainResponse>,
    timeout: Duration,
) -> Result<JoinedSignals, AnalysisError> {
    let prediction = prediction.and_then(|p| {
        Verdict::parse(&p.prediction)
            .map(|v| (v, p.confidence))
            .ok_or_else(|| format!("unexpected prediction label {:?}", p.prediction))
    });
    let (verdict, confidence) = match prediction {
        ServiceOutcome::Success(v) => v,
        other => return Err(AnalysisError::UpstreamUnavailable(other.describe(timeout))),
    };

    let mut degraded = Vec::new();

    let sentiment = match sentiment {
        ServiceOutcome::Success(s) => Sentiment {
            label: s.sentiment.label,
            score: clamp_unit(s.sentiment.score),
        },
        other => {
            tracing::warn!(reason = %other.describe(timeout), "sentiment unavailable; using neutral fallback");
            degraded.push("sentiment");
            Sentiment::neutral()
        }
    };

    let explanation = match explanation {
        ServiceOutcome::Success(e) => {
            Explanation::paired(e.explanation.keywords, e.explanation.importance_scores)
        }
        other => {
            tracing::warn!(reason = %other.describe(timeout), "explanation unavailable; using empty fallback");
            degraded.push("explanation");
            Explanation::default()
        }
    };

    Ok(JoinedSignals {
        prediction: verdict,
        confidence: clamp_unit(confidence),
        sentiment,
        explanation,
        degraded,
    })
}

fn validate_length(text: &str) -> Result<(), AnalysisError> {
    let n = text.chars().count();
    if n < MIN_TEXT_CHARS {
        return Err(AnalysisError::Validation(format!(
            "article text must be at least {MIN_TEXT_CHARS} characters (got {n})"
        )));
    }
    Ok(())
}

fn is_http_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")) && !s.contains(char::is_whitespace)
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

fn record_call<T>(collaborator: &'static str, outcome: &ServiceOutcome<T>) {
    counter!(
        "collaborator_calls_total",
        "collaborator" => collaborator,
        "outcome" => outcome.label()
    )
    .increment(1);
}
