// tests/dispatcher.rs
//
// AnalysisDispatcher against a mocked ML service.
//
// Covered:
// - all collaborators succeed (full result, truncated text)
// - explanation timeout / sentiment failure / both secondaries down -> fallbacks
// - prediction failure or timeout -> UpstreamUnavailable
// - short text -> Validation, no outbound calls
// - URL extraction: success, collaborator failure, empty text
// - persistence: exactly one save per success; store failure does not leak

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fake_news_orchestrator::analyze::{Explanation, Sentiment};
use fake_news_orchestrator::config::Endpoints;
use fake_news_orchestrator::{
    AnalysisDispatcher, AnalysisError, AnalysisRequest, AnalysisResult, AnalysisStore, Gateway,
    MemoryStore, Verdict,
};

const TIMEOUT: Duration = Duration::from_millis(800);

fn endpoints(server: &MockServer) -> Endpoints {
    let base = server.uri();
    Endpoints {
        predict: format!("{base}/predict"),
        sentiment: format!("{base}/sentiment"),
        explain: format!("{base}/explain"),
        extract: format!("{base}/extract-article"),
    }
}

fn dispatcher_with(server: &MockServer, store: Arc<dyn AnalysisStore>) -> AnalysisDispatcher {
    AnalysisDispatcher::new(
        Gateway::new().expect("gateway"),
        endpoints(server),
        TIMEOUT,
        store,
    )
}

fn dispatcher(server: &MockServer) -> AnalysisDispatcher {
    dispatcher_with(server, Arc::new(MemoryStore::with_capacity(10)))
}

fn long_article() -> String {
    "The central bank kept its benchmark rate unchanged on Wednesday, citing steady \
     employment figures and easing inflation. "
        .repeat(25)
}

fn keywords() -> Vec<&'static str> {
    vec![
        "central bank",
        "rate",
        "unchanged",
        "employment",
        "inflation",
        "figures",
        "steady",
        "benchmark",
    ]
}

async fn mount_predict(server: &MockServer, tmpl: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(tmpl)
        .mount(server)
        .await;
}

async fn mount_sentiment(server: &MockServer, tmpl: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/sentiment"))
        .respond_with(tmpl)
        .mount(server)
        .await;
}

async fn mount_explain(server: &MockServer, tmpl: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/explain"))
        .respond_with(tmpl)
        .mount(server)
        .await;
}

fn predict_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "prediction": "real",
        "confidence": 0.87,
        "sentiment": "neutral",
        "timestamp": "2025-03-14T09:00:00"
    }))
}

fn sentiment_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "sentiment": {"label": "positive", "score": 0.6, "polarity": 0.2, "subjectivity": 0.4}
    }))
}

fn explain_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "explanation": {
            "keywords": keywords(),
            "importance_scores": [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2],
            "method": "keyword_based",
            "note": "demo"
        }
    }))
}

async fn mount_all_ok(server: &MockServer) {
    mount_predict(server, predict_ok()).await;
    mount_sentiment(server, sentiment_ok()).await;
    mount_explain(server, explain_ok()).await;
}

#[tokio::test]
async fn all_collaborators_succeed() {
    let server = MockServer::start().await;
    mount_all_ok(&server).await;

    let text = long_article();
    assert!(text.chars().count() > 2000);

    let r = dispatcher(&server)
        .analyze(AnalysisRequest::text(text.clone()))
        .await
        .expect("analysis succeeds");

    assert_eq!(r.prediction, Verdict::Real);
    assert_eq!(r.confidence, 0.87);
    assert_eq!(
        r.sentiment,
        Sentiment {
            label: "positive".into(),
            score: 0.6
        }
    );
    assert_eq!(r.explanation.keywords, keywords());
    assert_eq!(r.explanation.importance_scores.len(), 8);
    assert_eq!(r.article_text.chars().count(), 2000);
    assert!(text.starts_with(&r.article_text));
    assert!(r.timestamp.ends_with('Z'));
    assert_eq!(r.source_url, None);
}

#[tokio::test]
async fn explanation_timeout_yields_empty_explanation() {
    let server = MockServer::start().await;
    mount_predict(&server, predict_ok()).await;
    mount_sentiment(&server, sentiment_ok()).await;
    mount_explain(&server, explain_ok().set_delay(Duration::from_secs(3))).await;

    let started = std::time::Instant::now();
    let r = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(r.prediction, Verdict::Real);
    assert_eq!(r.confidence, 0.87);
    assert_eq!(r.sentiment.label, "positive");
    assert_eq!(r.explanation, Explanation::default());
}

#[tokio::test]
async fn collaborators_are_called_concurrently() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(400);
    mount_predict(&server, predict_ok().set_delay(delay)).await;
    mount_sentiment(&server, sentiment_ok().set_delay(delay)).await;
    mount_explain(&server, explain_ok().set_delay(delay)).await;

    let started = std::time::Instant::now();
    let r = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");
    let elapsed = started.elapsed();

    // Sequential calls would need at least 1.2 s.
    assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
    assert_eq!(r.sentiment.label, "positive");
    assert_eq!(r.explanation.keywords.len(), 8);
}

#[tokio::test]
async fn sentiment_failure_falls_back_to_neutral() {
    let server = MockServer::start().await;
    mount_predict(&server, predict_ok()).await;
    mount_sentiment(&server, ResponseTemplate::new(500)).await;
    mount_explain(&server, explain_ok()).await;

    let r = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");

    assert_eq!(r.sentiment, Sentiment::neutral());
    assert_eq!(r.explanation.keywords.len(), 8);
}

#[tokio::test]
async fn both_secondaries_down_still_succeeds() {
    let server = MockServer::start().await;
    mount_predict(&server, predict_ok()).await;
    mount_sentiment(&server, ResponseTemplate::new(503)).await;
    mount_explain(&server, ResponseTemplate::new(200).set_body_string("garbage")).await;

    let r = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");

    assert_eq!(r.sentiment, Sentiment::neutral());
    assert!(r.explanation.is_empty());
    assert!(r.explanation.importance_scores.is_empty());
}

#[tokio::test]
async fn prediction_failure_fails_the_request() {
    let server = MockServer::start().await;
    mount_predict(&server, ResponseTemplate::new(500)).await;
    mount_sentiment(&server, sentiment_ok()).await;
    mount_explain(&server, explain_ok()).await;

    let err = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::UpstreamUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn prediction_timeout_fails_the_request() {
    let server = MockServer::start().await;
    mount_predict(&server, predict_ok().set_delay(Duration::from_secs(3))).await;
    mount_sentiment(&server, sentiment_ok()).await;
    mount_explain(&server, explain_ok()).await;

    let err = dispatcher(&server)
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .unwrap_err();
    match err {
        AnalysisError::UpstreamUnavailable(msg) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn short_text_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(predict_ok())
        .expect(0)
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let err = d
        .analyze(AnalysisRequest::text("Too short to judge."))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Validation(_)));

    // 49 chars after trimming is still too short.
    let padded = format!("   {}   ", "x".repeat(49));
    let err = d.analyze(AnalysisRequest::text(padded)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Validation(_)));

    let err = d.analyze(AnalysisRequest::text("   ")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Validation(_)));
}

#[tokio::test]
async fn url_input_is_extracted_then_analyzed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-article"))
        .and(body_json(json!({"url": "https://news.example/story"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": long_article(),
            "title": "Rates unchanged",
            "authors": ["Staff"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_all_ok(&server).await;

    let r = dispatcher(&server)
        .analyze(AnalysisRequest::url("https://news.example/story"))
        .await
        .expect("analysis succeeds");

    assert_eq!(r.prediction, Verdict::Real);
    assert_eq!(r.source_url.as_deref(), Some("https://news.example/story"));
    assert!(r.article_text.starts_with("The central bank"));
}

#[tokio::test]
async fn extraction_failure_is_an_extraction_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-article"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "fetch failed"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(predict_ok())
        .expect(0)
        .mount(&server)
        .await;

    let err = dispatcher(&server)
        .analyze(AnalysisRequest::url("https://news.example/gone"))
        .await
        .unwrap_err();
    match err {
        AnalysisError::Extraction(msg) => assert!(msg.contains("paste the article text")),
        other => panic!("expected Extraction, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_extraction_is_an_extraction_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-article"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  ", "title": ""})))
        .mount(&server)
        .await;

    let err = dispatcher(&server)
        .analyze(AnalysisRequest::url("https://news.example/paywall"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Extraction(_)));
}

#[tokio::test]
async fn malformed_url_is_a_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = dispatcher(&server)
        .analyze(AnalysisRequest::url("news.example/story"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Validation(_)));
}

// ---- persistence hand-off ----

struct ChannelStore(mpsc::UnboundedSender<AnalysisResult>);

#[async_trait]
impl AnalysisStore for ChannelStore {
    async fn save(&self, result: &AnalysisResult) -> anyhow::Result<()> {
        self.0
            .send(result.clone())
            .map_err(|_| anyhow::anyhow!("receiver gone"))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

struct FailingStore;

#[async_trait]
impl AnalysisStore for FailingStore {
    async fn save(&self, _result: &AnalysisResult) -> anyhow::Result<()> {
        anyhow::bail!("document store offline")
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn successful_analysis_is_persisted_once() {
    let server = MockServer::start().await;
    mount_all_ok(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let d = dispatcher_with(&server, Arc::new(ChannelStore(tx)));

    let r = d
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");

    let saved = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("save within 2s")
        .expect("one result");
    assert_eq!(saved, r);

    drop(d);
    // The dispatcher's store was the only sender; nothing else arrives.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn failed_analysis_is_not_persisted() {
    let server = MockServer::start().await;
    mount_predict(&server, ResponseTemplate::new(500)).await;
    mount_sentiment(&server, sentiment_ok()).await;
    mount_explain(&server, explain_ok()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let d = dispatcher_with(&server, Arc::new(ChannelStore(tx)));
    assert!(d.analyze(AnalysisRequest::text(long_article())).await.is_err());

    drop(d);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn store_failure_does_not_affect_the_response() {
    let server = MockServer::start().await;
    mount_all_ok(&server).await;

    let r = dispatcher_with(&server, Arc::new(FailingStore))
        .analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis still succeeds");
    assert_eq!(r.prediction, Verdict::Real);
}

#[tokio::test]
async fn memory_store_sees_the_result() {
    let server = MockServer::start().await;
    mount_all_ok(&server).await;

    let store = Arc::new(MemoryStore::with_capacity(5));
    let d = dispatcher_with(&server, store.clone());
    d.analyze(AnalysisRequest::text(long_article()))
        .await
        .expect("analysis succeeds");

    // The write is detached; give it a moment.
    for _ in 0..50 {
        if !store.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.recent(10).await.len(), 1);
}
