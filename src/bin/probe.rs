//! One-off smoke test of the configured collaborators.
//!
//! Runs a single analysis against the ML service and, if a key is configured,
//! one trending fetch. Prints the outcome and exits; never panics on failure.

use std::process::ExitCode;
use std::sync::Arc;

use fake_news_orchestrator::{
    telemetry, AnalysisDispatcher, AnalysisRequest, Gateway, MemoryStore, OrchestratorConfig,
    TrendingFeedService,
};

const SAMPLE: &str = "Officials confirmed on Tuesday that the city council approved the new \
    transit budget after a lengthy public hearing, according to local reports.";

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => {
            println!("probe done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("probe failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = OrchestratorConfig::load()?;
    let gateway = Gateway::new()?;

    let dispatcher = AnalysisDispatcher::new(
        gateway.clone(),
        cfg.collaborators.endpoints(),
        cfg.collaborators.timeout(),
        Arc::new(MemoryStore::with_capacity(1)),
    );
    match dispatcher.analyze(AnalysisRequest::text(SAMPLE)).await {
        Ok(r) => println!(
            "analysis => {:?} ({:.2}), sentiment {} {:.2}, {} keywords",
            r.prediction,
            r.confidence,
            r.sentiment.label,
            r.sentiment.score,
            r.explanation.keywords.len()
        ),
        Err(e) => println!("analysis => error: {e}"),
    }

    if cfg.trending.api_key.is_none() {
        println!("trending => skipped (no GNEWS_API_KEY)");
        return Ok(());
    }
    let trending = TrendingFeedService::new(gateway, cfg.trending.clone());
    match trending.fetch_trending().await {
        Ok(feed) => println!(
            "trending => {} articles, {} requests left today",
            feed.articles.len(),
            feed.remaining_requests
        ),
        Err(e) => println!("trending => error: {e}"),
    }
    Ok(())
}
