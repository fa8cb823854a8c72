//! Fake-news orchestrator: binary entrypoint.
//! Loads configuration, installs tracing and metrics, and serves the Axum router on Shuttle.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Shuttle may already own the global subscriber; this is then a no-op.
    fake_news_orchestrator::telemetry::init_tracing();

    // anyhow errors convert into shuttle's custom error variant.
    let router = fake_news_orchestrator::app().await?;

    tracing::info!("fake-news orchestrator ready");
    Ok(router.into())
}
