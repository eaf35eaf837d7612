//! PaperForge Ingestion Service
//!
//! Drives the chunk → extract → resolve → persist pipeline for queued ingest
//! jobs. Job submission itself is out of this service's scope — callers
//! create rows via `Repository::create_job` and hand papers to
//! `IngestPipeline::run` directly or through an external scheduler.

use paperforge_common::db::DbPool;
use paperforge_common::embeddings::create_embedder;
use paperforge_common::llm::{LlmProvider, LlmService, OpenAiProvider};
use paperforge_common::{config::AppConfig, VERSION};
use paperforge_ingestion::pipeline::IngestPipeline;
use paperforge_ingestion::registry::JobRegistry;
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting PaperForge Ingestion Service v{}", VERSION);

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    paperforge_common::metrics::register_metrics();

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Arc::new(paperforge_common::db::Repository::new(db));

    let interrupted = repo.mark_running_jobs_interrupted().await?;
    if interrupted > 0 {
        info!(count = interrupted, "marked jobs interrupted by a prior crash");
    }

    let embedder = create_embedder(
        &config.embedding.provider,
        config.embedding.api_key.clone(),
        Some(config.embedding.model.clone()),
        config.embedding.api_base.clone(),
    );

    let llm_api_key = LlmService::resolve_api_key(
        config.llm.user_api_key.as_deref(),
        config.llm.api_key.as_deref(),
        None,
    )
    .map(str::to_string);

    let mut providers: Vec<(Arc<dyn LlmProvider>, u32)> = Vec::new();
    if let Some(api_key) = llm_api_key {
        for name in &config.llm.providers {
            let provider = OpenAiProvider::new(
                name.clone(),
                api_key.clone(),
                config.llm.model.clone(),
                config.llm.api_base.clone(),
            );
            providers.push((Arc::new(provider), config.llm.requests_per_minute));
        }
    } else {
        tracing::warn!("no LLM API key configured, extraction and resolution fall back to the rule-based provider");
    }

    let llm_service = Arc::new(LlmService::new(providers, config.llm.max_retries, config.llm.backoff_cap_secs));
    let registry = JobRegistry::spawn(repo.clone());

    let _pipeline = IngestPipeline::new(repo, embedder, llm_service, registry, config);

    info!("Ingestion service ready");

    tokio::signal::ctrl_c().await?;

    info!("Ingestion service shutting down");
    Ok(())
}
