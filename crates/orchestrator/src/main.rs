//! PaperForge Agent Orchestrator
//!
//! Hosts the six-stage query pipeline (intent, concept-extraction,
//! task-planning, query-execution, reasoning, response) over the knowledge
//! graph. No HTTP or gRPC surface of its own: in this workspace the
//! `Orchestrator` is a library entry point, not a networked service.

use paperforge_common::db::DbPool;
use paperforge_common::embeddings::create_embedder;
use paperforge_common::llm::{LlmProvider, LlmService, OpenAiProvider};
use paperforge_common::{config::AppConfig, VERSION};
use paperforge_graph::{GraphStore, RetrievalEngine};
use paperforge_orchestrator::Orchestrator;
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

    info!("Starting PaperForge Agent Orchestrator v{}", VERSION);

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    paperforge_common::metrics::register_metrics();

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Arc::new(paperforge_common::db::Repository::new(db));

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
        tracing::warn!("no LLM API key configured, intent/reasoning/response stages will fall back to heuristics and mock answers");
    }

    let llm_service = Arc::new(LlmService::new(providers, config.llm.max_retries, config.llm.backoff_cap_secs));

    let store = Arc::new(GraphStore::new(repo, config.graph.clone()));
    let retrieval = Arc::new(RetrievalEngine::new(store.clone(), embedder.clone(), Some(llm_service.clone())));

    let _orchestrator = Orchestrator::new(store, retrieval, embedder, Some(llm_service), config.orchestrator.clone());

    info!("Orchestrator ready");

    tokio::signal::ctrl_c().await?;

    info!("Orchestrator shutting down");
    Ok(())
}
