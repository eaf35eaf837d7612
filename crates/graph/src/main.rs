//! PaperForge Graph Service
//!
//! Hosts the Graph Store, Clusterer, Gap Detector, and Retrieval Engine.
//! No HTTP or gRPC surface of its own: these subsystems are called directly
//! by the orchestrator process (or, in this workspace, linked in-process by
//! it) rather than over the wire.

use paperforge_common::db::DbPool;
use paperforge_common::embeddings::create_embedder;
use paperforge_common::llm::{LlmProvider, LlmService, OpenAiProvider};
use paperforge_common::{config::AppConfig, VERSION};
use paperforge_graph::{Clusterer, GapDetector, GraphStore, RetrievalEngine};
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

    info!("Starting PaperForge Graph Service v{}", VERSION);

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
        tracing::warn!("no LLM API key configured, gap research questions and the ai_explanation evidence tier are disabled");
    }

    let llm_service = Arc::new(LlmService::new(providers, config.llm.max_retries, config.llm.backoff_cap_secs));

    let store = Arc::new(GraphStore::new(repo, config.graph.clone()));
    let _clusterer = Clusterer::new(store.clone());
    let _gap_detector = GapDetector::new(store.clone(), Some(llm_service.clone()), config.gap.clone());
    let _retrieval_engine = RetrievalEngine::new(store, embedder, Some(llm_service));

    info!("Graph service ready");

    tokio::signal::ctrl_c().await?;

    info!("Graph service shutting down");
    Ok(())
}
