//! Ingest pipeline driver: chunk → extract → resolve → persist.
//!
//! Within one paper the four stages run strictly in order. Across papers in
//! the same ingest job, extraction runs concurrently up to
//! `OrchestratorConfig.extraction_concurrency`; entity resolution always runs
//! once at the end of the job, over the whole project, since a duplicate can
//! only be recognized once all of an ingest's entities exist.

use crate::chunker::chunk_paper_text;
use crate::errors::{IngestionError, Result};
use crate::extractor::{EntityExtractor, ExtractionResult};
use crate::registry::JobRegistry;
use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use futures::stream::{self, StreamExt};
use paperforge_common::config::AppConfig;
use paperforge_common::db::models::JobStatus;
use paperforge_common::db::Repository;
use paperforge_common::embeddings::Embedder;
use paperforge_common::llm::LlmService;
use paperforge_common::metrics::record_ingestion;
use paperforge_common::model::{content_fingerprint, normalize_name, EntityType, SectionType};
use paperforge_resolution::EntityResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// One paper queued for ingestion. Paper/author/chunk rows do not exist yet;
/// the pipeline creates them.
#[derive(Clone)]
pub struct PaperInput {
    pub paper_id: Uuid,
    pub title: String,
    pub abstract_text: String,
    pub full_text: Option<String>,
    pub author_names: Vec<String>,
    pub publication_year: Option<i32>,
}

/// Per-job knobs accepted by `start_ingest`. A job's extractor and resolver
/// are built fresh from these, since the lexical-graph flag and resolution
/// cap are job-level choices, not service-wide configuration.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub enable_full_text: bool,
    pub enable_lexical_graph: bool,
    pub resolution_llm_cap: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { enable_full_text: true, enable_lexical_graph: false, resolution_llm_cap: None }
    }
}

/// Closed set of entity types the resolver runs over, scoped one type at a
/// time — merging across types is never legal. Paper and Author entities are
/// keyed by source identity rather than resolved.
const RESOLVABLE_TYPES: [EntityType; 10] = [
    EntityType::Concept,
    EntityType::Method,
    EntityType::Finding,
    EntityType::Problem,
    EntityType::Dataset,
    EntityType::Metric,
    EntityType::Innovation,
    EntityType::Limitation,
    EntityType::Result,
    EntityType::Claim,
];

pub struct IngestPipeline {
    repo: Arc<Repository>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<LlmService>,
    registry: JobRegistry,
    config: Arc<AppConfig>,
}

impl IngestPipeline {
    pub fn new(
        repo: Arc<Repository>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<LlmService>,
        registry: JobRegistry,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { repo, embedder, llm, registry, config }
    }

    /// Runs one ingest job end to end: per-paper chunk/extract/persist,
    /// followed by a single project-wide resolution pass. The extractor and
    /// resolver are built fresh from `options` since both are job-scoped.
    ///
    /// Before doing any work, fingerprints `papers` (title + abstract of
    /// each) and checks for a prior *completed* job in the same project under
    /// that fingerprint as its `idempotency_key` — if one exists, this job is
    /// a resubmission and is marked completed without re-ingesting. Callers
    /// that want this detection to apply should derive the job's
    /// `idempotency_key` at creation time with `content_fingerprint` over the
    /// same paper fields.
    pub async fn run(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        papers: Vec<PaperInput>,
        options: IngestOptions,
    ) -> Result<()> {
        let fingerprint_parts: Vec<&str> = papers
            .iter()
            .flat_map(|p| [p.title.as_str(), p.abstract_text.as_str()])
            .collect();
        let fingerprint = content_fingerprint(&fingerprint_parts);

        if let Some(prior) = self.repo.find_job_by_idempotency_key(project_id, &fingerprint).await? {
            if prior.id != job_id && JobStatus::from(prior.status) == JobStatus::Completed {
                info!(%job_id, prior_job_id = %prior.id, "duplicate ingest job fingerprint, skipping re-ingestion");
                self.repo
                    .update_job_status(
                        job_id,
                        JobStatus::Completed,
                        Some(format!("duplicate of already-completed job {}", prior.id)),
                    )
                    .await?;
                return Ok(());
            }
        }

        self.repo.update_job_status(job_id, JobStatus::Running, None).await?;

        let extractor = Arc::new(EntityExtractor::new(self.llm.clone(), options.enable_lexical_graph));

        let mut resolution_config = self.config.resolution.clone();
        if let Some(cap) = options.resolution_llm_cap {
            resolution_config.llm_batch_cap = cap;
        }
        let resolver = Arc::new(EntityResolver::new(self.llm.clone(), resolution_config));

        let concurrency = self.config.orchestrator.extraction_concurrency.max(1);
        let total = papers.len();

        let outcomes: Vec<Result<()>> = stream::iter(papers)
            .map(|paper| self.process_one_paper_with_retry(job_id, project_id, paper, &extractor, options.enable_full_text))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let failures = outcomes.iter().filter(|r| r.is_err()).count();
        for outcome in &outcomes {
            if let Err(e) = outcome {
                warn!(error = %e, "paper ingestion failed");
            }
        }

        let resolution_summary = match self.resolve_project(project_id, &resolver).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "project-wide resolution failed");
                serde_json::json!({ "resolution_error": e.to_string() })
            }
        };
        self.registry.reliability_summary(job_id, resolution_summary).await;

        let final_status = if failures == 0 { JobStatus::Completed } else { JobStatus::Failed };
        let error_message = (failures > 0).then(|| format!("{failures}/{total} paper(s) failed ingestion"));
        self.repo.update_job_status(job_id, final_status, error_message).await?;

        info!(job_id = %job_id, papers = total, failures, "ingest job finished");
        Ok(())
    }

    /// Retries `process_one_paper` over a transient DB error — a connection
    /// blip during a long ingest job shouldn't fail the whole paper when a
    /// few seconds' backoff would have ridden it out. Non-DB failures (a
    /// malformed PDF, an extraction error) are permanent and never retried.
    async fn process_one_paper_with_retry(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        paper: PaperInput,
        extractor: &Arc<EntityExtractor>,
        enable_full_text: bool,
    ) -> Result<()> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        retry(backoff, || async {
            self.process_one_paper(job_id, project_id, paper.clone(), extractor, enable_full_text)
                .await
                .map_err(|e| match e {
                    IngestionError::DatabaseError(_) => {
                        warn!(error = %e, paper_id = %paper.paper_id, "transient DB error ingesting paper, retrying");
                        BackoffError::transient(e)
                    }
                    other => BackoffError::permanent(other),
                })
        })
        .await
    }

    /// One paper's strict chunk → extract → persist chain.
    async fn process_one_paper(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        paper: PaperInput,
        extractor: &Arc<EntityExtractor>,
        enable_full_text: bool,
    ) -> Result<()> {
        let started = Instant::now();
        let paper_row = self
            .repo
            .upsert_entity(
                project_id,
                EntityType::Paper.as_str(),
                &paper.title,
                &normalize_name(&paper.title),
                Some(paper.abstract_text.clone()),
                serde_json::json!({ "publication_year": paper.publication_year }),
                None,
                None,
                vec![],
                vec![],
            )
            .await?;
        let paper_entity_id = paper_row.id;

        let mut author_ids = Vec::with_capacity(paper.author_names.len());
        for author_name in &paper.author_names {
            let author_row = self
                .repo
                .upsert_entity(
                    project_id,
                    EntityType::Author.as_str(),
                    author_name,
                    &normalize_name(author_name),
                    None,
                    serde_json::json!({}),
                    None,
                    None,
                    vec![],
                    vec![],
                )
                .await?;
            author_ids.push(author_row.id);
        }

        let chunker_config = &self.config.chunker;
        let source_text = if enable_full_text {
            paper.full_text.as_deref().unwrap_or(&paper.abstract_text)
        } else {
            paper.abstract_text.as_str()
        };
        let pending_chunks = chunk_paper_text(source_text, chunker_config);

        let mut chunk_ids: Vec<Uuid> = Vec::with_capacity(pending_chunks.len());
        let mut abstract_chunk_id: Option<Uuid> = None;
        let mut section_chunks: Vec<(SectionType, Uuid, String)> = Vec::new();

        for chunk in &pending_chunks {
            let embedding = self.embedder.embed(&chunk.text).await.ok();
            let parent_chunk_id = chunk.parent_index.and_then(|idx| chunk_ids.get(idx).copied());

            let chunk_id = self
                .repo
                .create_chunk(
                    paper.paper_id,
                    project_id,
                    &chunk.text,
                    chunk.section_type.as_str(),
                    chunk.level as i16,
                    parent_chunk_id,
                    chunk.sequence_order as i32,
                    chunk.token_count as i32,
                    chunk.start_line.map(|v| v as i32),
                    chunk.end_line.map(|v| v as i32),
                    embedding.as_deref(),
                )
                .await?;
            chunk_ids.push(chunk_id);

            if chunk.section_type == SectionType::Abstract && chunk.level == 0 && abstract_chunk_id.is_none() {
                abstract_chunk_id = Some(chunk_id);
            }
            if chunk.level == 0 {
                section_chunks.push((chunk.section_type, chunk_id, chunk.text.clone()));
            }
        }

        let abstract_chunk_id = abstract_chunk_id.unwrap_or_else(|| *chunk_ids.first().unwrap_or(&paper.paper_id));

        let extraction = if extractor.lexical_graph_enabled() {
            extractor.extract_section_aware(project_id, paper_entity_id, &section_chunks).await
        } else {
            extractor
                .extract_abstract_only(
                    project_id,
                    paper_entity_id,
                    &paper.title,
                    &paper.abstract_text,
                    abstract_chunk_id,
                )
                .await
        };

        let authored_by = extractor.authored_by_relationships(project_id, paper_entity_id, &author_ids);

        self.persist_extraction(project_id, extraction, authored_by).await?;

        self.registry.paper_processed(job_id, paper.paper_id).await;
        record_ingestion(started.elapsed().as_secs_f64(), chunk_ids.len(), &project_id.to_string());
        Ok(())
    }

    /// Upserts extracted entities and relationships, remapping each
    /// extractor-generated id to the id SeaORM actually assigned on conflict.
    async fn persist_extraction(
        &self,
        project_id: Uuid,
        extraction: ExtractionResult,
        extra_relationships: Vec<paperforge_common::model::Relationship>,
    ) -> Result<()> {
        let mut id_map: HashMap<Uuid, Uuid> = HashMap::new();

        for entity in &extraction.entities {
            let embedding = self.embedder.embed(&entity.display_name).await.ok();
            let row = self
                .repo
                .upsert_entity(
                    project_id,
                    entity.entity_type.as_str(),
                    &entity.display_name,
                    &entity.normalized_name,
                    entity.definition.clone(),
                    serde_json::to_value(&entity.properties).unwrap_or_default(),
                    embedding.as_deref(),
                    entity.extraction_section.clone(),
                    entity.evidence_spans.clone(),
                    entity.source_chunk_ids.clone(),
                )
                .await?;
            id_map.insert(entity.id, row.id);
        }

        for relationship in extraction.relationships.into_iter().chain(extra_relationships) {
            let source_id = id_map.get(&relationship.source_id).copied().unwrap_or(relationship.source_id);
            let target_id = id_map.get(&relationship.target_id).copied().unwrap_or(relationship.target_id);
            self.repo
                .upsert_relationship(
                    project_id,
                    source_id,
                    target_id,
                    relationship.relationship_type.as_str(),
                    relationship.weight,
                    serde_json::to_value(&relationship.properties).unwrap_or_default(),
                    relationship.evidence_spans,
                    relationship.evidence_chunk_ids,
                    relationship.first_seen_year,
                )
                .await?;
        }

        if extraction.json_parse_failures > 0 {
            warn!(failures = extraction.json_parse_failures, "extraction had JSON parse failures");
        }

        Ok(())
    }

    /// Runs the resolver once per resolvable entity type, across the whole
    /// project, then applies merge decisions and persists cross-paper
    /// `SameAs` links. Returns a summary folded into the job's reliability
    /// record.
    async fn resolve_project(&self, project_id: Uuid, resolver: &Arc<EntityResolver>) -> Result<serde_json::Value> {
        let mut per_type_stats = serde_json::Map::new();

        for entity_type in RESOLVABLE_TYPES {
            let rows = self.repo.list_entities_by_project(project_id, Some(entity_type.as_str())).await?;
            let entities: Vec<paperforge_common::model::Entity> =
                rows.into_iter().filter_map(|row| row_to_domain_entity(row, entity_type)).collect();

            if entities.is_empty() {
                continue;
            }

            let outcome = resolver.resolve(&entities).await?;

            for decision in &outcome.decisions {
                for &loser_id in &decision.losers {
                    if let Some(loser) = entities.iter().find(|e| e.id == loser_id) {
                        self.repo
                            .absorb_into_canonical(decision.winner, &loser.display_name, loser.source_chunk_ids.clone())
                            .await?;
                        self.repo.rewrite_relationship_endpoints(loser_id, decision.winner).await?;
                        self.repo.delete_entity(loser_id).await?;
                    }
                }
            }

            for same_as in outcome.same_as {
                self.repo
                    .upsert_relationship(
                        project_id,
                        same_as.source_id,
                        same_as.target_id,
                        same_as.relationship_type.as_str(),
                        same_as.weight,
                        serde_json::to_value(&same_as.properties).unwrap_or_default(),
                        same_as.evidence_spans,
                        same_as.evidence_chunk_ids,
                        same_as.first_seen_year,
                    )
                    .await?;
            }

            per_type_stats.insert(
                entity_type.as_str().to_string(),
                serde_json::json!({
                    "total_input": outcome.stats.total_input,
                    "auto_merged_deterministic": outcome.stats.auto_merged_deterministic,
                    "auto_merged_embedding": outcome.stats.auto_merged_embedding,
                    "llm_confirmed_merges": outcome.stats.llm_confirmed_merges,
                    "potential_false_merges": outcome.stats.potential_false_merges,
                    "final_canonical_count": outcome.stats.final_canonical_count,
                    "canonicalization_rate": outcome.stats.canonicalization_rate(),
                    "cross_paper_same_as": outcome.stats.cross_paper_same_as,
                    "resolution_deferred": outcome.stats.resolution_deferred,
                }),
            );
        }

        Ok(serde_json::Value::Object(per_type_stats))
    }
}

fn row_to_domain_entity(
    row: paperforge_common::db::models::EntityRow,
    expected_type: EntityType,
) -> Option<paperforge_common::model::Entity> {
    let properties = match row.properties.clone() {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    let embedding = row.parse_embedding();
    let source_chunk_ids = row.source_chunk_ids_vec();
    let evidence_spans = serde_json::from_value(row.evidence_spans.clone()).unwrap_or_default();
    let aliases = serde_json::from_value(row.aliases.clone()).unwrap_or_default();

    Some(paperforge_common::model::Entity {
        id: row.id,
        project_id: row.project_id,
        entity_type: expected_type,
        display_name: row.display_name,
        normalized_name: row.normalized_name,
        definition: row.definition,
        properties,
        embedding,
        degree_centrality: row.degree_centrality,
        betweenness_centrality: row.betweenness_centrality,
        pagerank: row.pagerank,
        cluster_id: row.cluster_id,
        visualized: row.visualized,
        first_seen_year: row.first_seen_year,
        last_seen_year: row.last_seen_year,
        extraction_section: row.extraction_section,
        evidence_spans,
        source_chunk_ids,
        aliases,
        created_at: row.created_at.into(),
        updated_at: row.updated_at.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolvable_types_excludes_metadata_only_kinds() {
        assert!(!RESOLVABLE_TYPES.contains(&EntityType::Paper));
        assert!(!RESOLVABLE_TYPES.contains(&EntityType::Author));
        assert!(RESOLVABLE_TYPES.contains(&EntityType::Concept));
    }
}
