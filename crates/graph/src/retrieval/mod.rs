//! Natural-language-adjacent retrieval over the knowledge graph: entity and
//! relationship search generalized from the chunk-only `Retriever` trait this
//! subsystem grew out of. `RetrievalEngine::retrieve` is the entry point the
//! orchestrator's query-execution stage calls into.

mod cascade;
mod classify;
mod strategy;

pub use cascade::evidence_for;
pub use classify::classify_strategy;
pub use strategy::RetrievalStrategy;

use crate::store::{GraphStore, TraversalDirection};
use paperforge_common::db::models::EntityRow;
use paperforge_common::embeddings::Embedder;
use paperforge_common::errors::Result;
use paperforge_common::llm::LlmService;
use paperforge_common::metrics::record_retrieval;
use paperforge_common::model::ProvenanceSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const DEFAULT_HOP_CAP: u32 = 3;
const TOP_K: usize = 10;

/// Below this traversal score an edge is considered too weak to trust when
/// `low_confidence_filter` is set — exploratory and gap-identifying intents
/// ask for this discount so a single low-weight bookkeeping edge can't pull
/// in an unrelated entity.
const LOW_CONFIDENCE_SCORE_THRESHOLD: f32 = 0.5;

/// One step of a retrieval's audit trail, plumbed back to the caller as the
/// "retrieval_trace".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub action: String,
    pub node_ids: Vec<Uuid>,
    pub thought: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub entity_id: Uuid,
    pub display_name: String,
    pub entity_type: String,
    pub score: f32,
    pub provenance_source: ProvenanceSource,
    pub evidence: Vec<String>,
}

pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    pub trace: Vec<TraceStep>,
    pub strategy_used: RetrievalStrategy,
}

pub struct RetrievalEngine {
    store: Arc<GraphStore>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<LlmService>>,
}

struct TraceBuilder {
    steps: Vec<TraceStep>,
}

impl TraceBuilder {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn record(&mut self, action: &str, node_ids: Vec<Uuid>, thought: &str, started: Instant) {
        self.steps.push(TraceStep {
            index: self.steps.len(),
            action: action.to_string(),
            node_ids,
            thought: thought.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

impl RetrievalEngine {
    pub fn new(store: Arc<GraphStore>, embedder: Arc<dyn Embedder>, llm: Option<Arc<LlmService>>) -> Self {
        Self { store, embedder, llm }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        project_id: Uuid,
        strategy: Option<RetrievalStrategy>,
        hop_cap: Option<u32>,
    ) -> Result<RetrievalOutcome> {
        self.retrieve_scoped(query, project_id, strategy, hop_cap, &[], false).await
    }

    /// Full form of `retrieve`: `seed_entity_ids` narrows graph-traversal
    /// search to the entities concept-extraction already resolved instead of
    /// re-matching the raw query text, and `low_confidence_filter` discounts
    /// traversal hits reached only over a weak edge.
    pub async fn retrieve_scoped(
        &self,
        query: &str,
        project_id: Uuid,
        strategy: Option<RetrievalStrategy>,
        hop_cap: Option<u32>,
        seed_entity_ids: &[Uuid],
        low_confidence_filter: bool,
    ) -> Result<RetrievalOutcome> {
        let mut trace = TraceBuilder::new();
        let cap = hop_cap.unwrap_or(DEFAULT_HOP_CAP);
        let retrieval_started = Instant::now();

        let started = Instant::now();
        let strategy_used = match strategy {
            Some(s) => s,
            None => classify_strategy(query, self.llm.as_deref()).await,
        };
        trace.record(
            "classify_strategy",
            Vec::new(),
            &format!("routed query to {strategy_used:?}"),
            started,
        );

        let results = match strategy_used {
            RetrievalStrategy::Vector => self.retrieve_vector(query, project_id, &mut trace).await?,
            RetrievalStrategy::GraphTraversal => {
                self.retrieve_graph_traversal(query, project_id, cap, seed_entity_ids, low_confidence_filter, &mut trace).await?
            }
            RetrievalStrategy::Hybrid => {
                self.retrieve_hybrid(query, project_id, cap, seed_entity_ids, low_confidence_filter, &mut trace).await?
            }
        };

        let started = Instant::now();
        let mut scored = Vec::with_capacity(results.len());
        for row in results {
            let (provenance_source, evidence) = evidence_for(&self.store, &self.llm, project_id, &row.row).await;
            scored.push(RetrievalResult {
                entity_id: row.row.id,
                display_name: row.row.display_name.clone(),
                entity_type: row.row.entity_type.clone(),
                score: row.score,
                provenance_source,
                evidence,
            });
        }
        trace.record(
            "attach_evidence",
            scored.iter().map(|r| r.entity_id).collect(),
            "ran the evidence cascade over each result",
            started,
        );

        record_retrieval(retrieval_started.elapsed().as_secs_f64(), strategy_used.as_str(), scored.len());

        Ok(RetrievalOutcome { results: scored, trace: trace.steps, strategy_used })
    }

    async fn retrieve_vector(&self, query: &str, project_id: Uuid, trace: &mut TraceBuilder) -> Result<Vec<ScoredRow>> {
        let started = Instant::now();
        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.entity_vector_search(project_id, &embedding, None, TOP_K).await?;
        let node_ids: Vec<Uuid> = hits.iter().map(|h| h.entity_id).collect();
        trace.record("vector_search", node_ids.clone(), "nearest-neighbor search over entity embeddings", started);

        let rows = self.store.repository().list_entities_by_project(project_id, None).await?;
        Ok(rows
            .into_iter()
            .filter(|r| node_ids.contains(&r.id))
            .map(|row| {
                let score = hits.iter().find(|h| h.entity_id == row.id).map(|h| h.score as f32).unwrap_or(0.0);
                ScoredRow { row, score }
            })
            .collect())
    }

    async fn retrieve_graph_traversal(
        &self,
        query: &str,
        project_id: Uuid,
        hop_cap: u32,
        seed_entity_ids: &[Uuid],
        low_confidence_filter: bool,
        trace: &mut TraceBuilder,
    ) -> Result<Vec<ScoredRow>> {
        let started = Instant::now();
        let seed_ids: Vec<Uuid> = if seed_entity_ids.is_empty() {
            let seeds = self.store.entity_substring_search(project_id, query, 3).await?;
            let ids: Vec<Uuid> = seeds.iter().map(|s| s.entity_id).collect();
            trace.record("seed_match", ids.clone(), "matched query against entity display names", started);
            ids
        } else {
            trace.record(
                "seed_match",
                seed_entity_ids.to_vec(),
                "used the entities concept-extraction already resolved as traversal seeds",
                started,
            );
            seed_entity_ids.to_vec()
        };

        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut hits_by_entity: std::collections::HashMap<Uuid, f32> = std::collections::HashMap::new();
        for &seed in &seed_ids {
            for hit in self.store.traverse(project_id, seed, Some(hop_cap), TraversalDirection::Both).await? {
                if low_confidence_filter && hit.score < LOW_CONFIDENCE_SCORE_THRESHOLD {
                    continue;
                }
                hits_by_entity.entry(hit.entity_id).or_insert(hit.score);
            }
        }
        let node_ids: Vec<Uuid> = hits_by_entity.keys().copied().collect();
        trace.record(
            "graph_traversal",
            node_ids.clone(),
            &format!(
                "BFS out to hop_cap={hop_cap} from {} seed(s){}",
                seed_ids.len(),
                if low_confidence_filter { ", discounting low-confidence edges" } else { "" }
            ),
            started,
        );

        let rows = self.store.repository().list_entities_by_project(project_id, None).await?;
        let mut scored: Vec<ScoredRow> = rows
            .into_iter()
            .filter_map(|row| hits_by_entity.get(&row.id).map(|&score| ScoredRow { row, score }))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(TOP_K);
        Ok(scored)
    }

    async fn retrieve_hybrid(
        &self,
        query: &str,
        project_id: Uuid,
        hop_cap: u32,
        seed_entity_ids: &[Uuid],
        low_confidence_filter: bool,
        trace: &mut TraceBuilder,
    ) -> Result<Vec<ScoredRow>> {
        let mut vector_trace = TraceBuilder::new();
        let mut graph_trace = TraceBuilder::new();
        let (vector, graph) = tokio::join!(
            self.retrieve_vector(query, project_id, &mut vector_trace),
            self.retrieve_graph_traversal(query, project_id, hop_cap, seed_entity_ids, low_confidence_filter, &mut graph_trace)
        );
        let vector = vector?;
        let graph = graph?;
        trace.steps.extend(vector_trace.steps);
        trace.steps.extend(graph_trace.steps);
        for (i, step) in trace.steps.iter_mut().enumerate() {
            step.index = i;
        }

        let started = Instant::now();
        let query_embedding = self.embedder.embed(query).await?;

        let mut merged: std::collections::HashMap<Uuid, ScoredRow> = std::collections::HashMap::new();
        for scored in vector.into_iter().chain(graph) {
            merged
                .entry(scored.row.id)
                .and_modify(|existing| existing.score = existing.score.max(scored.score))
                .or_insert(scored);
        }

        let mut reranked: Vec<ScoredRow> = merged
            .into_values()
            .map(|mut scored| {
                let semantic_cosine = scored
                    .row
                    .parse_embedding()
                    .map(|e| cosine_similarity(&e, &query_embedding))
                    .unwrap_or(0.0);
                scored.score = 0.3 * scored.score + 0.7 * semantic_cosine;
                scored
            })
            .collect();
        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(TOP_K);

        let node_ids: Vec<Uuid> = reranked.iter().map(|s| s.row.id).collect();
        trace.record(
            "weighted_rerank",
            node_ids,
            "re-ranked the union of vector and graph-traversal top-K by 0.3*initial + 0.7*semantic_cosine",
            started,
        );

        Ok(reranked)
    }
}

struct ScoredRow {
    row: EntityRow,
    score: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
