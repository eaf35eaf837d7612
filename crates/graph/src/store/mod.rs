//! Graph Store: the project-scoped view over `Repository` that the
//! clusterer, gap detector, and retrieval engine all build on. Owns nothing
//! persistent itself — every mutation still goes through `Repository` — but
//! adds the in-memory graph materialization, BFS traversal, visualization
//! subgraph trimming, and the project-scoped LRU caches spec'd for
//! centrality and heavy-metrics endpoints.

pub mod graph;

pub use graph::{Graph, TraversalDirection, TraversalHit};

use lru::LruCache;
use paperforge_common::db::models::{EntityRow, RelationshipRow};
use paperforge_common::db::{EntityResult, Repository};
use paperforge_common::config::GraphConfig;
use paperforge_common::errors::Result;
use paperforge_common::metrics::record_cache;
use paperforge_common::model::{EntityType, Relationship, RelationshipType};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Hard ceiling on returned edges regardless of config, so a misconfigured
/// `visualization_max_edges` can't turn the visualization endpoint into an
/// unbounded query.
const VISUALIZATION_EDGE_HARD_CAP: usize = 15_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct Centrality {
    pub degree: f32,
    pub betweenness: f32,
    pub pagerank: f32,
}

struct HeavyMetricsEntry {
    computed_at: Instant,
    value: serde_json::Value,
}

fn capacity(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested).unwrap_or(NonZeroUsize::new(1).unwrap())
}

pub struct VisualizationSubgraph {
    pub entities: Vec<EntityRow>,
    pub relationships: Vec<RelationshipRow>,
}

pub struct GraphStore {
    repo: Arc<Repository>,
    config: GraphConfig,
    heavy_metrics_ttl: Duration,
    centrality_cache: Mutex<LruCache<Uuid, Arc<HashMap<Uuid, Centrality>>>>,
    heavy_metrics_cache: Mutex<LruCache<Uuid, HeavyMetricsEntry>>,
}

impl GraphStore {
    pub fn new(repo: Arc<Repository>, config: GraphConfig) -> Self {
        let centrality_capacity = capacity(config.centrality_cache_capacity);
        let heavy_metrics_capacity = capacity(config.heavy_metrics_capacity);
        let heavy_metrics_ttl = Duration::from_secs(config.heavy_metrics_ttl_secs);
        Self {
            repo,
            config,
            heavy_metrics_ttl,
            centrality_cache: Mutex::new(LruCache::new(centrality_capacity)),
            heavy_metrics_cache: Mutex::new(LruCache::new(heavy_metrics_capacity)),
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Materializes the full project graph (all entity types) in memory.
    /// Callers that only need one entity type (the clusterer, scoped to
    /// Concept) should filter the returned node set themselves rather than
    /// re-querying, since relationships span types.
    pub async fn load_graph(&self, project_id: Uuid) -> Result<Graph> {
        let rows = self.repo.list_entities_by_project(project_id, None).await?;
        let node_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let relationship_rows = self.repo.relationships_by_project(project_id).await?;
        let relationships: Vec<Relationship> =
            relationship_rows.iter().filter_map(row_to_relationship).collect();
        Ok(Graph::from_relationships(node_ids, &relationships))
    }

    /// BFS traversal from `start`, capped at `hop_cap` (never more than the
    /// project's configured `hop_cap`, regardless of what the caller asks for).
    pub async fn traverse(
        &self,
        project_id: Uuid,
        start: Uuid,
        hop_cap: Option<u32>,
        direction: TraversalDirection,
    ) -> Result<Vec<TraversalHit>> {
        let cap = hop_cap.unwrap_or(self.config.hop_cap).min(self.config.hop_cap) as usize;
        let graph = self.load_graph(project_id).await?;
        Ok(graph.traverse(start, cap, direction))
    }

    pub async fn cached_centrality(&self, project_id: Uuid) -> Option<Arc<HashMap<Uuid, Centrality>>> {
        let mut cache = self.centrality_cache.lock().await;
        let hit = cache.get(&project_id).cloned();
        record_cache(hit.is_some(), "centrality");
        hit
    }

    pub async fn cache_centrality(&self, project_id: Uuid, values: HashMap<Uuid, Centrality>) {
        let mut cache = self.centrality_cache.lock().await;
        cache.put(project_id, Arc::new(values));
    }

    pub async fn cached_heavy_metrics(&self, project_id: Uuid) -> Option<serde_json::Value> {
        let mut cache = self.heavy_metrics_cache.lock().await;
        let expired = matches!(cache.peek(&project_id), Some(entry) if entry.computed_at.elapsed() > self.heavy_metrics_ttl);
        if expired {
            cache.pop(&project_id);
            record_cache(false, "heavy_metrics");
            return None;
        }
        let hit = cache.get(&project_id).map(|entry| entry.value.clone());
        record_cache(hit.is_some(), "heavy_metrics");
        hit
    }

    pub async fn cache_heavy_metrics(&self, project_id: Uuid, value: serde_json::Value) {
        let mut cache = self.heavy_metrics_cache.lock().await;
        cache.put(project_id, HeavyMetricsEntry { computed_at: Instant::now(), value });
    }

    /// Nearest-neighbor cosine search over entity embeddings (HNSW-style
    /// pgvector index, `m`/`ef_construction` configured at migration time).
    pub async fn entity_vector_search(
        &self,
        project_id: Uuid,
        embedding: &[f32],
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntityResult>> {
        self.repo.entity_vector_search(project_id, embedding, entity_type.map(|t| t.as_str()), limit).await
    }

    /// Trigram substring search over entity display names (tier for both
    /// concept-extraction entity resolution and the retrieval evidence cascade).
    pub async fn entity_substring_search(
        &self,
        project_id: Uuid,
        substring: &str,
        limit: usize,
    ) -> Result<Vec<EntityResult>> {
        self.repo.entity_substring_search(project_id, substring, limit).await
    }

    /// Visualization subgraph, capped and ordered per spec: Concept/Method/
    /// Finding entities are kept ahead of Paper/Author bookkeeping nodes
    /// when the node cap forces trimming; edges are capped independently,
    /// never above the hard ceiling regardless of configuration.
    pub async fn visualization_subgraph(&self, project_id: Uuid) -> Result<VisualizationSubgraph> {
        let mut entities = self.repo.list_entities_by_project(project_id, None).await?;
        entities.sort_by_key(|e| visualization_priority(&e.entity_type));
        entities.truncate(self.config.visualization_max_nodes);

        let kept: HashSet<Uuid> = entities.iter().map(|e| e.id).collect();
        let mut relationships = self.repo.relationships_by_project(project_id).await?;
        relationships.retain(|r| kept.contains(&r.source_id) && kept.contains(&r.target_id));

        let edge_cap = self.config.visualization_max_edges.min(VISUALIZATION_EDGE_HARD_CAP);
        relationships.truncate(edge_cap);

        Ok(VisualizationSubgraph { entities, relationships })
    }
}

fn visualization_priority(entity_type: &str) -> u8 {
    match entity_type {
        "concept" | "method" | "finding" => 0,
        "paper" | "author" => 2,
        _ => 1,
    }
}

/// Parses a relationship's `SCREAMING_SNAKE_CASE` storage form back into the
/// typed enum, leaning on the type's own serde rename rather than a
/// hand-written match.
pub fn parse_relationship_type(raw: &str) -> Option<RelationshipType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

pub fn parse_entity_type(raw: &str) -> Option<EntityType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

fn row_to_relationship(row: &RelationshipRow) -> Option<Relationship> {
    Some(Relationship {
        id: row.id,
        project_id: row.project_id,
        source_id: row.source_id,
        target_id: row.target_id,
        relationship_type: parse_relationship_type(&row.relationship_type)?,
        weight: row.weight,
        properties: serde_json::from_value(row.properties.clone()).unwrap_or_default(),
        evidence_spans: serde_json::from_value(row.evidence_spans.clone()).unwrap_or_default(),
        evidence_chunk_ids: serde_json::from_value(row.evidence_chunk_ids.clone()).unwrap_or_default(),
        first_seen_year: row.first_seen_year,
        created_at: row.created_at.with_timezone(&chrono::Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visualization_priority_orders_concepts_before_bookkeeping_nodes() {
        assert!(visualization_priority("concept") < visualization_priority("dataset"));
        assert!(visualization_priority("dataset") < visualization_priority("paper"));
    }

    #[test]
    fn parse_relationship_type_round_trips_storage_form() {
        assert_eq!(parse_relationship_type("DISCUSSES_CONCEPT"), Some(RelationshipType::DiscussesConcept));
        assert_eq!(parse_relationship_type("not_a_type"), None);
    }
}
