//! Structural gap detection: weakly connected pairs of concept clusters,
//! read as candidate research opportunities. `GapDetector::recompute` mirrors
//! the clusterer's idempotent-replace contract — every run throws away the
//! previous gap set and writes a fresh one.

use crate::store::graph::Graph;
use crate::store::GraphStore;
use chrono::Utc;
use paperforge_common::config::GapConfig;
use paperforge_common::db::models::Gap as GapRow;
use paperforge_common::errors::Result;
use paperforge_common::llm::{parse_json_cascade, LlmService};
use paperforge_common::metrics::record_gaps_detected;
use paperforge_common::model::{GapStatus, GhostEdge, StructuralGap};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Caps the gap-strength denominator so two very large clusters don't drown
/// out a genuinely weak inter-cluster connection by sheer pair count.
const GAP_NORMALIZATION_CAP: usize = 500;

pub struct GapRunSummary {
    pub gaps_found: usize,
    pub clusters_considered: usize,
}

pub struct GapDetector {
    store: Arc<GraphStore>,
    llm: Option<Arc<LlmService>>,
    config: GapConfig,
}

#[derive(Deserialize)]
struct ResearchQuestionsResponse {
    questions: Vec<String>,
}

impl GapDetector {
    pub fn new(store: Arc<GraphStore>, llm: Option<Arc<LlmService>>, config: GapConfig) -> Self {
        Self { store, llm, config }
    }

    pub async fn recompute(&self, project_id: Uuid) -> Result<GapRunSummary> {
        let started = Instant::now();
        let clusters = self.store.repository().clusters_by_project(project_id).await?;
        if clusters.len() < 2 {
            self.store.repository().replace_gaps(project_id, Vec::new()).await?;
            return Ok(GapRunSummary { gaps_found: 0, clusters_considered: clusters.len() });
        }

        let relationships = self.store.repository().relationships_by_project(project_id).await?;
        // concept_id -> cluster_id, built from the stored concept id lists.
        let concept_cluster: HashMap<Uuid, Uuid> = clusters
            .iter()
            .flat_map(|c| {
                let concept_ids: Vec<Uuid> = serde_json::from_value(c.concept_ids.clone()).unwrap_or_default();
                concept_ids.into_iter().map(move |id| (id, c.id))
            })
            .collect();

        let mut inter_edge_counts: HashMap<(Uuid, Uuid), usize> = HashMap::new();
        for rel in &relationships {
            let (Some(&ca), Some(&cb)) =
                (concept_cluster.get(&rel.source_id), concept_cluster.get(&rel.target_id))
            else {
                continue;
            };
            if ca == cb {
                continue;
            }
            *inter_edge_counts.entry(StructuralGap::ordered_pair(ca, cb)).or_insert(0) += 1;
        }

        let graph = self.store.load_graph(project_id).await?;
        let centrality = self.project_betweenness(project_id, &graph).await;

        let mut candidates: Vec<StructuralGap> = Vec::new();
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let a = &clusters[i];
                let b = &clusters[j];
                let pair = StructuralGap::ordered_pair(a.id, b.id);
                let inter_edges = inter_edge_counts.get(&pair).copied().unwrap_or(0);
                let max_possible = (a.size as usize * b.size as usize).min(GAP_NORMALIZATION_CAP);
                let gap_strength = inter_edges as f32 / max_possible.max(1) as f32;

                if gap_strength > self.config.strength_threshold {
                    continue;
                }

                let centroid_a = a.centroid.as_deref().and_then(parse_centroid);
                let centroid_b = b.centroid.as_deref().and_then(parse_centroid);
                let semantic_distance = match (&centroid_a, &centroid_b) {
                    (Some(ca), Some(cb)) => 1.0 - cosine_similarity(ca, cb),
                    _ => 1.0,
                };
                if semantic_distance < self.config.min_semantic_distance {
                    continue;
                }

                let bridge_candidates = self.bridge_candidates(a, b, &graph, &centrality);
                let ghost_edges = self.ghost_edges(a, b, &centrality, 1.0 - semantic_distance);

                candidates.push(StructuralGap {
                    id: Uuid::new_v4(),
                    project_id,
                    cluster_a_id: pair.0,
                    cluster_b_id: pair.1,
                    concept_ids_a: serde_json::from_value(a.concept_ids.clone()).unwrap_or_default(),
                    concept_ids_b: serde_json::from_value(b.concept_ids.clone()).unwrap_or_default(),
                    gap_strength,
                    semantic_distance,
                    bridge_candidates,
                    research_questions: Vec::new(),
                    ghost_edges,
                    status: GapStatus::Detected,
                    created_at: Utc::now(),
                });
            }
        }

        for gap in &mut candidates {
            let cluster_a = clusters.iter().find(|c| c.id == gap.cluster_a_id);
            let cluster_b = clusters.iter().find(|c| c.id == gap.cluster_b_id);
            if let (Some(a), Some(b)) = (cluster_a, cluster_b) {
                gap.research_questions = self.research_questions(a, b).await;
            }
        }

        let gaps_found = candidates.len();
        let rows: Vec<GapRow> = candidates.into_iter().map(gap_to_row).collect();
        self.store.repository().replace_gaps(project_id, rows).await?;

        record_gaps_detected(started.elapsed().as_secs_f64(), gaps_found);

        Ok(GapRunSummary { gaps_found, clusters_considered: clusters.len() })
    }

    async fn project_betweenness(&self, project_id: Uuid, graph: &Graph) -> HashMap<Uuid, f32> {
        if let Some(cached) = self.store.cached_centrality(project_id).await {
            return cached.iter().map(|(id, c)| (*id, c.betweenness)).collect();
        }
        crate::cluster::centrality::betweenness_centrality(graph)
    }

    /// Bridge candidates: entities that belong to neither cluster but are
    /// adjacent (in either direction) to a concept in both, ranked by
    /// betweenness centrality — a third party structurally sitting between
    /// the two clusters, not a member of either.
    fn bridge_candidates(
        &self,
        a: &paperforge_common::db::models::Cluster,
        b: &paperforge_common::db::models::Cluster,
        graph: &Graph,
        centrality: &HashMap<Uuid, f32>,
    ) -> Vec<String> {
        let ids_a: HashSet<Uuid> = serde_json::from_value(a.concept_ids.clone()).unwrap_or_default();
        let ids_b: HashSet<Uuid> = serde_json::from_value(b.concept_ids.clone()).unwrap_or_default();

        let neighbors = |id: Uuid| -> HashSet<Uuid> {
            graph.forward_targets(id).chain(graph.backward_targets(id)).collect()
        };
        let neighbors_of = |ids: &HashSet<Uuid>| -> HashSet<Uuid> {
            ids.iter().flat_map(|&id| neighbors(id)).collect()
        };
        let adjacent_to_a = neighbors_of(&ids_a);
        let adjacent_to_b = neighbors_of(&ids_b);

        let mut scored: Vec<(Uuid, f32)> = adjacent_to_a
            .intersection(&adjacent_to_b)
            .filter(|id| !ids_a.contains(id) && !ids_b.contains(id))
            .map(|&id| (id, centrality.get(&id).copied().unwrap_or(0.0)))
            .collect();
        scored.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.config.max_bridge_candidates)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Pairs the highest-betweenness concept on each side into up to 3 ghost
    /// edges — potential, not-yet-realized relationships shown in the gap view.
    fn ghost_edges(
        &self,
        a: &paperforge_common::db::models::Cluster,
        b: &paperforge_common::db::models::Cluster,
        centrality: &HashMap<Uuid, f32>,
        similarity: f32,
    ) -> Vec<GhostEdge> {
        let top_a = top_by_centrality(a, centrality, 3);
        let top_b = top_by_centrality(b, centrality, 3);
        top_a
            .into_iter()
            .zip(top_b)
            .map(|(entity_a, entity_b)| GhostEdge { entity_a, entity_b, similarity })
            .collect()
    }

    /// Non-fatal: a gap is persisted with an empty question list when the LLM
    /// is unavailable or returns unparseable JSON.
    async fn research_questions(&self, a: &paperforge_common::db::models::Cluster, b: &paperforge_common::db::models::Cluster) -> Vec<String> {
        let Some(llm) = &self.llm else { return Vec::new() };
        if self.config.max_research_questions == 0 {
            return Vec::new();
        }

        let system = "You are a research assistant identifying under-explored connections \
                      between two areas of literature. Respond as strict JSON: \
                      {\"questions\":[\"...\"]}.";
        let user = format!(
            "Area A: {}\nArea B: {}\nPropose up to {} research questions that bridge these two areas.",
            a.label, b.label, self.config.max_research_questions
        );

        let raw = match llm.generate(system, &user, true).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "gap research-question generation failed");
                return Vec::new();
            }
        };

        match parse_json_cascade::<ResearchQuestionsResponse>(&raw) {
            Ok(parsed) => parsed.questions.into_iter().take(self.config.max_research_questions).collect(),
            Err(e) => {
                warn!(error = %e, "gap research-question JSON parse failed");
                Vec::new()
            }
        }
    }
}

fn top_by_centrality(
    cluster: &paperforge_common::db::models::Cluster,
    centrality: &HashMap<Uuid, f32>,
    limit: usize,
) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = serde_json::from_value(cluster.concept_ids.clone()).unwrap_or_default();
    ids.sort_by(|x, y| {
        let cx = centrality.get(x).copied().unwrap_or(0.0);
        let cy = centrality.get(y).copied().unwrap_or(0.0);
        cy.partial_cmp(&cx).unwrap_or(std::cmp::Ordering::Equal)
    });
    ids.truncate(limit);
    ids
}

fn parse_centroid(raw: &str) -> Option<Vec<f32>> {
    let inner = raw.trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return None;
    }
    inner.split(',').map(|v| v.trim().parse::<f32>().ok()).collect()
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

fn gap_to_row(gap: StructuralGap) -> GapRow {
    GapRow {
        id: gap.id,
        project_id: gap.project_id,
        cluster_a_id: gap.cluster_a_id,
        cluster_b_id: gap.cluster_b_id,
        concept_ids_a: serde_json::to_value(&gap.concept_ids_a).unwrap_or_default(),
        concept_ids_b: serde_json::to_value(&gap.concept_ids_b).unwrap_or_default(),
        gap_strength: gap.gap_strength,
        semantic_distance: gap.semantic_distance,
        bridge_candidates: serde_json::to_value(&gap.bridge_candidates).unwrap_or_default(),
        research_questions: serde_json::to_value(&gap.research_questions).unwrap_or_default(),
        ghost_edges: serde_json::to_value(&gap.ghost_edges).unwrap_or_default(),
        status: gap_status_str(gap.status),
        created_at: gap.created_at.into(),
    }
}

/// Storage form of `GapStatus`, leaning on its own `snake_case` serde rename
/// rather than a hand-written match.
fn gap_status_str(status: GapStatus) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "detected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_empty_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn parse_centroid_round_trips_bracketed_csv() {
        assert_eq!(parse_centroid("[1,2.5,-3]"), Some(vec![1.0, 2.5, -3.0]));
        assert_eq!(parse_centroid(""), None);
    }
}
