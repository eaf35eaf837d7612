//! Concept clustering and centrality scoring. `Clusterer::recompute` is the
//! single entry point: it detects communities among Concept entities,
//! persists cluster rows, and scores centrality over the full project graph
//! (every entity type, not just Concept) in the same pass.

pub mod centrality;
pub mod community;
pub mod pagerank;

use crate::store::GraphStore;
use chrono::Utc;
use paperforge_common::db::models::{Cluster as ClusterRow, EntityRow};
use paperforge_common::errors::Result;
use paperforge_common::model::{Cluster, EntityType};
use pagerank::{PageRankConfig, PageRankScorer};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Minimum community size worth keeping as a cluster; singletons are noise,
/// not clusters, and are left unclustered (`cluster_id = NULL`).
const MIN_CLUSTER_SIZE: usize = 2;

pub struct ClusterRunSummary {
    pub clusters_found: usize,
    pub detection_method: &'static str,
    pub entities_scored: usize,
}

pub struct Clusterer {
    store: Arc<GraphStore>,
}

impl Clusterer {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    pub async fn recompute(&self, project_id: Uuid) -> Result<ClusterRunSummary> {
        let concepts = self
            .store
            .repository()
            .list_entities_by_project(project_id, Some(EntityType::Concept.as_str()))
            .await?;
        let concept_ids: std::collections::HashSet<Uuid> = concepts.iter().map(|e| e.id).collect();

        let relationship_rows = self.store.repository().relationships_by_project(project_id).await?;
        let edges: Vec<(Uuid, Uuid, f32)> = relationship_rows
            .iter()
            .filter(|r| concept_ids.contains(&r.source_id) && concept_ids.contains(&r.target_id))
            .map(|r| (r.source_id, r.target_id, r.weight))
            .collect();

        let node_ids: Vec<Uuid> = concepts.iter().map(|e| e.id).collect();
        let detection = community::detect(&node_ids, &edges);

        let mut by_community: HashMap<usize, Vec<&EntityRow>> = HashMap::new();
        for row in &concepts {
            let community = detection.assignment.get(&row.id).copied().unwrap_or(0);
            by_community.entry(community).or_default().push(row);
        }

        let mut cluster_domain: Vec<Cluster> = Vec::new();
        let mut entity_cluster: HashMap<Uuid, Uuid> = HashMap::new();

        for members in by_community.values() {
            if members.len() < MIN_CLUSTER_SIZE {
                continue;
            }

            let cluster_id = Uuid::new_v4();
            let concept_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
            let keywords = extract_keywords(members);
            let centroid = mean_embedding(members);
            let density = cluster_density(&concept_ids, &edges);
            let label = Cluster::label_for(cluster_id, &keywords);

            for &id in &concept_ids {
                entity_cluster.insert(id, cluster_id);
            }

            cluster_domain.push(Cluster {
                id: cluster_id,
                project_id,
                keywords,
                concept_ids,
                size: members.len() as u32,
                density,
                label,
                centroid,
                detection_method: detection.method.to_string(),
                level: 0,
                created_at: Utc::now(),
            });
        }

        let clusters_found = cluster_domain.len();
        let rows: Vec<ClusterRow> = cluster_domain.into_iter().map(cluster_to_row).collect();
        self.store.repository().replace_clusters(project_id, rows).await?;

        let graph = self.store.load_graph(project_id).await?;
        let degree = centrality::degree_centrality(&graph);
        let betweenness = centrality::betweenness_centrality(&graph);
        let pagerank = PageRankScorer::new(PageRankConfig::default()).compute(&graph);

        let mut entities_scored = 0usize;
        for &node_id in graph.nodes() {
            let d = degree.get(&node_id).copied().unwrap_or(0.0);
            let b = betweenness.get(&node_id).copied().unwrap_or(0.0);
            let p = pagerank.get(&node_id).copied().unwrap_or(0.0);
            let cluster_id = entity_cluster.get(&node_id).copied();
            self.store
                .repository()
                .update_entity_centrality(node_id, d, b, p, cluster_id)
                .await?;
            entities_scored += 1;
        }

        Ok(ClusterRunSummary { clusters_found, detection_method: detection.method, entities_scored })
    }
}

/// Term frequency over member definitions, lowercased and split on
/// whitespace; empty/blank definitions don't contribute. The top terms by
/// frequency become the cluster's keyword list.
fn extract_keywords(members: &[&EntityRow]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for member in members {
        let text = member.definition.as_deref().unwrap_or("");
        if text.trim().is_empty() {
            continue;
        }
        for word in text.to_lowercase().split_whitespace() {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if cleaned.len() > 3 {
                *counts.entry(cleaned).or_insert(0) += 1;
            }
        }
        counts.entry(member.display_name.to_lowercase()).or_insert(1);
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(5).map(|(term, _)| term).collect()
}

fn mean_embedding(members: &[&EntityRow]) -> Option<Vec<f32>> {
    let vectors: Vec<Vec<f32>> = members.iter().filter_map(|m| m.parse_embedding()).collect();
    let dim = vectors.first()?.len();
    if dim == 0 {
        return None;
    }

    let mut sum = vec![0.0f32; dim];
    let mut count = 0usize;
    for v in &vectors {
        if v.len() != dim {
            continue;
        }
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| s / count as f32).collect())
}

/// Edges within the cluster divided by the maximum possible undirected pair
/// count; a singleton-free cluster of size 1 has density 0 by convention.
fn cluster_density(members: &[Uuid], all_edges: &[(Uuid, Uuid, f32)]) -> f32 {
    let n = members.len();
    if n < 2 {
        return 0.0;
    }
    let member_set: std::collections::HashSet<Uuid> = members.iter().copied().collect();
    let internal = all_edges
        .iter()
        .filter(|(a, b, _)| member_set.contains(a) && member_set.contains(b))
        .count();
    let max_possible = (n * (n - 1)) / 2;
    (internal as f32 / max_possible as f32).min(1.0)
}

fn cluster_to_row(cluster: Cluster) -> ClusterRow {
    ClusterRow {
        id: cluster.id,
        project_id: cluster.project_id,
        keywords: serde_json::to_value(&cluster.keywords).unwrap_or_default(),
        concept_ids: serde_json::to_value(&cluster.concept_ids).unwrap_or_default(),
        size: cluster.size as i32,
        density: cluster.density,
        label: cluster.label,
        centroid: cluster.centroid.map(|v| centroid_literal(&v)),
        detection_method: cluster.detection_method,
        level: cluster.level as i16,
        created_at: cluster.created_at.into(),
    }
}

/// Bracketed CSV pgvector text literal, matching the repository's own
/// embedding-column encoding.
fn centroid_literal(vector: &[f32]) -> String {
    format!("[{}]", vector.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_density_is_zero_for_singletons() {
        let a = Uuid::from_u128(1);
        assert_eq!(cluster_density(&[a], &[]), 0.0);
    }

    #[test]
    fn cluster_density_counts_only_internal_edges() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let edges = vec![(a, b, 1.0), (b, c, 1.0)];
        assert_eq!(cluster_density(&[a, b], &edges), 1.0);
    }

    #[test]
    fn centroid_literal_formats_as_bracketed_csv() {
        assert_eq!(centroid_literal(&[1.0, 2.5, -3.0]), "[1,2.5,-3]");
    }
}
