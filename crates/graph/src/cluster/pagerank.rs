//! PageRank centrality over the entity graph. Damping, iteration cap, and
//! convergence threshold match spec exactly; the iterative update itself is
//! carried over from the citation-scoring implementation this subsystem
//! grew out of.

use crate::store::Graph;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PageRankConfig {
    pub damping: f32,
    pub max_iterations: usize,
    pub epsilon: f32,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping: 0.85, max_iterations: 100, epsilon: 1e-6 }
    }
}

pub struct PageRankScorer {
    config: PageRankConfig,
}

impl PageRankScorer {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Computes PageRank over `graph`, normalized to `[0, 1]`.
    pub fn compute(&self, graph: &Graph) -> HashMap<Uuid, f32> {
        let n = graph.node_count();
        if n == 0 {
            return HashMap::new();
        }

        let n_f32 = n as f32;
        let damping = self.config.damping;
        let teleport = (1.0 - damping) / n_f32;

        let nodes: Vec<Uuid> = graph.nodes().cloned().collect();
        let mut scores: HashMap<Uuid, f32> = nodes.iter().map(|&id| (id, 1.0 / n_f32)).collect();
        let out_degrees: HashMap<Uuid, usize> = nodes.iter().map(|&id| (id, graph.out_degree(id))).collect();

        for _ in 0..self.config.max_iterations {
            let mut new_scores: HashMap<Uuid, f32> = HashMap::with_capacity(n);
            let mut max_diff: f32 = 0.0;

            for &node in &nodes {
                let incoming_sum: f32 = graph
                    .backward_targets(node)
                    .map(|source| {
                        let source_score = scores.get(&source).copied().unwrap_or(0.0);
                        let source_out = *out_degrees.get(&source).unwrap_or(&1) as f32;
                        source_score / source_out.max(1.0)
                    })
                    .sum();

                let new_score = teleport + damping * incoming_sum;
                let old_score = scores.get(&node).copied().unwrap_or(0.0);
                max_diff = max_diff.max((new_score - old_score).abs());
                new_scores.insert(node, new_score);
            }

            scores = new_scores;
            if max_diff < self.config.epsilon {
                break;
            }
        }

        let max_score = scores.values().cloned().fold(0.0f32, f32::max);
        if max_score > 0.0 {
            for score in scores.values_mut() {
                *score /= max_score;
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperforge_common::model::RelationshipType;

    fn rel_graph(edges: &[(Uuid, Uuid)]) -> Graph {
        use chrono::Utc;
        use paperforge_common::model::Relationship;
        use std::collections::HashMap as Map;

        let rels: Vec<Relationship> = edges
            .iter()
            .map(|&(source, target)| Relationship {
                id: Uuid::new_v4(),
                project_id: Uuid::nil(),
                source_id: source,
                target_id: target,
                relationship_type: RelationshipType::Cites,
                weight: 1.0,
                properties: Map::new(),
                evidence_spans: Vec::new(),
                evidence_chunk_ids: Vec::new(),
                first_seen_year: None,
                created_at: Utc::now(),
            })
            .collect();
        let nodes: std::collections::HashSet<Uuid> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
        Graph::from_relationships(nodes, &rels)
    }

    #[test]
    fn node_with_more_incoming_edges_ranks_higher() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let d = Uuid::from_u128(4);
        let graph = rel_graph(&[(a, b), (b, c), (d, b)]);

        let scorer = PageRankScorer::new(PageRankConfig::default());
        let scores = scorer.compute(&graph);

        assert!(scores[&b] > scores[&a]);
    }

    #[test]
    fn empty_graph_yields_no_scores() {
        let graph = Graph::new();
        let scorer = PageRankScorer::new(PageRankConfig::default());
        assert!(scorer.compute(&graph).is_empty());
    }
}
