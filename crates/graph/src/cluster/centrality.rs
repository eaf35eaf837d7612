//! Degree and sampled-betweenness centrality over the project graph.
//! PageRank lives in `pagerank.rs`; this module covers the two metrics
//! spec adds on top of it.

use crate::store::Graph;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Graphs larger than this switch betweenness to source-sampling; exact
/// Brandes on every node is O(n*m) and not worth it past a few hundred nodes.
const BETWEENNESS_SAMPLE_THRESHOLD: usize = 200;
const BETWEENNESS_SAMPLE_SIZE: usize = 64;

/// Degree centrality normalized to `[0, 1]` by the largest observed degree
/// in the project (undirected: in + out).
pub fn degree_centrality(graph: &Graph) -> HashMap<Uuid, f32> {
    let nodes: Vec<Uuid> = graph.nodes().cloned().collect();
    let raw: HashMap<Uuid, usize> =
        nodes.iter().map(|&id| (id, graph.in_degree(id) + graph.out_degree(id))).collect();
    let max_degree = raw.values().cloned().max().unwrap_or(0) as f32;

    if max_degree == 0.0 {
        return nodes.into_iter().map(|id| (id, 0.0)).collect();
    }
    raw.into_iter().map(|(id, d)| (id, d as f32 / max_degree)).collect()
}

fn undirected_adjacency(graph: &Graph) -> HashMap<Uuid, Vec<Uuid>> {
    let mut adjacency: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for &node in graph.nodes() {
        let neighbors = adjacency.entry(node).or_default();
        for target in graph.forward_targets(node) {
            neighbors.insert(target);
        }
        for target in graph.backward_targets(node) {
            neighbors.insert(target);
        }
    }
    // Symmetrize: A reaching B doesn't guarantee B's own adjacency entry has A yet.
    let mut symmetric: HashMap<Uuid, HashSet<Uuid>> = adjacency.clone();
    for (&node, neighbors) in &adjacency {
        for &neighbor in neighbors {
            symmetric.entry(neighbor).or_default().insert(node);
        }
    }
    symmetric.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
}

/// Brandes' betweenness centrality (unweighted shortest paths, undirected).
/// Samples source nodes on large graphs and scales the result back up —
/// an unbiased estimator of true betweenness.
pub fn betweenness_centrality(graph: &Graph) -> HashMap<Uuid, f32> {
    let nodes: Vec<Uuid> = graph.nodes().cloned().collect();
    let n = nodes.len();
    let mut scores: HashMap<Uuid, f32> = nodes.iter().map(|&id| (id, 0.0)).collect();
    if n < 3 {
        return scores;
    }

    let adjacency = undirected_adjacency(graph);

    let sources: Vec<Uuid> = if n > BETWEENNESS_SAMPLE_THRESHOLD {
        nodes.iter().step_by((n / BETWEENNESS_SAMPLE_SIZE).max(1)).cloned().collect()
    } else {
        nodes.clone()
    };
    let scale = if sources.len() < n { n as f32 / sources.len() as f32 } else { 1.0 };

    for &source in &sources {
        let mut stack = Vec::new();
        let mut predecessors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut sigma: HashMap<Uuid, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();
        let mut distance: HashMap<Uuid, i64> = nodes.iter().map(|&id| (id, -1)).collect();
        sigma.insert(source, 1.0);
        distance.insert(source, 0);

        let mut queue = VecDeque::new();
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in adjacency.get(&v).into_iter().flatten() {
                if distance[&w] < 0 {
                    distance.insert(w, distance[&v] + 1);
                    queue.push_back(w);
                }
                if distance[&w] == distance[&v] + 1 {
                    *sigma.get_mut(&w).unwrap() += sigma[&v];
                    predecessors.entry(w).or_default().push(v);
                }
            }
        }

        let mut delta: HashMap<Uuid, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();
        while let Some(w) = stack.pop() {
            for &v in predecessors.get(&w).into_iter().flatten() {
                let contribution = (sigma[&v] / sigma[&w]) * (1.0 + delta[&w]);
                *delta.get_mut(&v).unwrap() += contribution;
            }
            if w != source {
                *scores.get_mut(&w).unwrap() += (delta[&w] as f32) * scale;
            }
        }
    }

    // Normalize by the theoretical max for an undirected graph: (n-1)(n-2).
    let max_pairs = ((n as f32 - 1.0) * (n as f32 - 2.0)).max(1.0);
    for score in scores.values_mut() {
        *score = (*score / max_pairs).min(1.0);
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paperforge_common::model::{Relationship, RelationshipType};
    use std::collections::HashMap as Map;

    fn rel(source: Uuid, target: Uuid) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            source_id: source,
            target_id: target,
            relationship_type: RelationshipType::DiscussesConcept,
            weight: 1.0,
            properties: Map::new(),
            evidence_spans: Vec::new(),
            evidence_chunk_ids: Vec::new(),
            first_seen_year: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn degree_centrality_normalizes_to_one_at_max() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let rels = vec![rel(a, b), rel(a, c)];
        let nodes: HashSet<Uuid> = [a, b, c].into_iter().collect();
        let graph = Graph::from_relationships(nodes, &rels);

        let scores = degree_centrality(&graph);
        assert_eq!(scores[&a], 1.0);
        assert!(scores[&b] < 1.0);
    }

    #[test]
    fn bridge_node_has_highest_betweenness_on_a_path_graph() {
        // a - b - c: b sits on every shortest path between a and c.
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let rels = vec![rel(a, b), rel(b, c)];
        let nodes: HashSet<Uuid> = [a, b, c].into_iter().collect();
        let graph = Graph::from_relationships(nodes, &rels);

        let scores = betweenness_centrality(&graph);
        assert!(scores[&b] > scores[&a]);
        assert!(scores[&b] > scores[&c]);
    }
}
