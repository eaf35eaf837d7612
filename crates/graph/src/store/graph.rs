//! In-memory typed graph: entities as nodes, relationships as directed
//! weighted edges. Generalizes the paper-citation adjacency shape to the
//! full entity/relationship model, with BFS traversal honoring a hop cap
//! and direction.

use paperforge_common::model::{Relationship, RelationshipType};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Forward,
    Backward,
    Both,
}

/// One step reached during a traversal: the neighbor, the hop at which it
/// was reached, and the edge weight × type-priority score that ranks it.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub entity_id: Uuid,
    pub hop: usize,
    pub score: f32,
}

/// Edge-type ranking weight used by graph-traversal retrieval: relationships
/// that assert direct semantic content (discusses/uses/supports) outrank
/// bookkeeping edges (mentions, authored-by) at equal edge weight.
pub fn type_priority(relationship_type: RelationshipType) -> f32 {
    use RelationshipType::*;
    match relationship_type {
        DiscussesConcept | UsesMethod | UsesDataset | HasFinding => 1.0,
        Supports | Contradicts | BridgesGap | PrerequisiteOf => 0.9,
        EvaluatedOn | UsedIn | Reports => 0.8,
        CoOccurs | SameAs => 0.6,
        Cites => 0.5,
        Mentions | AuthoredBy => 0.3,
    }
}

struct Edge {
    target: Uuid,
    relationship_type: RelationshipType,
    weight: f32,
}

/// In-memory representation of one project's entity/relationship graph.
#[derive(Default)]
pub struct Graph {
    outgoing: HashMap<Uuid, Vec<Edge>>,
    incoming: HashMap<Uuid, Vec<Edge>>,
    nodes: HashSet<Uuid>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_relationships(nodes: impl IntoIterator<Item = Uuid>, relationships: &[Relationship]) -> Self {
        let mut graph = Self::new();
        for id in nodes {
            graph.nodes.insert(id);
        }
        for rel in relationships {
            graph.add_edge(rel.source_id, rel.target_id, rel.relationship_type, rel.weight);
        }
        graph
    }

    pub fn add_edge(&mut self, source: Uuid, target: Uuid, relationship_type: RelationshipType, weight: f32) {
        self.nodes.insert(source);
        self.nodes.insert(target);
        self.outgoing.entry(source).or_default().push(Edge { target, relationship_type, weight });
        self.incoming.entry(target).or_default().push(Edge { target: source, relationship_type, weight });
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Uuid> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn out_degree(&self, id: Uuid) -> usize {
        self.outgoing.get(&id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, id: Uuid) -> usize {
        self.incoming.get(&id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn forward_targets(&self, id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.outgoing.get(&id).into_iter().flatten().map(|e| e.target)
    }

    pub fn backward_targets(&self, id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.incoming.get(&id).into_iter().flatten().map(|e| e.target)
    }

    /// BFS traversal up to `hop_cap`. `direction` picks which adjacency to
    /// follow at each step; `Both` unions forward and backward neighbors
    /// (the teacher's citation-graph traversal built the union but never
    /// actually returned it — this version does).
    pub fn traverse(&self, start: Uuid, hop_cap: usize, direction: TraversalDirection) -> Vec<TraversalHit> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((start, 0usize, 1.0f32));
        visited.insert(start);

        while let Some((current, hop, _)) = queue.pop_front() {
            if hop >= hop_cap {
                continue;
            }

            let neighbors: Vec<(Uuid, f32)> = match direction {
                TraversalDirection::Forward => self
                    .outgoing
                    .get(&current)
                    .into_iter()
                    .flatten()
                    .map(|e| (e.target, e.weight * type_priority(e.relationship_type)))
                    .collect(),
                TraversalDirection::Backward => self
                    .incoming
                    .get(&current)
                    .into_iter()
                    .flatten()
                    .map(|e| (e.target, e.weight * type_priority(e.relationship_type)))
                    .collect(),
                TraversalDirection::Both => {
                    let mut both: Vec<(Uuid, f32)> = self
                        .outgoing
                        .get(&current)
                        .into_iter()
                        .flatten()
                        .map(|e| (e.target, e.weight * type_priority(e.relationship_type)))
                        .collect();
                    both.extend(
                        self.incoming
                            .get(&current)
                            .into_iter()
                            .flatten()
                            .map(|e| (e.target, e.weight * type_priority(e.relationship_type))),
                    );
                    both
                }
            };

            for (neighbor, score) in neighbors {
                if visited.insert(neighbor) {
                    result.push(TraversalHit { entity_id: neighbor, hop: hop + 1, score });
                    queue.push_back((neighbor, hop + 1, score));
                }
            }
        }

        result.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn rel(source: Uuid, target: Uuid, rt: RelationshipType, weight: f32) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            source_id: source,
            target_id: target,
            relationship_type: rt,
            weight,
            properties: Map::new(),
            evidence_spans: Vec::new(),
            evidence_chunk_ids: Vec::new(),
            first_seen_year: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn forward_traversal_respects_hop_cap() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let rels = vec![
            rel(a, b, RelationshipType::DiscussesConcept, 1.0),
            rel(b, c, RelationshipType::DiscussesConcept, 1.0),
        ];
        let graph = Graph::from_relationships([a, b, c], &rels);

        let one_hop = graph.traverse(a, 1, TraversalDirection::Forward);
        assert_eq!(one_hop.len(), 1);
        assert_eq!(one_hop[0].entity_id, b);

        let two_hop = graph.traverse(a, 2, TraversalDirection::Forward);
        assert_eq!(two_hop.len(), 2);
    }

    #[test]
    fn both_direction_unions_forward_and_backward() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        // a cites b, c cites a — from a's perspective "both" reaches b (forward) and c (backward).
        let rels = vec![rel(a, b, RelationshipType::Cites, 1.0), rel(c, a, RelationshipType::Cites, 1.0)];
        let graph = Graph::from_relationships([a, b, c], &rels);

        let hits = graph.traverse(a, 1, TraversalDirection::Both);
        let reached: HashSet<Uuid> = hits.iter().map(|h| h.entity_id).collect();
        assert!(reached.contains(&b));
        assert!(reached.contains(&c));
    }
}
