use serde::{Deserialize, Serialize};

/// Which retrieval path a query was routed through. Persisted alongside the
/// trace so a later reviewer can tell why a given result set looks the way
/// it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Vector,
    GraphTraversal,
    Hybrid,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Vector => "vector",
            RetrievalStrategy::GraphTraversal => "graph_traversal",
            RetrievalStrategy::Hybrid => "hybrid",
        }
    }
}
