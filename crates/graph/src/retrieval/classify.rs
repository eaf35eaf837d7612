use super::RetrievalStrategy;
use paperforge_common::llm::{parse_json_cascade, LlmService};
use serde::Deserialize;
use tracing::warn;

const GRAPH_KEYWORDS: &[&str] = &["find", "list", "show", "which", "what papers", "who"];
const VECTOR_KEYWORDS: &[&str] = &["similar", "like", "about", "related to"];

#[derive(Deserialize)]
struct ClassificationResponse {
    strategy: String,
}

/// Routes a query to a retrieval strategy: a fast keyword heuristic first,
/// falling back to the LLM only when the query matches neither keyword set.
/// An unavailable or unparseable LLM response defaults to `Hybrid` rather
/// than failing the retrieval outright.
pub async fn classify_strategy(query: &str, llm: Option<&LlmService>) -> RetrievalStrategy {
    let lower = query.to_lowercase();

    if GRAPH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return RetrievalStrategy::GraphTraversal;
    }
    if VECTOR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return RetrievalStrategy::Vector;
    }

    let Some(llm) = llm else { return RetrievalStrategy::Hybrid };

    let system = "Classify the retrieval strategy best suited to the user's query. \
                  Respond as strict JSON: {\"strategy\":\"vector\"|\"graph_traversal\"|\"hybrid\"}.";
    let raw = match llm.generate(system, query, true).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "strategy classification LLM call failed, defaulting to hybrid");
            return RetrievalStrategy::Hybrid;
        }
    };

    match parse_json_cascade::<ClassificationResponse>(&raw) {
        Ok(parsed) => match parsed.strategy.as_str() {
            "vector" => RetrievalStrategy::Vector,
            "graph_traversal" => RetrievalStrategy::GraphTraversal,
            _ => RetrievalStrategy::Hybrid,
        },
        Err(e) => {
            warn!(error = %e, "strategy classification JSON parse failed, defaulting to hybrid");
            RetrievalStrategy::Hybrid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_keyword_routes_to_graph_traversal() {
        assert_eq!(classify_strategy("find papers that discuss transformers", None).await, RetrievalStrategy::GraphTraversal);
    }

    #[tokio::test]
    async fn similar_keyword_routes_to_vector() {
        assert_eq!(classify_strategy("papers similar to attention is all you need", None).await, RetrievalStrategy::Vector);
    }

    #[tokio::test]
    async fn ambiguous_query_without_llm_defaults_to_hybrid() {
        assert_eq!(classify_strategy("transformers", None).await, RetrievalStrategy::Hybrid);
    }
}
