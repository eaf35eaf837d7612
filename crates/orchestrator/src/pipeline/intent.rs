//! Stage 1 — Intent: classifies the query into the closed intent set via a
//! few-shot LLM prompt, falling back to keyword heuristics when the LLM is
//! unavailable or returns something unparseable.

use paperforge_common::llm::{parse_json_cascade, LlmService};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Search,
    Explore,
    Explain,
    Compare,
    Summarize,
    IdentifyGaps,
}

pub struct IntentResult {
    pub intent: QueryIntent,
    pub confidence: f32,
    pub keywords: Vec<String>,
}

#[derive(Deserialize)]
struct IntentResponse {
    intent: String,
    confidence: f32,
}

const FEW_SHOT_SYSTEM: &str = "Classify the user's research-library query into exactly one of: \
    search, explore, explain, compare, summarize, identify_gaps.\n\
    Examples:\n\
    \"find papers about transformers\" -> search\n\
    \"what connects BERT and GPT\" -> explore\n\
    \"what is attention mechanism\" -> explain\n\
    \"compare CNN vs RNN for vision\" -> compare\n\
    \"summarize the state of the art in RL\" -> summarize\n\
    \"where are the under-explored connections in this literature\" -> identify_gaps\n\
    Respond as strict JSON: {\"intent\":\"...\",\"confidence\":0.0-1.0}.";

pub async fn classify_intent(query: &str, llm: Option<&LlmService>) -> IntentResult {
    let keywords = extract_keywords(query);

    if let Some(llm) = llm {
        match llm.generate(FEW_SHOT_SYSTEM, query, true).await {
            Ok(raw) => match parse_json_cascade::<IntentResponse>(&raw) {
                Ok(parsed) => {
                    if let Some(intent) = parse_intent(&parsed.intent) {
                        return IntentResult { intent, confidence: parsed.confidence.clamp(0.0, 1.0), keywords };
                    }
                    warn!(raw_intent = %parsed.intent, "LLM returned an unrecognized intent label, falling back to keywords");
                }
                Err(e) => warn!(error = %e, "intent classification JSON parse failed, falling back to keywords"),
            },
            Err(e) => warn!(error = %e, "intent classification LLM call failed, falling back to keywords"),
        }
    }

    let intent = classify_by_keywords(query);
    IntentResult { intent, confidence: 0.6, keywords }
}

fn parse_intent(raw: &str) -> Option<QueryIntent> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

fn classify_by_keywords(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();

    if lower.contains(" vs ") || lower.contains(" versus ") || lower.contains("compare") || lower.contains("difference between") {
        return QueryIntent::Compare;
    }
    if lower.contains("gap") || lower.contains("under-explored") || lower.contains("unexplored") || lower.contains("missing connection") {
        return QueryIntent::IdentifyGaps;
    }
    if lower.contains("summarize") || lower.contains("state of the art") || lower.contains("overview") || lower.contains("survey") {
        return QueryIntent::Summarize;
    }
    if lower.starts_with("what is") || lower.starts_with("what are") || lower.starts_with("explain") || lower.starts_with("why") {
        return QueryIntent::Explain;
    }
    if lower.contains("connect") || lower.contains("relate") || lower.contains("between") || lower.contains("how does") {
        return QueryIntent::Explore;
    }
    QueryIntent::Search
}

fn extract_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn compare_keyword_routes_to_compare_intent() {
        let result = classify_intent("Compare BERT vs GPT for classification", None).await;
        assert_eq!(result.intent, QueryIntent::Compare);
    }

    #[tokio::test]
    async fn gap_keyword_routes_to_identify_gaps() {
        let result = classify_intent("what are the under-explored connections here", None).await;
        assert_eq!(result.intent, QueryIntent::IdentifyGaps);
    }

    #[tokio::test]
    async fn default_without_keywords_is_search() {
        let result = classify_intent("transformers attention", None).await;
        assert_eq!(result.intent, QueryIntent::Search);
    }
}
