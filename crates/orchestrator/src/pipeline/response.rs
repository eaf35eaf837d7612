//! Stage 6 — Response: turns the reasoning chain into a user-facing answer
//! with inline citations, highlighted node/edge ids, and suggested
//! follow-ups drawn from an intent-indexed table. Reuses the teacher's
//! citation-extraction regex, confidence formula shape, and mock-response
//! fallback for when no LLM is configured.

use super::execution::{SubtaskOutcome, SubtaskResult};
use super::intent::QueryIntent;
use super::reasoning::ReasoningResult;
use paperforge_common::llm::LlmService;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub index: usize,
    pub entity_id: Uuid,
    pub display_name: String,
    pub quote: String,
}

pub struct Response {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub highlighted_node_ids: Vec<Uuid>,
    pub highlighted_edge_ids: Vec<Uuid>,
    pub suggested_follow_ups: Vec<String>,
}

struct CitableSource {
    entity_id: Uuid,
    display_name: String,
    quote: String,
}

pub async fn synthesize(
    llm: Option<&LlmService>,
    query: &str,
    intent: QueryIntent,
    reasoning: &ReasoningResult,
    subtask_results: &[SubtaskResult],
) -> Response {
    let sources = citable_sources(subtask_results);

    let answer = match llm {
        Some(llm) => {
            let prompt = build_prompt(query, reasoning, &sources);
            match llm.generate("You are a research assistant. Answer using only the provided context, citing sources inline as [1], [2], etc.", &prompt, false).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "response synthesis LLM call failed, falling back to a mock answer");
                    mock_answer(query, reasoning)
                }
            }
        }
        None => mock_answer(query, reasoning),
    };

    let citations = extract_citations(&answer, &sources);
    let highlighted_node_ids = reasoning.supporting_node_ids.clone();
    let highlighted_edge_ids = reasoning.supporting_edge_ids.clone();
    let suggested_follow_ups = follow_ups_for(intent);

    Response { answer, citations, highlighted_node_ids, highlighted_edge_ids, suggested_follow_ups }
}

fn citable_sources(subtask_results: &[SubtaskResult]) -> Vec<CitableSource> {
    subtask_results
        .iter()
        .filter_map(|r| match &r.outcome {
            SubtaskOutcome::Retrieval(outcome) => Some(outcome.results.iter().map(|res| CitableSource {
                entity_id: res.entity_id,
                display_name: res.display_name.clone(),
                quote: res.evidence.first().cloned().unwrap_or_default(),
            })),
            _ => None,
        })
        .flatten()
        .collect()
}

fn build_prompt(query: &str, reasoning: &ReasoningResult, sources: &[CitableSource]) -> String {
    let mut prompt = format!("Question: {query}\n\nReasoning so far: {}\n\nSources:\n", reasoning.final_conclusion);
    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}: {}\n", i + 1, source.display_name, source.quote));
    }
    prompt.push_str("\nAnswer:");
    prompt
}

fn mock_answer(query: &str, reasoning: &ReasoningResult) -> String {
    format!(
        "Based on the available graph evidence, here is an answer to \"{query}\":\n\n{}\n\n\
        [Mock response — LLM API key not configured]",
        reasoning.final_conclusion
    )
}

fn extract_citations(answer: &str, sources: &[CitableSource]) -> Vec<Citation> {
    let pattern = Regex::new(r"\[(\d+)\]").expect("static citation regex is valid");
    let mut citations = Vec::new();

    for cap in pattern.captures_iter(answer) {
        let Some(idx) = cap.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else { continue };
        if idx == 0 || idx > sources.len() {
            continue;
        }
        if citations.iter().any(|c: &Citation| c.index == idx) {
            continue;
        }
        let source = &sources[idx - 1];
        citations.push(Citation {
            index: idx,
            entity_id: source.entity_id,
            display_name: source.display_name.clone(),
            quote: source.quote.chars().take(200).collect(),
        });
    }

    citations.sort_by_key(|c| c.index);
    citations
}

fn follow_ups_for(intent: QueryIntent) -> Vec<String> {
    match intent {
        QueryIntent::Search => vec![
            "Would you like to explore how these results connect to each other?".to_string(),
            "Want a summary of the broader area these results sit in?".to_string(),
        ],
        QueryIntent::Explore => vec![
            "Should I explain the strongest connection in more detail?".to_string(),
            "Would you like to compare the two most related concepts?".to_string(),
        ],
        QueryIntent::Explain => vec![
            "Want to see related methods or findings?".to_string(),
            "Should I compare this with an alternative approach?".to_string(),
        ],
        QueryIntent::Compare => vec![
            "Would you like a deeper breakdown of the tradeoffs?".to_string(),
            "Should I look for papers that bridge these two approaches?".to_string(),
        ],
        QueryIntent::Summarize => vec![
            "Want me to identify gaps in this area?".to_string(),
            "Should I drill into any specific finding?".to_string(),
        ],
        QueryIntent::IdentifyGaps => vec![
            "Would you like proposed research questions for the strongest gap?".to_string(),
            "Should I look for papers that already bridge part of this gap?".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_citations_ignores_out_of_range_indices() {
        let sources = vec![CitableSource { entity_id: Uuid::new_v4(), display_name: "A".to_string(), quote: "q".to_string() }];
        let citations = extract_citations("See [1] and [9]", &sources);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].index, 1);
    }

    #[test]
    fn follow_ups_are_non_empty_for_every_intent() {
        for intent in [
            QueryIntent::Search,
            QueryIntent::Explore,
            QueryIntent::Explain,
            QueryIntent::Compare,
            QueryIntent::Summarize,
            QueryIntent::IdentifyGaps,
        ] {
            assert!(!follow_ups_for(intent).is_empty());
        }
    }
}
