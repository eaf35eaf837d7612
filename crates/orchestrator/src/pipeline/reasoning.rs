//! Stage 5 — Reasoning: chain-of-thought synthesis over the subtask
//! results. The LLM is primary; an unavailable or failing LLM falls back to
//! a deterministic structured summary built the same way the teacher's
//! hop-confidence heuristic scores raw search results.

use super::execution::{SubtaskOutcome, SubtaskResult};
use super::planner::SubtaskKind;
use paperforge_common::llm::{parse_json_cascade, LlmService};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub n: usize,
    pub description: String,
    pub evidence: Vec<String>,
    pub conclusion: String,
}

pub struct ReasoningResult {
    pub steps: Vec<ReasoningStep>,
    pub final_conclusion: String,
    pub confidence: f32,
    pub supporting_node_ids: Vec<Uuid>,
    pub supporting_edge_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct SynthesisResponse {
    final_conclusion: String,
    confidence: f32,
}

pub async fn reason(llm: Option<&LlmService>, query: &str, subtask_results: &[SubtaskResult]) -> ReasoningResult {
    let steps = build_steps(subtask_results);
    let supporting_node_ids = steps_node_ids(subtask_results);

    if let Some(llm) = llm {
        let system = "You are a research assistant performing chain-of-thought reasoning over \
                      retrieved graph evidence. Given the steps already taken, write one final \
                      conclusion for the user's question. Respond as strict JSON: \
                      {\"final_conclusion\":\"...\",\"confidence\":0.0-1.0}.";
        let user = format!("Question: {query}\n\nSteps taken:\n{}", render_steps(&steps));

        match llm.generate(system, &user, true).await {
            Ok(raw) => match parse_json_cascade::<SynthesisResponse>(&raw) {
                Ok(parsed) => {
                    return ReasoningResult {
                        steps,
                        final_conclusion: parsed.final_conclusion,
                        confidence: parsed.confidence.clamp(0.0, 1.0),
                        supporting_node_ids,
                        supporting_edge_ids: Vec::new(),
                    };
                }
                Err(e) => warn!(error = %e, "reasoning synthesis JSON parse failed, falling back to structured summary"),
            },
            Err(e) => warn!(error = %e, "reasoning synthesis LLM call failed, falling back to structured summary"),
        }
    }

    let (final_conclusion, confidence) = structured_summary(&steps, subtask_results);
    ReasoningResult { steps, final_conclusion, confidence, supporting_node_ids, supporting_edge_ids: Vec::new() }
}

fn build_steps(subtask_results: &[SubtaskResult]) -> Vec<ReasoningStep> {
    subtask_results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let (description, evidence, conclusion) = match &result.outcome {
                SubtaskOutcome::Retrieval(outcome) => {
                    let description = format!(
                        "{:?} via {:?} returned {} result(s)",
                        result.kind,
                        outcome.strategy_used,
                        outcome.results.len()
                    );
                    let evidence: Vec<String> = outcome.results.iter().flat_map(|r| r.evidence.clone()).collect();
                    let conclusion = outcome
                        .results
                        .first()
                        .map(|r| format!("most relevant: {}", r.display_name))
                        .unwrap_or_else(|| "no relevant entities found".to_string());
                    (description, evidence, conclusion)
                }
                SubtaskOutcome::Gaps(gaps) => {
                    let description = format!("{:?} found {} structural gap(s)", result.kind, gaps.len());
                    let evidence = gaps.iter().flat_map(|g| g.research_questions.clone()).collect();
                    let conclusion = gaps
                        .iter()
                        .max_by(|a, b| a.gap_strength.partial_cmp(&b.gap_strength).unwrap_or(std::cmp::Ordering::Equal))
                        .map(|g| format!("weakest inter-cluster connection has strength {:.3}", g.gap_strength))
                        .unwrap_or_else(|| "no structural gaps detected".to_string());
                    (description, evidence, conclusion)
                }
                SubtaskOutcome::Failed { reason } => {
                    (format!("{:?} failed", result.kind), Vec::new(), format!("unavailable: {reason}"))
                }
            };
            ReasoningStep { n: i + 1, description, evidence, conclusion }
        })
        .collect()
}

fn steps_node_ids(subtask_results: &[SubtaskResult]) -> Vec<Uuid> {
    subtask_results
        .iter()
        .filter_map(|r| match &r.outcome {
            SubtaskOutcome::Retrieval(outcome) => Some(outcome.results.iter().map(|res| res.entity_id).collect::<Vec<_>>()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn render_steps(steps: &[ReasoningStep]) -> String {
    steps.iter().map(|s| format!("{}. {} -> {}", s.n, s.description, s.conclusion)).collect::<Vec<_>>().join("\n")
}

/// Mirrors the teacher's hop-confidence formula: average result relevance
/// combined with how much of the step budget actually produced evidence.
fn structured_summary(steps: &[ReasoningStep], subtask_results: &[SubtaskResult]) -> (String, f32) {
    if steps.is_empty() {
        return ("No subtasks were executed for this query.".to_string(), 0.0);
    }

    let conclusion = steps.iter().map(|s| s.conclusion.clone()).collect::<Vec<_>>().join(" ");

    let failed = subtask_results.iter().filter(|r| matches!(r.outcome, SubtaskOutcome::Failed { .. })).count();
    let success_rate = 1.0 - (failed as f32 / subtask_results.len().max(1) as f32);

    let per_subtask_scores: Vec<f32> = subtask_results
        .iter()
        .filter_map(|r| match &r.outcome {
            SubtaskOutcome::Retrieval(outcome) if !outcome.results.is_empty() => {
                Some(outcome.results.iter().map(|res| res.score).sum::<f32>() / outcome.results.len() as f32)
            }
            _ => None,
        })
        .collect();
    let avg_score = if per_subtask_scores.is_empty() {
        0.3
    } else {
        per_subtask_scores.iter().sum::<f32>() / per_subtask_scores.len() as f32
    };

    let confidence = ((success_rate + avg_score) / 2.0).clamp(0.0, 1.0);
    (conclusion, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_summary_of_no_steps_has_zero_confidence() {
        let (_, confidence) = structured_summary(&[], &[]);
        assert_eq!(confidence, 0.0);
    }
}
