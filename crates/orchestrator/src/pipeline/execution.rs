//! Stage 4 — Query execution: runs the planned subtask DAG, calling the
//! Retrieval Engine or Graph Store per subtask. A subtask whose dependency
//! failed produces an explicit `Failed` outcome rather than panicking or
//! aborting the remaining DAG, so the pipeline always proceeds with whatever
//! partial results it has.

use super::planner::{Subtask, SubtaskKind};
use paperforge_common::model::StructuralGap;
use paperforge_graph::{GraphStore, RetrievalEngine, RetrievalOutcome, RetrievalStrategy, TraceStep};
use std::collections::HashMap;
use uuid::Uuid;

pub enum SubtaskOutcome {
    Retrieval(RetrievalOutcome),
    Gaps(Vec<StructuralGap>),
    Failed { reason: String },
}

pub struct SubtaskResult {
    pub subtask_id: usize,
    pub kind: SubtaskKind,
    pub outcome: SubtaskOutcome,
}

pub async fn execute_subtasks(
    retrieval: &RetrievalEngine,
    store: &GraphStore,
    project_id: Uuid,
    query_text: &str,
    subtasks: Vec<Subtask>,
) -> (Vec<SubtaskResult>, Vec<TraceStep>) {
    let mut results: HashMap<usize, SubtaskResult> = HashMap::new();
    let mut trace = Vec::new();

    for level in topological_levels(&subtasks) {
        let mut level_results = Vec::new();
        for subtask in level {
            let blocked = subtask.depends_on.iter().any(|dep| {
                matches!(results.get(dep).map(|r| &r.outcome), Some(SubtaskOutcome::Failed { .. }))
            });

            let outcome = if blocked {
                SubtaskOutcome::Failed { reason: "a dependency subtask failed".to_string() }
            } else {
                run_subtask(retrieval, store, project_id, query_text, &subtask).await
            };

            if let SubtaskOutcome::Retrieval(ref outcome) = outcome {
                trace.extend(outcome.trace.iter().cloned());
            }

            level_results.push(SubtaskResult { subtask_id: subtask.id, kind: subtask.kind, outcome });
        }
        for result in level_results {
            results.insert(result.subtask_id, result);
        }
    }

    let mut ordered: Vec<SubtaskResult> = results.into_values().collect();
    ordered.sort_by_key(|r| r.subtask_id);
    (ordered, trace)
}

async fn run_subtask(
    retrieval: &RetrievalEngine,
    store: &GraphStore,
    project_id: Uuid,
    query_text: &str,
    subtask: &Subtask,
) -> SubtaskOutcome {
    match subtask.kind {
        SubtaskKind::Search | SubtaskKind::Retrieve | SubtaskKind::Analyze | SubtaskKind::Compare => {
            let strategy = if subtask.kind == SubtaskKind::Search { Some(RetrievalStrategy::Vector) } else { None };
            match retrieval
                .retrieve_scoped(
                    query_text,
                    project_id,
                    strategy,
                    None,
                    &subtask.target_entity_ids,
                    subtask.low_confidence_filter,
                )
                .await
            {
                Ok(outcome) => SubtaskOutcome::Retrieval(outcome),
                Err(e) => direct_fallback(store, project_id, query_text, e.to_string()).await,
            }
        }
        SubtaskKind::AnalyzeGaps => match store.repository().gaps_by_project(project_id, None).await {
            Ok(rows) => SubtaskOutcome::Gaps(rows.into_iter().filter_map(row_to_gap).collect()),
            Err(e) => SubtaskOutcome::Failed { reason: e.to_string() },
        },
    }
}

/// Direct-DB fallback: when the Retrieval Engine's pipeline fails (e.g. an
/// embedding-provider outage), fall back to a plain substring search against
/// the repository rather than failing the subtask outright.
async fn direct_fallback(store: &GraphStore, project_id: Uuid, query_text: &str, reason: String) -> SubtaskOutcome {
    match store.entity_substring_search(project_id, query_text, 5).await {
        Ok(hits) if !hits.is_empty() => SubtaskOutcome::Retrieval(RetrievalOutcome {
            results: hits
                .into_iter()
                .map(|h| paperforge_graph::RetrievalResult {
                    entity_id: h.entity_id,
                    display_name: h.display_name,
                    entity_type: h.entity_type,
                    score: h.score as f32,
                    provenance_source: paperforge_common::model::ProvenanceSource::TextSearch,
                    evidence: Vec::new(),
                })
                .collect(),
            trace: Vec::new(),
            strategy_used: RetrievalStrategy::GraphTraversal,
        }),
        _ => SubtaskOutcome::Failed { reason },
    }
}

fn row_to_gap(row: paperforge_common::db::models::Gap) -> Option<StructuralGap> {
    Some(StructuralGap {
        id: row.id,
        project_id: row.project_id,
        cluster_a_id: row.cluster_a_id,
        cluster_b_id: row.cluster_b_id,
        concept_ids_a: serde_json::from_value(row.concept_ids_a).ok()?,
        concept_ids_b: serde_json::from_value(row.concept_ids_b).ok()?,
        gap_strength: row.gap_strength,
        semantic_distance: row.semantic_distance,
        bridge_candidates: serde_json::from_value(row.bridge_candidates).ok()?,
        research_questions: serde_json::from_value(row.research_questions).ok()?,
        ghost_edges: serde_json::from_value(row.ghost_edges).ok()?,
        status: serde_json::from_value(serde_json::Value::String(row.status)).ok()?,
        created_at: row.created_at.with_timezone(&chrono::Utc),
    })
}

/// Groups subtasks into dependency levels so every subtask in a level has
/// already had its dependencies resolved by an earlier level.
fn topological_levels(subtasks: &[Subtask]) -> Vec<Vec<Subtask>> {
    let mut remaining: Vec<Subtask> = subtasks.to_vec();
    let mut done: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, rest): (Vec<Subtask>, Vec<Subtask>) =
            remaining.into_iter().partition(|t| t.depends_on.iter().all(|d| done.contains(d)));
        if ready.is_empty() {
            // Cyclic or malformed DAG; drain the rest as a final level rather than looping forever.
            levels.push(rest);
            break;
        }
        for t in &ready {
            done.insert(t.id);
        }
        levels.push(ready);
        remaining = rest;
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::planner::SubtaskKind;

    fn subtask(id: usize, depends_on: Vec<usize>) -> Subtask {
        Subtask { id, kind: SubtaskKind::Retrieve, depends_on, low_confidence_filter: false, target_entity_ids: Vec::new() }
    }

    #[test]
    fn independent_subtasks_land_in_the_same_level() {
        let subtasks = vec![subtask(0, vec![]), subtask(1, vec![])];
        let levels = topological_levels(&subtasks);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].len(), 2);
    }

    #[test]
    fn a_dependent_subtask_lands_in_a_later_level() {
        let subtasks = vec![subtask(0, vec![]), subtask(1, vec![0]), subtask(2, vec![1])];
        let levels = topological_levels(&subtasks);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0][0].id, 0);
        assert_eq!(levels[1][0].id, 1);
        assert_eq!(levels[2][0].id, 2);
    }

    #[test]
    fn a_cyclic_dag_drains_as_a_final_level_instead_of_looping_forever() {
        let subtasks = vec![subtask(0, vec![1]), subtask(1, vec![0])];
        let levels = topological_levels(&subtasks);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].len(), 2);
    }

    #[tokio::test]
    async fn a_failed_dependency_propagates_to_its_dependent_without_running_it() {
        // Build results as if level 0 already ran and subtask 0 failed, then run level 1
        // through the same blocked-check logic execute_subtasks uses.
        let mut results: HashMap<usize, SubtaskResult> = HashMap::new();
        results.insert(
            0,
            SubtaskResult { subtask_id: 0, kind: SubtaskKind::Search, outcome: SubtaskOutcome::Failed { reason: "boom".to_string() } },
        );
        let dependent = subtask(1, vec![0]);
        let blocked = dependent
            .depends_on
            .iter()
            .any(|dep| matches!(results.get(dep).map(|r| &r.outcome), Some(SubtaskOutcome::Failed { .. })));
        assert!(blocked);
    }
}
