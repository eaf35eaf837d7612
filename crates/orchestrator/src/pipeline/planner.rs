//! Stage 3 — Task planning: rule-based translation of (intent, entities)
//! into an ordered DAG of subtasks. No direct teacher analogue; grounded on
//! the reasoner's hop-loop control-flow style, applied up front instead of
//! interleaved with execution.

use super::concepts::ExtractedEntity;
use super::intent::QueryIntent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    Search,
    Retrieve,
    Analyze,
    Compare,
    AnalyzeGaps,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub id: usize,
    pub kind: SubtaskKind,
    pub depends_on: Vec<usize>,
    /// Injected when the intent explores relationships the resolver hasn't
    /// vetted yet — downstream execution should discount low-confidence edges.
    pub low_confidence_filter: bool,
    pub target_entity_ids: Vec<Uuid>,
}

pub fn plan_tasks(intent: QueryIntent, entities: &[ExtractedEntity]) -> Vec<Subtask> {
    let matched_ids: Vec<Uuid> = entities.iter().filter_map(|e| e.matched_id).collect();
    let low_confidence_filter = matches!(intent, QueryIntent::Explore | QueryIntent::IdentifyGaps);

    match intent {
        QueryIntent::Search => vec![
            task(0, SubtaskKind::Search, vec![], low_confidence_filter, matched_ids.clone()),
            task(1, SubtaskKind::Retrieve, vec![0], low_confidence_filter, matched_ids),
        ],
        QueryIntent::Explore => vec![
            task(0, SubtaskKind::Search, vec![], low_confidence_filter, matched_ids.clone()),
            task(1, SubtaskKind::Retrieve, vec![0], low_confidence_filter, matched_ids.clone()),
            task(2, SubtaskKind::Analyze, vec![1], low_confidence_filter, matched_ids),
        ],
        QueryIntent::Explain => vec![
            task(0, SubtaskKind::Retrieve, vec![], low_confidence_filter, matched_ids.clone()),
            task(1, SubtaskKind::Analyze, vec![0], low_confidence_filter, matched_ids),
        ],
        QueryIntent::Compare => {
            let halves = split_in_half(&matched_ids);
            vec![
                task(0, SubtaskKind::Retrieve, vec![], low_confidence_filter, halves.0),
                task(1, SubtaskKind::Retrieve, vec![], low_confidence_filter, halves.1),
                task(2, SubtaskKind::Compare, vec![0, 1], low_confidence_filter, matched_ids),
            ]
        }
        QueryIntent::Summarize => vec![
            task(0, SubtaskKind::Search, vec![], low_confidence_filter, matched_ids.clone()),
            task(1, SubtaskKind::Retrieve, vec![0], low_confidence_filter, matched_ids.clone()),
            task(2, SubtaskKind::Analyze, vec![1], low_confidence_filter, matched_ids),
        ],
        QueryIntent::IdentifyGaps => vec![task(0, SubtaskKind::AnalyzeGaps, vec![], low_confidence_filter, matched_ids)],
    }
}

fn task(id: usize, kind: SubtaskKind, depends_on: Vec<usize>, low_confidence_filter: bool, target_entity_ids: Vec<Uuid>) -> Subtask {
    Subtask { id, kind, depends_on, low_confidence_filter, target_entity_ids }
}

fn split_in_half(ids: &[Uuid]) -> (Vec<Uuid>, Vec<Uuid>) {
    let mid = ids.len() / 2;
    (ids[..mid].to_vec(), ids[mid..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_intent_produces_two_independent_retrieves_feeding_one_compare() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let entities: Vec<ExtractedEntity> = ids
            .iter()
            .map(|&id| ExtractedEntity { text: "x".to_string(), entity_type: None, matched_id: Some(id) })
            .collect();
        let tasks = plan_tasks(QueryIntent::Compare, &entities);
        assert_eq!(tasks.len(), 3);
        assert!(tasks[0].depends_on.is_empty());
        assert!(tasks[1].depends_on.is_empty());
        assert_eq!(tasks[2].depends_on, vec![0, 1]);
    }

    #[test]
    fn explore_intent_sets_low_confidence_filter() {
        let tasks = plan_tasks(QueryIntent::Explore, &[]);
        assert!(tasks.iter().all(|t| t.low_confidence_filter));
    }

    #[test]
    fn identify_gaps_is_a_single_standalone_task() {
        let tasks = plan_tasks(QueryIntent::IdentifyGaps, &[]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, SubtaskKind::AnalyzeGaps);
    }
}
