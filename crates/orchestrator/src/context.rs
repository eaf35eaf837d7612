//! The append-only record threaded through all six pipeline stages: a
//! conversation id, the project scope, and the accumulated highlighted-entity
//! set and trace steps every stage contributes to.

use paperforge_graph::TraceStep;
use std::collections::HashSet;
use uuid::Uuid;

pub struct QueryContext {
    pub conversation_id: Option<Uuid>,
    pub project_id: Uuid,
    pub highlighted_node_ids: HashSet<Uuid>,
    pub highlighted_edge_ids: HashSet<Uuid>,
    pub trace: Vec<TraceStep>,
    pub stage_timeouts: Vec<String>,
    pub stage_failures: Vec<String>,
}

impl QueryContext {
    pub fn new(project_id: Uuid, conversation_id: Option<Uuid>) -> Self {
        Self {
            conversation_id,
            project_id,
            highlighted_node_ids: HashSet::new(),
            highlighted_edge_ids: HashSet::new(),
            trace: Vec::new(),
            stage_timeouts: Vec::new(),
            stage_failures: Vec::new(),
        }
    }

    pub fn record_timeout(&mut self, stage: &str) {
        self.stage_timeouts.push(stage.to_string());
    }

    pub fn record_failure(&mut self, stage: &str) {
        self.stage_failures.push(stage.to_string());
    }

    pub fn extend_trace(&mut self, steps: Vec<TraceStep>) {
        let offset = self.trace.len();
        for (i, mut step) in steps.into_iter().enumerate() {
            step.index = offset + i;
            self.trace.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: &str) -> TraceStep {
        TraceStep { index: 0, action: action.to_string(), node_ids: Vec::new(), thought: String::new(), duration_ms: 0 }
    }

    #[test]
    fn extend_trace_reindexes_appended_steps_by_running_total() {
        let mut ctx = QueryContext::new(Uuid::new_v4(), None);
        ctx.extend_trace(vec![step("a"), step("b")]);
        ctx.extend_trace(vec![step("c")]);
        let indices: Vec<usize> = ctx.trace.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn record_timeout_and_failure_append_distinct_markers() {
        let mut ctx = QueryContext::new(Uuid::new_v4(), None);
        ctx.record_timeout("intent");
        ctx.record_failure("concept_extraction");
        assert_eq!(ctx.stage_timeouts, vec!["intent".to_string()]);
        assert_eq!(ctx.stage_failures, vec!["concept_extraction".to_string()]);
    }
}
