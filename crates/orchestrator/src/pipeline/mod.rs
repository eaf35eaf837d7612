pub mod concepts;
pub mod execution;
pub mod intent;
pub mod planner;
pub mod reasoning;
pub mod response;

use crate::context::QueryContext;
use concepts::{extract_concepts, ConceptExtractionResult};
use execution::execute_subtasks;
use intent::{classify_intent, QueryIntent};
use paperforge_common::config::OrchestratorConfig;
use paperforge_common::embeddings::Embedder;
use paperforge_common::llm::LlmService;
use paperforge_common::metrics::{self, StageMetrics};
use paperforge_graph::{GraphStore, RetrievalEngine, RetrievalStrategy, TraceStep};
use planner::plan_tasks;
use reasoning::reason;
use response::{synthesize, Citation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub highlighted_node_ids: Vec<Uuid>,
    pub highlighted_edge_ids: Vec<Uuid>,
    pub suggested_follow_ups: Vec<String>,
    pub intent: QueryIntent,
    pub search_strategy: Option<RetrievalStrategy>,
    pub retrieval_trace: Vec<TraceStep>,
    pub stage_timeouts: Vec<String>,
    pub stage_failures: Vec<String>,
}

/// Drives the six-stage query pipeline: intent, concept-extraction,
/// task-planning, query-execution, reasoning, response. Stages run strictly
/// in sequence; subtasks inside the execution stage may run concurrently
/// respecting their declared dependencies.
pub struct Orchestrator {
    store: Arc<GraphStore>,
    retrieval: Arc<RetrievalEngine>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<LlmService>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<GraphStore>,
        retrieval: Arc<RetrievalEngine>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<LlmService>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { store, retrieval, embedder, llm, config }
    }

    pub async fn query(&self, project_id: Uuid, text: &str, conversation_id: Option<Uuid>) -> QueryResponse {
        let overall_deadline = Duration::from_secs(self.config.overall_deadline_secs);
        let stage_timeout = Duration::from_secs(self.config.stage_timeout_secs);
        let started = Instant::now();
        let mut ctx = QueryContext::new(project_id, conversation_id);

        // Stage 1: intent
        let stage_metrics = StageMetrics::start("intent");
        let intent_result = match tokio::time::timeout(stage_timeout, classify_intent(text, self.llm.as_deref())).await {
            Ok(result) => {
                stage_metrics.finish(false);
                result
            }
            Err(_) => {
                stage_metrics.finish(true);
                ctx.record_timeout("intent");
                intent::IntentResult { intent: QueryIntent::Search, confidence: 0.0, keywords: Vec::new() }
            }
        };

        if started.elapsed() > overall_deadline {
            return self.degraded_response(ctx, intent_result.intent, text);
        }

        // Stage 2: concept extraction
        let stage_metrics = StageMetrics::start("concept_extraction");
        let concepts = match tokio::time::timeout(
            stage_timeout,
            extract_concepts(&self.store, self.embedder.as_ref(), project_id, text),
        )
        .await
        {
            Ok(Ok(result)) => {
                stage_metrics.finish(false);
                result
            }
            Ok(Err(e)) => {
                stage_metrics.finish(false);
                ctx.record_failure("concept_extraction");
                tracing::warn!(error = %e, "concept extraction failed");
                ConceptExtractionResult { entities: Vec::new(), keywords: intent_result.keywords.clone(), residual_query: text.to_string() }
            }
            Err(_) => {
                stage_metrics.finish(true);
                ctx.record_timeout("concept_extraction");
                ConceptExtractionResult { entities: Vec::new(), keywords: intent_result.keywords.clone(), residual_query: text.to_string() }
            }
        };

        if started.elapsed() > overall_deadline {
            return self.degraded_response(ctx, intent_result.intent, text);
        }

        // Stage 3: task planning (pure, synchronous, no timeout needed)
        let stage_metrics = StageMetrics::start("task_planning");
        let subtasks = plan_tasks(intent_result.intent, &concepts.entities);
        stage_metrics.finish(false);

        if started.elapsed() > overall_deadline {
            return self.degraded_response(ctx, intent_result.intent, text);
        }

        // Stage 4: query execution
        let stage_metrics = StageMetrics::start("query_execution");
        let (subtask_results, execution_trace) = match tokio::time::timeout(
            stage_timeout,
            execute_subtasks(&self.retrieval, &self.store, project_id, text, subtasks),
        )
        .await
        {
            Ok(outcome) => {
                stage_metrics.finish(false);
                outcome
            }
            Err(_) => {
                stage_metrics.finish(true);
                ctx.record_timeout("query_execution");
                (Vec::new(), Vec::new())
            }
        };
        ctx.extend_trace(execution_trace);

        if started.elapsed() > overall_deadline {
            return self.degraded_response(ctx, intent_result.intent, text);
        }

        // Stage 5: reasoning
        let stage_metrics = StageMetrics::start("reasoning");
        let reasoning_result = match tokio::time::timeout(stage_timeout, reason(self.llm.as_deref(), text, &subtask_results)).await {
            Ok(result) => {
                stage_metrics.finish(false);
                result
            }
            Err(_) => {
                stage_metrics.finish(true);
                ctx.record_timeout("reasoning");
                reasoning::ReasoningResult {
                    steps: Vec::new(),
                    final_conclusion: "reasoning stage timed out".to_string(),
                    confidence: 0.0,
                    supporting_node_ids: Vec::new(),
                    supporting_edge_ids: Vec::new(),
                }
            }
        };
        ctx.highlighted_node_ids.extend(reasoning_result.supporting_node_ids.iter().copied());
        ctx.highlighted_edge_ids.extend(reasoning_result.supporting_edge_ids.iter().copied());

        // Stage 6: response
        let stage_metrics = StageMetrics::start("response");
        let response = match tokio::time::timeout(
            stage_timeout,
            synthesize(self.llm.as_deref(), text, intent_result.intent, &reasoning_result, &subtask_results),
        )
        .await
        {
            Ok(response) => {
                stage_metrics.finish(false);
                response
            }
            Err(_) => {
                stage_metrics.finish(true);
                ctx.record_timeout("response");
                response::Response {
                    answer: "The response stage timed out before an answer could be generated.".to_string(),
                    citations: Vec::new(),
                    highlighted_node_ids: ctx.highlighted_node_ids.iter().copied().collect(),
                    highlighted_edge_ids: ctx.highlighted_edge_ids.iter().copied().collect(),
                    suggested_follow_ups: Vec::new(),
                }
            }
        };

        let search_strategy = subtask_results.iter().find_map(|r| match &r.outcome {
            execution::SubtaskOutcome::Retrieval(outcome) => Some(outcome.strategy_used),
            _ => None,
        });

        metrics::record_query();

        QueryResponse {
            answer: response.answer,
            citations: response.citations,
            highlighted_node_ids: response.highlighted_node_ids,
            highlighted_edge_ids: response.highlighted_edge_ids,
            suggested_follow_ups: response.suggested_follow_ups,
            intent: intent_result.intent,
            search_strategy,
            retrieval_trace: ctx.trace,
            stage_timeouts: ctx.stage_timeouts,
            stage_failures: ctx.stage_failures,
        }
    }

    /// Built when the overall deadline is exceeded partway through the
    /// pipeline: whatever trace exists so far, no answer text beyond a
    /// degraded notice.
    fn degraded_response(&self, ctx: QueryContext, intent: QueryIntent, _text: &str) -> QueryResponse {
        let mut stage_timeouts = ctx.stage_timeouts;
        stage_timeouts.push("overall_deadline".to_string());
        QueryResponse {
            answer: "The query exceeded its overall time budget before a complete answer could be produced.".to_string(),
            citations: Vec::new(),
            highlighted_node_ids: ctx.highlighted_node_ids.into_iter().collect(),
            highlighted_edge_ids: ctx.highlighted_edge_ids.into_iter().collect(),
            suggested_follow_ups: Vec::new(),
            intent,
            search_strategy: None,
            retrieval_trace: ctx.trace,
            stage_timeouts,
            stage_failures: ctx.stage_failures,
        }
    }
}
