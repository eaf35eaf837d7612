use crate::store::GraphStore;
use paperforge_common::db::models::EntityRow;
use paperforge_common::llm::{parse_json_cascade, LlmService};
use paperforge_common::model::ProvenanceSource;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const TEXT_SEARCH_LIMIT: usize = 3;

#[derive(Deserialize)]
struct ExplanationResponse {
    explanation: String,
}

/// Four-tier evidence cascade: each tier only runs if the previous one came
/// back empty, and the first non-empty tier stamps the result's
/// `ProvenanceSource`. A result with no evidence at any tier is stamped
/// `AiExplanation` with an empty evidence list rather than failing.
pub async fn evidence_for(
    store: &GraphStore,
    llm: &Option<Arc<LlmService>>,
    project_id: Uuid,
    row: &EntityRow,
) -> (ProvenanceSource, Vec<String>) {
    if let Some(spans) = relationship_evidence(store, row.id).await {
        return (ProvenanceSource::RelationshipEvidence, spans);
    }

    let source_chunk_ids = row.source_chunk_ids_vec();
    if !source_chunk_ids.is_empty() {
        return (
            ProvenanceSource::SourceChunkIds,
            source_chunk_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    match store.repository().chunk_substring_search(project_id, &row.display_name, TEXT_SEARCH_LIMIT).await {
        Ok(hits) if !hits.is_empty() => {
            return (ProvenanceSource::TextSearch, hits.into_iter().map(|h| h.text).collect());
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, entity_id = %row.id, "text-search evidence tier failed"),
    }

    let explanation = ai_explanation(llm, row).await;
    (ProvenanceSource::AiExplanation, explanation.into_iter().collect())
}

/// Tier 1: evidence spans attached to relationships touching this entity,
/// in either direction.
async fn relationship_evidence(store: &GraphStore, entity_id: Uuid) -> Option<Vec<String>> {
    let (outgoing, incoming) = store.repository().relationships_for_entity(entity_id).await.ok()?;
    let spans: Vec<String> = outgoing
        .iter()
        .chain(incoming.iter())
        .filter_map(|r| serde_json::from_value::<Vec<String>>(r.evidence_spans.clone()).ok())
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if spans.is_empty() {
        None
    } else {
        Some(spans)
    }
}

/// Tier 4, optional-enhancement: asks the LLM to explain why this entity is
/// relevant when nothing more concrete was found. Non-fatal on any failure.
async fn ai_explanation(llm: &Option<Arc<LlmService>>, row: &EntityRow) -> Option<String> {
    let llm = llm.as_ref()?;
    let system = "Explain in one sentence why this concept is relevant, based only on its \
                  name and definition. Respond as strict JSON: {\"explanation\":\"...\"}.";
    let user = format!(
        "Name: {}\nDefinition: {}",
        row.display_name,
        row.definition.as_deref().unwrap_or("(none)")
    );

    let raw = match llm.generate(system, &user, true).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, entity_id = %row.id, "ai-explanation evidence tier failed");
            return None;
        }
    };

    match parse_json_cascade::<ExplanationResponse>(&raw) {
        Ok(parsed) => Some(parsed.explanation),
        Err(e) => {
            warn!(error = %e, entity_id = %row.id, "ai-explanation JSON parse failed");
            None
        }
    }
}
