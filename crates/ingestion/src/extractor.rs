//! Entity extractor: turns paper text into typed entities and relationships.
//! Two modes — abstract-only (default) and section-aware (gated by
//! `enable_lexical_graph`) — both funnel through the LLM service's JSON-mode
//! contract and the four-strategy parse cascade.

use chrono::Utc;
use paperforge_common::llm::{parse_json_cascade, LlmService};
use paperforge_common::model::{Entity, EntityType, Relationship, RelationshipType, SectionType};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Accumulated output of one extraction call, plus the statistics the ingest
/// pipeline folds into the job's reliability summary.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub json_parse_failures: u32,
}

impl ExtractionResult {
    fn merge(&mut self, other: ExtractionResult) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
        self.json_parse_failures += other.json_parse_failures;
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawExtractedEntity {
    name: String,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    evidence: Option<String>,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Default)]
struct AbstractExtractionResponse {
    #[serde(default)]
    concepts: Vec<RawExtractedEntity>,
    #[serde(default)]
    methods: Vec<RawExtractedEntity>,
    #[serde(default)]
    findings: Vec<RawExtractedEntity>,
}

#[derive(Debug, Deserialize, Default)]
struct SectionExtractionResponse {
    #[serde(default)]
    entities: Vec<SectionRawEntity>,
}

#[derive(Debug, Deserialize, Default)]
struct SectionRawEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    evidence: Option<String>,
}

pub struct EntityExtractor {
    llm: Arc<LlmService>,
    enable_lexical_graph: bool,
}

impl EntityExtractor {
    pub fn new(llm: Arc<LlmService>, enable_lexical_graph: bool) -> Self {
        Self {
            llm,
            enable_lexical_graph,
        }
    }

    pub fn lexical_graph_enabled(&self) -> bool {
        self.enable_lexical_graph
    }

    fn new_entity(
        &self,
        project_id: Uuid,
        entity_type: EntityType,
        raw: RawExtractedEntity,
        section: &str,
        chunk_id: Uuid,
    ) -> Option<Entity> {
        let name = raw.name.trim();
        if name.is_empty() {
            return None;
        }
        let normalized = paperforge_common::model::normalize_name(name);
        let now = Utc::now();
        Some(Entity {
            id: Uuid::new_v4(),
            project_id,
            entity_type,
            display_name: name.to_string(),
            normalized_name: normalized,
            definition: raw.definition,
            properties: HashMap::from([(
                "confidence".to_string(),
                serde_json::json!(raw.confidence.clamp(0.0, 1.0)),
            )]),
            embedding: None,
            degree_centrality: None,
            betweenness_centrality: None,
            pagerank: None,
            cluster_id: None,
            visualized: true,
            first_seen_year: None,
            last_seen_year: None,
            extraction_section: Some(section.to_string()),
            evidence_spans: raw.evidence.into_iter().collect(),
            source_chunk_ids: vec![chunk_id],
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn relationship(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
        relationship_type: RelationshipType,
        evidence_chunk_ids: Vec<Uuid>,
    ) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            project_id,
            source_id,
            target_id,
            relationship_type,
            weight: 1.0,
            properties: HashMap::new(),
            evidence_spans: Vec::new(),
            evidence_chunk_ids,
            first_seen_year: None,
            created_at: Utc::now(),
        }
    }

    /// Mode 1 — one prompt per paper over title + abstract. Used when no full
    /// text is available, or as the default when the lexical-graph flag is off.
    pub async fn extract_abstract_only(
        &self,
        project_id: Uuid,
        paper_entity_id: Uuid,
        title: &str,
        abstract_text: &str,
        abstract_chunk_id: Uuid,
    ) -> ExtractionResult {
        if abstract_text.trim().is_empty() {
            return ExtractionResult::default();
        }

        let system = "You are an academic paper analyst. Extract key concepts, methods, and \
                      findings as strict JSON: {\"concepts\":[{\"name\":..,\"definition\":..,\"confidence\":..}],\
                      \"methods\":[...],\"findings\":[...]}. At most 10 concepts, 5 methods, 5 findings.";
        let user = format!("Title: {title}\n\nAbstract: {abstract_text}");

        let raw = match self.llm.generate(system, &user, true).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "abstract extraction LLM call failed");
                return ExtractionResult {
                    json_parse_failures: 1,
                    ..Default::default()
                };
            }
        };

        let parsed: AbstractExtractionResponse = match parse_json_cascade(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "abstract extraction JSON parse failed");
                return ExtractionResult {
                    json_parse_failures: 1,
                    ..Default::default()
                };
            }
        };

        let mut result = ExtractionResult::default();
        let section = SectionType::Abstract;
        let section_label = format!("{:?}", section).to_lowercase();

        for raw_entity in parsed.concepts {
            if let Some(entity) =
                self.new_entity(project_id, EntityType::Concept, raw_entity, &section_label, abstract_chunk_id)
            {
                result.relationships.push(self.relationship(
                    project_id,
                    paper_entity_id,
                    entity.id,
                    RelationshipType::DiscussesConcept,
                    vec![abstract_chunk_id],
                ));
                result.entities.push(entity);
            }
        }
        for raw_entity in parsed.methods {
            if let Some(entity) =
                self.new_entity(project_id, EntityType::Method, raw_entity, &section_label, abstract_chunk_id)
            {
                result.relationships.push(self.relationship(
                    project_id,
                    paper_entity_id,
                    entity.id,
                    RelationshipType::UsesMethod,
                    vec![abstract_chunk_id],
                ));
                result.entities.push(entity);
            }
        }
        for raw_entity in parsed.findings {
            if let Some(entity) =
                self.new_entity(project_id, EntityType::Finding, raw_entity, &section_label, abstract_chunk_id)
            {
                result.relationships.push(self.relationship(
                    project_id,
                    paper_entity_id,
                    entity.id,
                    RelationshipType::HasFinding,
                    vec![abstract_chunk_id],
                ));
                result.entities.push(entity);
            }
        }

        debug!(entity_count = result.entities.len(), "abstract-only extraction complete");
        result
    }

    /// Mode 2 — one prompt per recognized section, gated by `enable_lexical_graph`.
    pub async fn extract_section_aware(
        &self,
        project_id: Uuid,
        paper_entity_id: Uuid,
        sections: &[(SectionType, Uuid, String)],
    ) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        if !self.enable_lexical_graph {
            return result;
        }

        for (section_type, chunk_id, text) in sections {
            if text.trim().is_empty() {
                continue;
            }
            let section_result = self
                .extract_one_section(project_id, paper_entity_id, *section_type, *chunk_id, text)
                .await;
            result.merge(section_result);
        }

        result
    }

    async fn extract_one_section(
        &self,
        project_id: Uuid,
        paper_entity_id: Uuid,
        section_type: SectionType,
        chunk_id: Uuid,
        text: &str,
    ) -> ExtractionResult {
        let template = section_template(section_type);
        let system = format!(
            "You are an academic paper analyst reading the {template} section. Extract entities as \
             strict JSON: {{\"entities\":[{{\"name\":..,\"type\":..,\"definition\":..,\"confidence\":..,\
             \"evidence\":\"verbatim span\"}}]}}. Allowed types: concept, method, finding, problem, \
             dataset, metric, innovation, limitation, result, claim."
        );

        let raw = match self.llm.generate(&system, text, true).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, section = ?section_type, "section extraction LLM call failed");
                return ExtractionResult {
                    json_parse_failures: 1,
                    ..Default::default()
                };
            }
        };

        let parsed: SectionExtractionResponse = match parse_json_cascade(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, section = ?section_type, "section extraction JSON parse failed");
                return ExtractionResult {
                    json_parse_failures: 1,
                    ..Default::default()
                };
            }
        };

        let mut result = ExtractionResult::default();
        let section_label = format!("{:?}", section_type).to_lowercase();

        for raw_entity in parsed.entities {
            let Some(entity_type) = parse_entity_type(&raw_entity.entity_type) else {
                continue;
            };
            let converted = RawExtractedEntity {
                name: raw_entity.name,
                definition: raw_entity.definition,
                confidence: raw_entity.confidence,
                evidence: raw_entity.evidence,
            };
            let Some(entity) = self.new_entity(project_id, entity_type, converted, &section_label, chunk_id) else {
                continue;
            };

            let relationship_type = match (section_type, entity_type) {
                (_, EntityType::Result) | (_, EntityType::Claim) => Some(RelationshipType::Reports),
                (SectionType::Methods, EntityType::Method) | (SectionType::Methodology, EntityType::Method) => {
                    Some(RelationshipType::UsesMethod)
                }
                (_, EntityType::Dataset) => Some(RelationshipType::UsesDataset),
                (_, EntityType::Finding) => Some(RelationshipType::HasFinding),
                (_, EntityType::Concept) => Some(RelationshipType::DiscussesConcept),
                _ => Some(RelationshipType::Mentions),
            };

            if let Some(rel_type) = relationship_type {
                result.relationships.push(self.relationship(
                    project_id,
                    paper_entity_id,
                    entity.id,
                    rel_type,
                    vec![chunk_id],
                ));
            }
            result.entities.push(entity);
        }

        result
    }

    /// Builds the `AUTHORED_BY` edges from paper metadata — the one
    /// relationship kind that never comes from an LLM call.
    pub fn authored_by_relationships(
        &self,
        project_id: Uuid,
        paper_entity_id: Uuid,
        author_entity_ids: &[Uuid],
    ) -> Vec<Relationship> {
        author_entity_ids
            .iter()
            .map(|&author_id| {
                self.relationship(project_id, paper_entity_id, author_id, RelationshipType::AuthoredBy, vec![])
            })
            .collect()
    }
}

fn section_template(section_type: SectionType) -> &'static str {
    match section_type {
        SectionType::Methods | SectionType::Methodology => "methodology",
        SectionType::Results | SectionType::Experiments => "results",
        SectionType::Discussion => "discussion",
        SectionType::Introduction => "introduction",
        _ => "general",
    }
}

fn parse_entity_type(raw: &str) -> Option<EntityType> {
    match raw.trim().to_lowercase().as_str() {
        "concept" => Some(EntityType::Concept),
        "method" => Some(EntityType::Method),
        "finding" => Some(EntityType::Finding),
        "problem" => Some(EntityType::Problem),
        "dataset" => Some(EntityType::Dataset),
        "metric" => Some(EntityType::Metric),
        "innovation" => Some(EntityType::Innovation),
        "limitation" => Some(EntityType::Limitation),
        "result" => Some(EntityType::Result),
        "claim" => Some(EntityType::Claim),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperforge_common::llm::{LlmService, RuleBasedProvider};

    fn test_service() -> Arc<LlmService> {
        Arc::new(LlmService::new(vec![], 0, 8))
    }

    #[test]
    fn unknown_entity_type_is_dropped() {
        assert!(parse_entity_type("gizmo").is_none());
        assert!(parse_entity_type("Concept").is_some());
    }

    #[tokio::test]
    async fn empty_abstract_yields_zero_entities() {
        let extractor = EntityExtractor::new(test_service(), false);
        let result = extractor
            .extract_abstract_only(Uuid::new_v4(), Uuid::new_v4(), "Title", "", Uuid::new_v4())
            .await;
        assert!(result.entities.is_empty());
        assert_eq!(result.json_parse_failures, 0);
    }

    #[tokio::test]
    async fn section_aware_is_noop_when_lexical_graph_disabled() {
        let extractor = EntityExtractor::new(test_service(), false);
        let sections = vec![(SectionType::Methods, Uuid::new_v4(), "We used gradient descent.".to_string())];
        let result = extractor.extract_section_aware(Uuid::new_v4(), Uuid::new_v4(), &sections).await;
        assert!(result.entities.is_empty());
    }

    #[test]
    fn rule_based_provider_is_available_as_deterministic_fallback() {
        let _ = RuleBasedProvider;
    }
}
