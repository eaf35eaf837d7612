//! Core data model: entities, relationships, chunks, clusters, and structural gaps.
//!
//! These are plain value types shared by every crate in the workspace. Persistence
//! lives in `db::models`; these types are what services pass between each other and
//! what the orchestrator/retrieval engine serialize back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Closed set of entity kinds. Paper/Author are metadata carriers and are never
/// clustered or centrality-ranked in the visualized subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Paper,
    Author,
    Concept,
    Method,
    Finding,
    Problem,
    Dataset,
    Metric,
    Innovation,
    Limitation,
    Result,
    Claim,
}

impl EntityType {
    /// Paper and Author are bookkeeping nodes: never clustered, never centrality-ranked,
    /// excluded from the visualized subgraph by default.
    pub fn is_metadata_only(&self) -> bool {
        matches!(self, EntityType::Paper | EntityType::Author)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Paper => "paper",
            EntityType::Author => "author",
            EntityType::Concept => "concept",
            EntityType::Method => "method",
            EntityType::Finding => "finding",
            EntityType::Problem => "problem",
            EntityType::Dataset => "dataset",
            EntityType::Metric => "metric",
            EntityType::Innovation => "innovation",
            EntityType::Limitation => "limitation",
            EntityType::Result => "result",
            EntityType::Claim => "claim",
        }
    }
}

/// Closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    AuthoredBy,
    Cites,
    DiscussesConcept,
    UsesMethod,
    UsesDataset,
    HasFinding,
    Supports,
    Contradicts,
    CoOccurs,
    BridgesGap,
    UsedIn,
    EvaluatedOn,
    Reports,
    Mentions,
    SameAs,
    PrerequisiteOf,
}

impl RelationshipType {
    /// SAME_AS is the only type allowed to connect an entity to itself in storage
    /// terms (cross-paper identity, not a literal self-loop on one entity row).
    pub fn allows_self_loop(&self) -> bool {
        matches!(self, RelationshipType::SameAs)
    }

    /// Wire/storage form, matching this type's `SCREAMING_SNAKE_CASE` serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::AuthoredBy => "AUTHORED_BY",
            RelationshipType::Cites => "CITES",
            RelationshipType::DiscussesConcept => "DISCUSSES_CONCEPT",
            RelationshipType::UsesMethod => "USES_METHOD",
            RelationshipType::UsesDataset => "USES_DATASET",
            RelationshipType::HasFinding => "HAS_FINDING",
            RelationshipType::Supports => "SUPPORTS",
            RelationshipType::Contradicts => "CONTRADICTS",
            RelationshipType::CoOccurs => "CO_OCCURS",
            RelationshipType::BridgesGap => "BRIDGES_GAP",
            RelationshipType::UsedIn => "USED_IN",
            RelationshipType::EvaluatedOn => "EVALUATED_ON",
            RelationshipType::Reports => "REPORTS",
            RelationshipType::Mentions => "MENTIONS",
            RelationshipType::SameAs => "SAME_AS",
            RelationshipType::PrerequisiteOf => "PREREQUISITE_OF",
        }
    }
}

/// Normalizes a display name: lowercase, trim, collapse internal whitespace, and
/// fold hyphen/space variants so "fine-tuning", "finetuning", and "fine tuning"
/// converge to the same normalized form.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace('-', "").replace(' ', "")
}

/// Stable content fingerprint over a set of strings, hex-encoded SHA-256.
/// Used as an ingest job's idempotency key — resubmitting the same paper
/// batch fingerprints identically, so a caller can detect the duplicate
/// rather than re-ingest it.
pub fn content_fingerprint(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Typed node. Identity is the random `id`; `(project_id, entity_type, normalized_name)`
/// becomes unique once resolution has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub entity_type: EntityType,
    pub display_name: String,
    pub normalized_name: String,
    pub definition: Option<String>,
    pub properties: HashMap<String, serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
    pub degree_centrality: Option<f32>,
    pub betweenness_centrality: Option<f32>,
    pub pagerank: Option<f32>,
    pub cluster_id: Option<Uuid>,
    pub visualized: bool,
    pub first_seen_year: Option<i32>,
    pub last_seen_year: Option<i32>,
    pub extraction_section: Option<String>,
    pub evidence_spans: Vec<String>,
    pub source_chunk_ids: Vec<Uuid>,
    /// Alternate surface forms accumulated on the canonical entity across merges.
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// `visualized=true` is only legal when the entity is reachable to source text.
    pub fn visualization_invariant_holds(&self) -> bool {
        !self.visualized || !self.source_chunk_ids.is_empty()
    }
}

/// Directed typed edge. Weight defaults to 1.0 and is clamped to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship_type: RelationshipType,
    pub weight: f32,
    pub properties: HashMap<String, serde_json::Value>,
    pub evidence_spans: Vec<String>,
    pub evidence_chunk_ids: Vec<Uuid>,
    pub first_seen_year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn clamped_weight(weight: f32) -> f32 {
        weight.clamp(0.0, 1.0)
    }
}

/// Closed set of academic section kinds recognized by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Abstract,
    Introduction,
    RelatedWork,
    Background,
    Methods,
    Methodology,
    Experiments,
    Results,
    Discussion,
    Conclusion,
    Limitations,
    FutureWork,
    Acknowledgments,
    References,
    Unknown,
}

impl SectionType {
    /// Matches a heading line against the closed alias list. Falls back to `Unknown`
    /// rather than failing, since the chunker must fail-soft on unrecognized text.
    pub fn from_heading(heading: &str) -> Self {
        let h = heading.trim().to_lowercase();
        match h.as_str() {
            s if s.starts_with("abstract") => SectionType::Abstract,
            s if s.starts_with("introduction") => SectionType::Introduction,
            s if s.contains("related work") || s.contains("prior work") => {
                SectionType::RelatedWork
            }
            s if s.starts_with("background") => SectionType::Background,
            s if s.starts_with("methodology") => SectionType::Methodology,
            s if s.starts_with("method") || s.contains("approach") => SectionType::Methods,
            s if s.starts_with("experiment") => SectionType::Experiments,
            s if s.starts_with("result") || s.starts_with("evaluation") => SectionType::Results,
            s if s.starts_with("discussion") => SectionType::Discussion,
            s if s.starts_with("conclusion") => SectionType::Conclusion,
            s if s.starts_with("limitation") => SectionType::Limitations,
            s if s.contains("future work") => SectionType::FutureWork,
            s if s.starts_with("acknowledg") => SectionType::Acknowledgments,
            s if s.starts_with("reference") || s.starts_with("bibliography") => {
                SectionType::References
            }
            _ => SectionType::Unknown,
        }
    }

    /// Wire/storage form, matching this type's `snake_case` serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Abstract => "abstract",
            SectionType::Introduction => "introduction",
            SectionType::RelatedWork => "related_work",
            SectionType::Background => "background",
            SectionType::Methods => "methods",
            SectionType::Methodology => "methodology",
            SectionType::Experiments => "experiments",
            SectionType::Results => "results",
            SectionType::Discussion => "discussion",
            SectionType::Conclusion => "conclusion",
            SectionType::Limitations => "limitations",
            SectionType::FutureWork => "future_work",
            SectionType::Acknowledgments => "acknowledgments",
            SectionType::References => "references",
            SectionType::Unknown => "unknown",
        }
    }
}

/// Hierarchical text unit: level 0 is a parent section, level 1 is a paragraph child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub paper_id: Uuid,
    pub project_id: Uuid,
    pub text: String,
    pub summary: Option<String>,
    pub section_type: SectionType,
    pub level: u8,
    pub parent_chunk_id: Option<Uuid>,
    pub sequence_order: u32,
    pub token_count: u32,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn is_paragraph(&self) -> bool {
        self.level == 1
    }
}

/// A group of Concept entities sharing a cluster id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub project_id: Uuid,
    pub keywords: Vec<String>,
    pub concept_ids: Vec<Uuid>,
    pub size: u32,
    pub density: f32,
    pub label: String,
    pub centroid: Option<Vec<f32>>,
    pub detection_method: String,
    pub level: u8,
    pub created_at: DateTime<Utc>,
}

impl Cluster {
    /// Falls back to `Cluster <id>` when the keyword list produces no usable text,
    /// matching the clusterer's label invariant.
    pub fn label_for(id: Uuid, keywords: &[String]) -> String {
        let usable: Vec<&String> = keywords.iter().filter(|k| !k.trim().is_empty()).collect();
        if usable.is_empty() {
            format!("Cluster {id}")
        } else {
            usable
                .into_iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// Lifecycle status of a detected structural gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Detected,
    Explored,
    Bridged,
    Dismissed,
}

/// A candidate research opportunity: a weakly connected pair of clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralGap {
    pub id: Uuid,
    pub project_id: Uuid,
    pub cluster_a_id: Uuid,
    pub cluster_b_id: Uuid,
    pub concept_ids_a: Vec<Uuid>,
    pub concept_ids_b: Vec<Uuid>,
    pub gap_strength: f32,
    pub semantic_distance: f32,
    pub bridge_candidates: Vec<String>,
    pub research_questions: Vec<String>,
    pub ghost_edges: Vec<GhostEdge>,
    pub status: GapStatus,
    pub created_at: DateTime<Utc>,
}

/// A potential, not-yet-realized relationship rendered in the gap view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostEdge {
    pub entity_a: Uuid,
    pub entity_b: Uuid,
    pub similarity: f32,
}

impl StructuralGap {
    /// Each unordered cluster pair is unique per project: order by (min, max) before
    /// comparing or keying on it.
    pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Closed set of ingest job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestJobState {
    Pending,
    Running,
    Completed,
    Failed,
    Interrupted,
}

/// Tier of the evidence cascade that produced the provenance attached to a
/// retrieval result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    RelationshipEvidence,
    SourceChunkIds,
    TextSearch,
    AiExplanation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_hyphen_and_space_variants() {
        assert_eq!(normalize_name("fine-tuning"), normalize_name("finetuning"));
        assert_eq!(normalize_name("fine-tuning"), normalize_name("fine tuning"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_name("  Large Language Model  ");
        let twice = normalize_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn cluster_label_falls_back_when_keywords_empty() {
        let id = Uuid::nil();
        let label = Cluster::label_for(id, &["".to_string(), "  ".to_string()]);
        assert_eq!(label, format!("Cluster {id}"));
    }

    #[test]
    fn gap_pair_ordering_is_symmetric() {
        let a = Uuid::nil();
        let b = Uuid::from_u128(1);
        assert_eq!(StructuralGap::ordered_pair(a, b), StructuralGap::ordered_pair(b, a));
    }

    #[test]
    fn metadata_only_excludes_concept_kinds() {
        assert!(EntityType::Paper.is_metadata_only());
        assert!(!EntityType::Concept.is_metadata_only());
    }
}
