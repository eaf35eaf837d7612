//! Entity resolution: a three-stage merge cascade run once per ingest, per
//! project, scoped to one `EntityType` at a time (merging across types is
//! never legal).
//!
//! Stage 1 — deterministic: entities whose normalized names match exactly,
//! or whose homonym context bucket agrees, auto-merge without touching an
//! embedding or an LLM.
//! Stage 2 — embedding candidates: remaining entities are compared pairwise
//! by cosine similarity; above `auto_merge_threshold` they merge automatically,
//! within the uncertain window they become stage-3 candidates.
//! Stage 3 — LLM-confirmed: candidate pairs are submitted to the configured
//! `LlmService`, capped at `llm_batch_cap` pairs per ingest; a sample of
//! declined pairs is retained for the false-merge audit.
//!
//! After the three stages, entities of type Method, Dataset, or Concept that
//! remain distinct but refer to the same real-world thing across different
//! papers are linked with a `SameAs` relationship rather than merged — the
//! graph keeps both nodes, preserving each paper's own terminology.

use crate::homonym::context_bucket;
use crate::normalize::extract_acronym_expansion;
use paperforge_common::config::ResolutionConfig;
use paperforge_common::errors::Result;
use paperforge_common::llm::LlmService;
use paperforge_common::metrics::record_resolution;
use paperforge_common::model::{normalize_name, Entity, EntityType, Relationship, RelationshipType};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// One deterministic/embedding/LLM merge decision: `losers` fold into `winner`.
#[derive(Debug, Clone)]
pub struct MergeDecision {
    pub winner: Uuid,
    pub losers: Vec<Uuid>,
    pub stage: MergeStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Deterministic,
    Embedding,
    Llm,
}

/// A declined LLM-reviewed pair retained for the false-merge audit sample.
#[derive(Debug, Clone)]
pub struct AuditedPair {
    pub a: Uuid,
    pub b: Uuid,
    pub similarity: f32,
}

/// Aggregate counters for one resolution pass, reported back to the caller
/// for ingest-job telemetry.
#[derive(Debug, Clone, Default)]
pub struct ResolutionStats {
    pub total_input: usize,
    pub auto_merged_deterministic: usize,
    pub embedding_candidate_pairs: usize,
    pub auto_merged_embedding: usize,
    pub llm_pairs_reviewed: usize,
    pub llm_confirmed_merges: usize,
    pub potential_false_merges: usize,
    pub false_merge_samples: Vec<AuditedPair>,
    pub final_canonical_count: usize,
    pub cross_paper_same_as: usize,
    pub resolution_deferred: usize,
}

impl ResolutionStats {
    pub fn canonicalization_rate(&self) -> f32 {
        if self.total_input == 0 {
            return 1.0;
        }
        self.final_canonical_count as f32 / self.total_input as f32
    }
}

#[derive(Debug, Deserialize)]
struct MergeJudgment {
    #[serde(rename = "same_entity")]
    same_entity: bool,
}

/// Output of one resolution pass: the merge decisions to apply, the
/// cross-paper `SameAs` relationships to persist, and run statistics.
pub struct ResolutionOutcome {
    pub decisions: Vec<MergeDecision>,
    pub same_as: Vec<Relationship>,
    pub stats: ResolutionStats,
}

pub struct EntityResolver {
    llm: Arc<LlmService>,
    config: ResolutionConfig,
}

const SAME_AS_ELIGIBLE: [EntityType; 3] = [EntityType::Method, EntityType::Dataset, EntityType::Concept];

impl EntityResolver {
    pub fn new(llm: Arc<LlmService>, config: ResolutionConfig) -> Self {
        Self { llm, config }
    }

    /// Runs the full cascade over one project's entities of a single type.
    /// `entities` must all share `entity_type`; callers partition by type
    /// before calling — merging across types would violate the closed
    /// entity-type model.
    pub async fn resolve(&self, entities: &[Entity]) -> Result<ResolutionOutcome> {
        let started = Instant::now();
        let mut stats = ResolutionStats {
            total_input: entities.len(),
            ..Default::default()
        };

        if entities.is_empty() {
            return Ok(ResolutionOutcome { decisions: Vec::new(), same_as: Vec::new(), stats });
        }

        let (deterministic_decisions, mut remaining) = self.deterministic_stage(entities, &mut stats);
        remaining.sort_by_key(|e| e.created_at);
        let (embedding_decisions, candidates) = self.embedding_stage(&remaining, &mut stats);
        let llm_decisions = self.llm_stage(&candidates, &remaining, &mut stats).await;

        let mut decisions = deterministic_decisions;
        decisions.extend(embedding_decisions);
        decisions.extend(llm_decisions);

        let merged_ids: std::collections::HashSet<Uuid> =
            decisions.iter().flat_map(|d| d.losers.iter().copied()).collect();
        remaining.retain(|e| !merged_ids.contains(&e.id));
        stats.final_canonical_count = remaining.len();

        let same_as = self.cross_paper_same_as(&remaining, &mut stats);

        record_resolution(
            started.elapsed().as_secs_f64(),
            stats.embedding_candidate_pairs,
            decisions.len(),
            stats.llm_pairs_reviewed,
        );

        Ok(ResolutionOutcome { decisions, same_as, stats })
    }

    /// Stage 1: exact normalized-name matches, split by homonym bucket where
    /// the name is ambiguous, and acronym/expansion pairs within one group.
    fn deterministic_stage(
        &self,
        entities: &[Entity],
        stats: &mut ResolutionStats,
    ) -> (Vec<MergeDecision>, Vec<Entity>) {
        let mut groups: HashMap<String, Vec<&Entity>> = HashMap::new();
        for entity in entities {
            let def_text = entity.definition.clone().unwrap_or_default();
            let bucket = context_bucket(&entity.normalized_name, &def_text);
            groups.entry(format!("{}::{}", entity.normalized_name, bucket)).or_default().push(entity);
        }

        // Fold acronym/expansion pairs into the expansion's group when the
        // expansion's own normalized form already has a group — e.g. an
        // entity named "LLM" merges with one named "large language model".
        let expansion_lookup: HashMap<String, String> = entities
            .iter()
            .filter_map(|e| {
                let def = e.definition.as_deref()?;
                let (expansion, acronym) = extract_acronym_expansion(def)?;
                if normalize_name(&acronym) == e.normalized_name {
                    Some((e.normalized_name.clone(), normalize_name(&expansion)))
                } else {
                    None
                }
            })
            .collect();

        let mut decisions = Vec::new();
        let mut survivors = Vec::new();
        let mut consumed: std::collections::HashSet<Uuid> = std::collections::HashSet::new();

        for (key, members) in &groups {
            if consumed.contains(&members[0].id) {
                continue;
            }
            let normalized = key.split("::").next().unwrap_or(key);
            let target_key = expansion_lookup
                .get(normalized)
                .and_then(|expansion_norm| groups.keys().find(|k| k.starts_with(expansion_norm.as_str())))
                .cloned();

            let mut all_members: Vec<&Entity> = members.clone();
            if let Some(target_key) = &target_key {
                if let Some(extra) = groups.get(target_key) {
                    all_members.extend(extra.iter().copied());
                }
            }
            // Oldest entity first so the first element is always the canonical
            // winner — spec requires a merge to preserve the earliest-created entity.
            all_members.sort_by_key(|e| e.created_at);
            all_members.dedup_by_key(|e| e.id);

            if all_members.iter().any(|e| consumed.contains(&e.id)) {
                continue;
            }
            for e in &all_members {
                consumed.insert(e.id);
            }

            if all_members.len() == 1 {
                survivors.push(all_members[0].clone());
                continue;
            }

            let winner = all_members[0];
            let losers: Vec<Uuid> = all_members[1..].iter().map(|e| e.id).collect();
            stats.auto_merged_deterministic += losers.len();
            decisions.push(MergeDecision { winner: winner.id, losers, stage: MergeStage::Deterministic });
            survivors.push(winner.clone());
        }

        (decisions, survivors)
    }

    /// Stage 2: pairwise cosine similarity over remaining entities' embeddings.
    /// Returns auto-merge decisions and the pairs left in the uncertain window
    /// for stage 3. Requires `entities` sorted ascending by `created_at` — the
    /// earlier index in a match always wins, preserving the oldest entity as
    /// canonical per the merge invariant.
    fn embedding_stage(
        &self,
        entities: &[Entity],
        stats: &mut ResolutionStats,
    ) -> (Vec<MergeDecision>, Vec<(Uuid, Uuid, f32)>) {
        let mut decisions = Vec::new();
        let mut candidates = Vec::new();
        let mut merged: std::collections::HashSet<Uuid> = std::collections::HashSet::new();

        for i in 0..entities.len() {
            if merged.contains(&entities[i].id) {
                continue;
            }
            let Some(vec_a) = &entities[i].embedding else { continue };

            for entity_b in entities.iter().skip(i + 1) {
                if merged.contains(&entity_b.id) {
                    continue;
                }
                let Some(vec_b) = &entity_b.embedding else { continue };
                let sim = cosine_similarity(vec_a, vec_b);

                if sim >= self.config.auto_merge_threshold {
                    stats.auto_merged_embedding += 1;
                    merged.insert(entity_b.id);
                    decisions.push(MergeDecision {
                        winner: entities[i].id,
                        losers: vec![entity_b.id],
                        stage: MergeStage::Embedding,
                    });
                } else if sim >= self.config.uncertain_threshold {
                    stats.embedding_candidate_pairs += 1;
                    candidates.push((entities[i].id, entity_b.id, sim));
                }
            }
        }

        (decisions, candidates)
    }

    /// Stage 3: submits up to `llm_batch_cap` uncertain pairs to the LLM,
    /// ranked by similarity descending so the most plausible merges are
    /// reviewed first when the batch cap is tight. `a_id` in each candidate
    /// pair is always the older entity (stage 2 only ever compares forward
    /// through an ascending-by-`created_at` list), so confirming a merge
    /// keeps `a_id` canonical without any extra bookkeeping here.
    async fn llm_stage(
        &self,
        candidates: &[(Uuid, Uuid, f32)],
        entities: &[Entity],
        stats: &mut ResolutionStats,
    ) -> Vec<MergeDecision> {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.llm_batch_cap);

        let by_id: HashMap<Uuid, &Entity> = entities.iter().map(|e| (e.id, e)).collect();
        let mut decisions = Vec::new();

        for (a_id, b_id, similarity) in ranked {
            let (Some(a), Some(b)) = (by_id.get(&a_id), by_id.get(&b_id)) else { continue };
            stats.llm_pairs_reviewed += 1;

            let system = "You decide whether two extracted academic entities refer to the same \
                real-world concept, method, or artifact. Respond with JSON only.";
            let user = format!(
                "Entity A: \"{}\" — {}\nEntity B: \"{}\" — {}\n\
                Respond with {{\"same_entity\": true|false}}.",
                a.display_name,
                a.definition.as_deref().unwrap_or(""),
                b.display_name,
                b.definition.as_deref().unwrap_or(""),
            );

            let same_entity = match self.llm.generate(system, &user, true).await {
                Ok(raw) => match paperforge_common::llm::parse_json_cascade::<MergeJudgment>(&raw) {
                    Ok(judgment) => judgment.same_entity,
                    Err(_) => false,
                },
                Err(_) => false,
            };

            if same_entity {
                stats.llm_confirmed_merges += 1;
                decisions.push(MergeDecision { winner: a_id, losers: vec![b_id], stage: MergeStage::Llm });
            } else {
                stats.potential_false_merges += 1;
                if should_sample(self.config.false_merge_sample_rate, stats.potential_false_merges) {
                    stats.false_merge_samples.push(AuditedPair { a: a_id, b: b_id, similarity });
                }
            }
        }

        let reviewed: std::collections::HashSet<(Uuid, Uuid)> =
            candidates.iter().map(|(a, b, _)| (*a, *b)).collect();
        let deferred = candidates.len().saturating_sub(reviewed.len().min(self.config.llm_batch_cap));
        stats.resolution_deferred += deferred;

        decisions
    }

    /// Links entities of Method, Dataset, or Concept type that survived
    /// resolution as distinct nodes but originate from different source
    /// papers and share a normalized name family — same referent, kept
    /// separate because each paper's own terminology is worth preserving.
    fn cross_paper_same_as(&self, survivors: &[Entity], stats: &mut ResolutionStats) -> Vec<Relationship> {
        let mut links = Vec::new();
        let eligible: Vec<&Entity> =
            survivors.iter().filter(|e| SAME_AS_ELIGIBLE.contains(&e.entity_type)).collect();

        for i in 0..eligible.len() {
            for j in (i + 1)..eligible.len() {
                let a = eligible[i];
                let b = eligible[j];
                if a.normalized_name != b.normalized_name {
                    continue;
                }
                let disjoint_papers = a
                    .source_chunk_ids
                    .iter()
                    .collect::<std::collections::HashSet<_>>()
                    .is_disjoint(&b.source_chunk_ids.iter().collect());
                if !disjoint_papers {
                    continue;
                }

                let now = a.created_at;
                links.push(Relationship {
                    id: Uuid::nil(),
                    project_id: a.project_id,
                    source_id: a.id,
                    target_id: b.id,
                    relationship_type: RelationshipType::SameAs,
                    weight: 1.0,
                    properties: HashMap::new(),
                    evidence_spans: Vec::new(),
                    evidence_chunk_ids: Vec::new(),
                    first_seen_year: a.first_seen_year.or(b.first_seen_year),
                    created_at: now,
                });
                stats.cross_paper_same_as += 1;
            }
        }

        links
    }
}

/// Deterministic thinning of declined pairs into the audit sample: keeps
/// roughly `rate` of the stream without a random number generator, so test
/// runs are reproducible.
fn should_sample(rate: f32, ordinal: usize) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    let step = (1.0 / rate).round().max(1.0) as usize;
    ordinal % step == 0
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_entity(name: &str, normalized: &str, embedding: Option<Vec<f32>>) -> Entity {
        let now = Utc::now();
        Entity {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            entity_type: EntityType::Concept,
            display_name: name.to_string(),
            normalized_name: normalized.to_string(),
            definition: None,
            properties: HashMap::new(),
            embedding,
            degree_centrality: None,
            betweenness_centrality: None,
            pagerank: None,
            cluster_id: None,
            visualized: false,
            first_seen_year: None,
            last_seen_year: None,
            extraction_section: None,
            evidence_spans: Vec::new(),
            source_chunk_ids: vec![Uuid::new_v4()],
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn deterministic_stage_merges_exact_normalized_duplicates() {
        let resolver_config = ResolutionConfig {
            auto_merge_threshold: 0.9,
            uncertain_threshold: 0.75,
            llm_batch_cap: 10,
            false_merge_sample_rate: 0.1,
        };
        let llm = Arc::new(LlmService::new(Vec::new(), 1, 30));
        let resolver = EntityResolver::new(llm, resolver_config);

        let entities = vec![
            sample_entity("Gradient Descent", "gradient descent", None),
            sample_entity("gradient descent", "gradient descent", None),
        ];
        let mut stats = ResolutionStats::default();
        let (decisions, survivors) = resolver.deterministic_stage(&entities, &mut stats);
        assert_eq!(decisions.len(), 1);
        assert_eq!(survivors.len(), 1);
        assert_eq!(stats.auto_merged_deterministic, 1);
    }

    #[test]
    fn deterministic_stage_keeps_homonym_senses_separate() {
        let resolver_config = ResolutionConfig {
            auto_merge_threshold: 0.9,
            uncertain_threshold: 0.75,
            llm_batch_cap: 10,
            false_merge_sample_rate: 0.1,
        };
        let llm = Arc::new(LlmService::new(Vec::new(), 1, 30));
        let resolver = EntityResolver::new(llm, resolver_config);

        let mut neural = sample_entity("Transformer", "transformer", None);
        neural.definition = Some("An attention-based neural sequence model.".to_string());
        let mut electrical = sample_entity("Transformer", "transformer", None);
        electrical.definition = Some("An electrical device for voltage conversion via windings.".to_string());

        let mut stats = ResolutionStats::default();
        let (decisions, survivors) = resolver.deterministic_stage(&[neural, electrical], &mut stats);
        assert!(decisions.is_empty());
        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn should_sample_respects_rate_bounds() {
        assert!(!should_sample(0.0, 1));
        assert!(should_sample(1.0, 1));
        assert!(should_sample(0.1, 10));
    }
}
