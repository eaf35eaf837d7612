//! Stage 2 — Concept extraction: pulls candidate entity mentions out of the
//! query and resolves each to a graph entity id, normalized-name match first,
//! embedding nearest-neighbor second. Terms that resolve to nothing stay in
//! the query's residual text for the planner and reasoner to fall back on.

use paperforge_common::embeddings::Embedder;
use paperforge_common::errors::Result;
use paperforge_common::model::EntityType;
use paperforge_graph::GraphStore;
use std::collections::HashSet;
use uuid::Uuid;

/// Below this nearest-neighbor score an embedding match is too weak to count
/// as a concept-extraction hit.
const EMBEDDING_MATCH_THRESHOLD: f64 = 0.75;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had", "can", "could", "will",
    "would", "should", "may", "might", "what", "which", "who", "how", "why",
];

#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub text: String,
    pub entity_type: Option<EntityType>,
    pub matched_id: Option<Uuid>,
}

pub struct ConceptExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub keywords: Vec<String>,
    pub residual_query: String,
}

pub async fn extract_concepts(
    store: &GraphStore,
    embedder: &dyn Embedder,
    project_id: Uuid,
    query: &str,
) -> Result<ConceptExtractionResult> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let candidates = candidate_phrases(&words);

    let mut entities = Vec::new();
    let mut consumed: HashSet<usize> = HashSet::new();

    for (start, len, phrase) in &candidates {
        if (*start..*start + *len).any(|i| consumed.contains(&i)) {
            continue;
        }

        let hits = store.entity_substring_search(project_id, phrase, 1).await?;
        if let Some(hit) = hits.into_iter().next() {
            entities.push(ExtractedEntity {
                text: phrase.clone(),
                entity_type: paperforge_graph::store::parse_entity_type(&hit.entity_type),
                matched_id: Some(hit.entity_id),
            });
            for i in *start..*start + *len {
                consumed.insert(i);
            }
            continue;
        }

        if let Ok(embedding) = embedder.embed(phrase).await {
            let vector_hits = store.entity_vector_search(project_id, &embedding, None, 1).await?;
            if let Some(hit) = vector_hits.into_iter().find(|h| h.score >= EMBEDDING_MATCH_THRESHOLD) {
                entities.push(ExtractedEntity {
                    text: phrase.clone(),
                    entity_type: paperforge_graph::store::parse_entity_type(&hit.entity_type),
                    matched_id: Some(hit.entity_id),
                });
                for i in *start..*start + *len {
                    consumed.insert(i);
                }
            }
        }
    }

    let residual_words: Vec<&str> = words
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(_, w)| *w)
        .collect();

    let keywords = residual_words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect();

    Ok(ConceptExtractionResult { entities, keywords, residual_query: residual_words.join(" ") })
}

/// Bigrams of consecutive non-stop-words first (multi-word concepts score
/// higher in a substring match), then leftover single words.
fn candidate_phrases(words: &[&str]) -> Vec<(usize, usize, String)> {
    let mut phrases = Vec::new();
    let is_stop = |w: &str| STOP_WORDS.contains(&w.to_lowercase().as_str());

    let mut i = 0;
    while i < words.len() {
        if is_stop(words[i]) {
            i += 1;
            continue;
        }
        if i + 1 < words.len() && !is_stop(words[i + 1]) {
            phrases.push((i, 2, format!("{} {}", words[i], words[i + 1])));
        }
        if words[i].len() > 3 {
            phrases.push((i, 1, words[i].to_string()));
        }
        i += 1;
    }
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_phrases_skips_stop_words() {
        let words: Vec<&str> = "find the attention mechanism".split_whitespace().collect();
        let phrases = candidate_phrases(&words);
        assert!(phrases.iter().any(|(_, _, p)| p == "attention mechanism"));
        assert!(!phrases.iter().any(|(_, _, p)| p == "the attention"));
    }
}
