//! Homonym disambiguation: a closed table of normalized names known to carry
//! more than one sense, plus the keyword buckets used to split them so
//! unrelated senses never collapse into one entity during stage 1.

/// `(normalized_name, [(bucket_label, keywords)])`. Keywords are matched
/// case-insensitively as substrings of the entity's definition/properties text.
fn homonym_table() -> &'static [(&'static str, &'static [(&'static str, &'static [&'static str])])] {
    &[
        (
            "transformer",
            &[
                (
                    "neural_architecture",
                    &["attention", "neural", "sequence", "encoder", "decoder", "deep learning", "self-attention"],
                ),
                (
                    "electrical_device",
                    &["electrical", "voltage", "power grid", "transformer station", "energy", "winding"],
                ),
            ],
        ),
        (
            "sat",
            &[
                (
                    "satisfiability",
                    &["boolean", "satisfiability", "sat solver", "np-complete", "clause", "propositional"],
                ),
                ("satellite", &["satellite", "orbit", "space", "communication", "constellation"]),
            ],
        ),
        (
            "transformermodel",
            &[(
                "neural_architecture",
                &["attention", "neural", "sequence", "encoder", "decoder"],
            )],
        ),
    ]
}

/// Derives the context bucket for an entity's normalized name. Names outside
/// the homonym table always map to `"default"` — disambiguation only applies
/// where ambiguity is known to exist. For table entries, the bucket whose
/// keywords best overlap the provided text wins; with no keyword overlap the
/// name is `"unclassified"`, kept distinct per homonym entry.
pub fn context_bucket(normalized_name: &str, text: &str) -> String {
    let Some((_, buckets)) = homonym_table().iter().find(|(name, _)| *name == normalized_name) else {
        return "default".to_string();
    };

    let lowered = text.to_lowercase();
    let mut best: Option<(&str, usize)> = None;

    for (label, keywords) in *buckets {
        let score = keywords.iter().filter(|kw| lowered.contains(*kw)).count();
        if score > 0 && best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
            best = Some((label, score));
        }
    }

    best.map(|(label, _)| label.to_string())
        .unwrap_or_else(|| format!("unclassified:{normalized_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_transformer_senses_by_keyword() {
        let neural = context_bucket("transformer", "attention-based neural sequence model");
        let electrical = context_bucket("transformer", "electrical device that transfers energy via windings");
        assert_ne!(neural, electrical);
    }

    #[test]
    fn names_outside_table_use_default_bucket() {
        assert_eq!(context_bucket("gradient descent", "an optimization algorithm"), "default");
    }

    #[test]
    fn sat_ambiguity_splits_satisfiability_from_satellite() {
        let a = context_bucket("sat", "boolean satisfiability np-complete clause");
        let b = context_bucket("sat", "satellite orbit communication constellation");
        assert_ne!(a, b);
    }

    #[test]
    fn transformer_model_entry_matches_post_normalize_name_form() {
        // normalize_name("Transformer Model") strips the space, so the table
        // key must already be in that form or this lookup always misses.
        let bucket = context_bucket("transformermodel", "attention-based encoder");
        assert_eq!(bucket, "neural_architecture");
    }
}
