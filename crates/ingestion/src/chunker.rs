//! Semantic chunker: splits a paper's full text into a two-level hierarchy.
//! Level 0 parents follow detected section boundaries; level 1 children are
//! token-bounded paragraphs within a parent.

use paperforge_common::config::ChunkerConfig;
use paperforge_common::model::SectionType;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// A chunk awaiting persistence — not yet assigned an id, paper, or project.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub text: String,
    pub section_type: SectionType,
    pub level: u8,
    /// Index of this chunk's parent within `parents` (level-0 only: `None`).
    pub parent_index: Option<usize>,
    pub sequence_order: u32,
    pub token_count: u32,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

/// Rough token estimate: ~4 characters per token, matching the teacher's
/// embedding-cost approximation.
fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

struct DetectedSection<'a> {
    heading: &'a str,
    section_type: SectionType,
    body_start_line: usize,
    body_end_line: usize,
}

/// Recognizes a line as a section heading: short, title-cased or all-caps,
/// matching one of the closed aliases via `SectionType::from_heading`, and not
/// itself a sentence (no trailing period followed by more text).
fn looks_like_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 60 {
        return false;
    }
    let word_count = trimmed.split_whitespace().count();
    if word_count == 0 || word_count > 6 {
        return false;
    }
    !matches!(SectionType::from_heading(trimmed), SectionType::Unknown)
}

fn detect_sections(lines: &[&str]) -> Vec<DetectedSection<'_>> {
    let mut headings: Vec<(usize, &str, SectionType)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if looks_like_heading(line) {
            headings.push((i, line.trim(), SectionType::from_heading(line.trim())));
        }
    }

    let mut sections = Vec::with_capacity(headings.len());
    for (idx, &(line_no, heading, section_type)) in headings.iter().enumerate() {
        let body_start = line_no + 1;
        let body_end = headings
            .get(idx + 1)
            .map(|(next_line, _, _)| *next_line)
            .unwrap_or(lines.len());
        sections.push(DetectedSection {
            heading,
            section_type,
            body_start_line: body_start,
            body_end_line: body_end,
        });
    }

    sections
}

/// Splits one parent section's body into token-bounded paragraph children.
/// Paragraphs are never split across a blank-line boundary; chunks below
/// `merge_forward_threshold` tokens are merged into the following sibling.
fn split_paragraphs(body: &str, config: &ChunkerConfig) -> Vec<(String, u32)> {
    if body.trim().is_empty() {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(config.paragraph_tokens_max));
    let raw: Vec<String> = splitter.chunks(body).map(|s| s.to_string()).collect();

    let mut merged: Vec<(String, u32)> = Vec::with_capacity(raw.len());
    for chunk in raw {
        let tokens = estimate_tokens(&chunk);
        if tokens < config.merge_forward_threshold as u32 && !merged.is_empty() {
            let last = merged.last_mut().unwrap();
            last.0.push(' ');
            last.0.push_str(&chunk);
            last.1 = estimate_tokens(&last.0);
        } else {
            merged.push((chunk, tokens));
        }
    }

    // A trailing undersized chunk has no following sibling to merge into;
    // fold it backward instead so the threshold invariant still holds.
    if merged.len() > 1 {
        let last_tokens = merged.last().unwrap().1;
        if last_tokens < config.merge_forward_threshold as u32 {
            let (tail_text, _) = merged.pop().unwrap();
            let prev = merged.last_mut().unwrap();
            prev.0.push(' ');
            prev.0.push_str(&tail_text);
            prev.1 = estimate_tokens(&prev.0);
        }
    }

    merged
}

/// Builds the two-level chunk hierarchy for a paper's full text. Fails soft:
/// when no section headings are detected, the whole body becomes a single
/// `Unknown` parent.
pub fn chunk_paper_text(text: &str, config: &ChunkerConfig) -> Vec<PendingChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut sections = detect_sections(&lines);

    if sections.is_empty() {
        sections.push(DetectedSection {
            heading: "",
            section_type: SectionType::Unknown,
            body_start_line: 0,
            body_end_line: lines.len(),
        });
    } else {
        // The abstract, when distinguishable, is always its own parent — if
        // the heading scan missed it but the body opens with a short first
        // paragraph before the first detected heading, treat that preamble
        // as an Abstract parent rather than folding it into Unknown.
        if sections[0].body_start_line > 1 {
            let preamble_end = sections[0].body_start_line.saturating_sub(1);
            if preamble_end > 0 {
                sections.insert(
                    0,
                    DetectedSection {
                        heading: "",
                        section_type: SectionType::Abstract,
                        body_start_line: 0,
                        body_end_line: preamble_end,
                    },
                );
            }
        }
    }

    debug!(section_count = sections.len(), "Detected section boundaries");

    let mut result = Vec::new();
    for (parent_idx, section) in sections.iter().enumerate() {
        let body_lines = &lines[section.body_start_line.min(lines.len())..section.body_end_line.min(lines.len())];
        let body = body_lines.join("\n");
        let parent_tokens = estimate_tokens(&body);

        result.push(PendingChunk {
            text: if section.heading.is_empty() {
                body.clone()
            } else {
                format!("{}\n{}", section.heading, body)
            },
            section_type: section.section_type,
            level: 0,
            parent_index: None,
            sequence_order: parent_idx as u32,
            token_count: parent_tokens,
            start_line: Some(section.body_start_line as u32),
            end_line: Some(section.body_end_line as u32),
        });

        let paragraphs = split_paragraphs(&body, config);
        let mut line_cursor = section.body_start_line;
        for (seq, (para_text, tokens)) in paragraphs.into_iter().enumerate() {
            let span = para_text.lines().count().max(1);
            result.push(PendingChunk {
                text: para_text,
                section_type: section.section_type,
                level: 1,
                parent_index: Some(parent_idx),
                sequence_order: seq as u32,
                token_count: tokens,
                start_line: Some(line_cursor as u32),
                end_line: Some((line_cursor + span) as u32),
            });
            line_cursor += span;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChunkerConfig {
        ChunkerConfig {
            paragraph_tokens_min: 256,
            paragraph_tokens_max: 512,
            merge_forward_threshold: 20,
        }
    }

    #[test]
    fn fails_soft_to_single_unknown_parent_without_headings() {
        let text = "Just a body of text with no recognizable section headings at all, repeated. ".repeat(10);
        let chunks = chunk_paper_text(&text, &test_config());
        let parents: Vec<_> = chunks.iter().filter(|c| c.level == 0).collect();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].section_type, SectionType::Unknown);
    }

    #[test]
    fn detects_abstract_and_introduction_as_separate_parents() {
        let text = "Abstract\nThis paper studies X.\n\nIntroduction\nX matters because Y. ".repeat(3) + "More introduction text to pad length out nicely here.";
        let chunks = chunk_paper_text(&text, &test_config());
        let parents: Vec<_> = chunks.iter().filter(|c| c.level == 0).collect();
        assert!(parents.iter().any(|p| p.section_type == SectionType::Abstract));
        assert!(parents.iter().any(|p| p.section_type == SectionType::Introduction));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_paper_text("", &test_config()).is_empty());
    }

    #[test]
    fn paragraph_children_point_at_a_level_zero_parent() {
        let text = "Methods\n".to_string() + &"We ran an experiment with careful controls. ".repeat(40);
        let chunks = chunk_paper_text(&text, &test_config());
        for child in chunks.iter().filter(|c| c.level == 1) {
            assert!(child.parent_index.is_some());
        }
    }
}
