//! Markdown-aware text chunking.
//!
//! Documents are split into sections at `#`, `##` and `###` headings, then
//! each section is cut into overlapping character windows. Chunk indices are
//! numbered across the whole document.

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 4200;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 700;

/// A piece of a document ready to be wrapped in a [`Chunk`](crate::index::Chunk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub section_heading: Option<String>,
    pub chunk_index: usize,
    pub chunk_total: usize,
}

struct Section {
    heading: Option<String>,
    content: String,
}

/// Split `text` into heading-scoped, windowed chunks.
///
/// Empty or whitespace-only input yields no chunks.
pub fn chunk_markdown(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let pieces: Vec<(Option<String>, String)> = split_sections(text)
        .into_iter()
        .flat_map(|section| {
            window(&section.content, chunk_size, overlap)
                .into_iter()
                .map(move |piece| (section.heading.clone(), piece))
        })
        .collect();

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (section_heading, text))| TextChunk {
            text,
            section_heading,
            chunk_index,
            chunk_total: total,
        })
        .collect()
}

/// Heading text if `line` is a level 1-3 ATX heading.
fn heading(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some(title)
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(title) = heading(line) {
            flush(&current_heading, &mut lines, &mut sections);
            current_heading = Some(title.to_string());
            continue;
        }
        lines.push(line);
    }
    flush(&current_heading, &mut lines, &mut sections);

    // A document made only of headings is kept whole.
    if sections.is_empty() && !text.trim().is_empty() {
        sections.push(Section {
            heading: None,
            content: text.trim().to_string(),
        });
    }
    sections
}

fn flush(heading: &Option<String>, lines: &mut Vec<&str>, out: &mut Vec<Section>) {
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        out.push(Section {
            heading: heading.clone(),
            content,
        });
    }
    lines.clear();
}

fn window(content: &str, size: usize, overlap: usize) -> Vec<String> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let chars: Vec<char> = content.chars().collect();

    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(text: &str) -> Vec<TextChunk> {
        chunk_markdown(text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(chunk("").is_empty());
        assert!(chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let result = chunk("  Hello world, a short document.  ");
        assert_eq!(
            result,
            vec![TextChunk {
                text: "Hello world, a short document.".to_string(),
                section_heading: None,
                chunk_index: 0,
                chunk_total: 1,
            }]
        );
    }

    #[test]
    fn test_headings_scope_sections() {
        let result = chunk("# Top\n\nIntro text.\n\n## Middle\n\nBody.\n\n### Sub\n\nSub text.");
        let headings: Vec<_> = result.iter().map(|c| c.section_heading.as_deref()).collect();
        assert_eq!(headings, vec![Some("Top"), Some("Middle"), Some("Sub")]);
        assert_eq!(result[2].text, "Sub text.");
    }

    #[test]
    fn test_level_four_heading_is_body_text() {
        let result = chunk("## Steps\n#### not a section\nline");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].section_heading.as_deref(), Some("Steps"));
        assert!(result[0].text.contains("#### not a section"));
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        assert_eq!(heading("#tag"), None);
        assert_eq!(heading("##   Spaced   "), Some("Spaced"));
        assert_eq!(heading("# "), None);
    }

    #[test]
    fn test_only_headings_kept_whole() {
        let result = chunk("# One\n## Two");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].section_heading, None);
        assert_eq!(result[0].text, "# One\n## Two");
    }

    #[test]
    fn test_windows_overlap_and_indices_are_global() {
        let body = "word ".repeat(2000);
        let result = chunk_markdown(&format!("## Big\n\n{body}\n## Tail\n\nend"), 500, 50);
        assert!(result.len() > 2);
        for (i, c) in result.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.chunk_total, result.len());
            assert!(c.text.chars().count() <= 500);
        }
        assert_eq!(result.last().map(|c| c.text.as_str()), Some("end"));
    }

    #[test]
    fn test_overlap_larger_than_size_still_advances() {
        let result = chunk_markdown("abcdef", 2, 10);
        assert_eq!(
            result.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(),
            vec!["ab", "bc", "cd", "de", "ef"]
        );
    }

    #[test]
    fn test_multibyte_text_is_windowed_by_chars() {
        let result = chunk_markdown("ééééé", 2, 0);
        assert_eq!(
            result.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(),
            vec!["éé", "éé", "é"]
        );
    }
}
