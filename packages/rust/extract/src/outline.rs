//! Outline builder.
//!
//! Condenses ordered sections into an indented bullet list used as shared
//! context by the generation stages.

use tracing::instrument;

use html2doc_shared::SectionChunk;

/// Maximum characters of body preview shown per outline line.
pub const PREVIEW_CHARS: usize = 80;

const ELLIPSIS: &str = "...";

/// Placeholder shown for sections without a heading.
const UNTITLED: &str = "(untitled)";

/// Build an outline with one bullet per section, indented by `level - 1`.
///
/// Each line carries the heading and the first non-empty body line, cut so
/// the preview, ellipsis included, fits [`PREVIEW_CHARS`] characters. No
/// sections produce an empty string.
#[instrument(skip_all, fields(sections = sections.len()))]
pub fn build_outline(sections: &[SectionChunk]) -> String {
    sections
        .iter()
        .map(outline_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn outline_line(section: &SectionChunk) -> String {
    let indent = "  ".repeat(usize::from(section.level.saturating_sub(1)));
    let heading = section.heading.as_deref().unwrap_or(UNTITLED);

    match preview(&section.body) {
        Some(preview) => format!("{indent}- {heading}: {preview}"),
        None => format!("{indent}- {heading}"),
    }
}

fn preview(body: &str) -> Option<String> {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() <= PREVIEW_CHARS {
        return Some(line.to_string());
    }
    let cut: String = line.chars().take(PREVIEW_CHARS - ELLIPSIS.len()).collect();
    Some(format!("{}{ELLIPSIS}", cut.trim_end()))
}
