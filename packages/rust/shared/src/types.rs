//! Core domain types for the html2doc pipeline.
//!
//! Every value here is produced once by its stage and never mutated afterwards;
//! later stages only read them, and the persistence sink serializes them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extension of the companion record written next to each output document.
pub const COMPANION_EXTENSION: &str = "json";

// ---------------------------------------------------------------------------
// DocumentMetadata
// ---------------------------------------------------------------------------

/// Identity of one conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// HTML document to read.
    pub input_path: PathBuf,
    /// Where the composed Markdown is written.
    pub output_path: PathBuf,
    /// Optional title override.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional free-text context handed to the composer.
    #[serde(default)]
    pub context: Option<String>,
}

impl DocumentMetadata {
    /// File stem of the input document (`manual` for `docs/manual.html`).
    pub fn stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Title override, falling back to the input stem.
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.stem())
    }

    /// Sibling path of the companion record (same stem, `.json`).
    pub fn companion_path(&self) -> PathBuf {
        companion_path_for(&self.output_path)
    }
}

/// Companion record path for a given output path.
pub fn companion_path_for(output_path: &Path) -> PathBuf {
    output_path.with_extension(COMPANION_EXTENSION)
}

// ---------------------------------------------------------------------------
// SectionChunk
// ---------------------------------------------------------------------------

/// A contiguous span of document text bounded by heading boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionChunk {
    /// Stable identifier derived from position (`sec-1`, `sec-2`, ...).
    pub id: String,
    /// Heading text, if the section followed a heading.
    pub heading: Option<String>,
    /// Heading level 1–6.
    pub level: u8,
    /// Body text; tables are pipe grids, code blocks are fenced.
    pub body: String,
    /// 1-based, dense, strictly increasing order index.
    pub order: usize,
}

impl SectionChunk {
    /// Render the section the way it is shown to the generation capability.
    pub fn to_prompt_fragment(&self) -> String {
        let heading = self.heading.as_deref().unwrap_or("(untitled)");
        format!(
            "[{}] {} (level={})\n{}",
            self.id,
            heading,
            self.level,
            self.body.trim()
        )
        .trim()
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// An embedded resource (image) referenced by the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// `asset-1`, `asset-2`, ... in document order.
    pub id: String,
    /// Source reference; empty when the markup had none.
    pub src: String,
    /// Alt/description text.
    pub alt: Option<String>,
}

// ---------------------------------------------------------------------------
// KnowledgeUnit
// ---------------------------------------------------------------------------

/// An atomic piece of actionable knowledge extracted from one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub related_queries: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Identifier of the section that produced this unit.
    pub source_section: Option<String>,
}

// ---------------------------------------------------------------------------
// RelationEdge
// ---------------------------------------------------------------------------

/// A directed, labeled link between two knowledge units.
///
/// Endpoints are not checked against the known unit identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source_id: String,
    pub target_id: String,
    /// Free-form label such as `prerequisite` or `alternative`.
    pub relation: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of the output validator. Issues accumulate; nothing short-circuits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationReport {
    /// Build a report whose validity is derived from the issue list.
    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// Report recorded when the validator stage is disabled.
    pub fn skipped() -> Self {
        Self::from_issues(Vec::new())
    }
}

/// Outcome of the consistency review stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub passed: bool,
    #[serde(default)]
    pub findings: Vec<String>,
}

// ---------------------------------------------------------------------------
// TokenUsage
// ---------------------------------------------------------------------------

/// Input/output token counters reported by the generation capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Add another usage sample to this counter.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Usage accumulated since an earlier snapshot of the same counter.
    pub fn since(&self, earlier: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
