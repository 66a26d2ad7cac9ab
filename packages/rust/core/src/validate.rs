//! Output Validator: local checks on the composed text.

use tracing::debug;

use html2doc_shared::{KnowledgeUnit, ValidationReport};

pub const ISSUE_EMPTY: &str = "output is empty";
pub const ISSUE_NO_TITLE: &str = "missing leading title heading";
pub const ISSUE_LOW_COVERAGE: &str = "majority of extracted knowledge missing from output";

/// Number of leading knowledge units sampled by the coverage check.
pub const COVERAGE_SAMPLE: usize = 10;

/// Check the composed text. Every failing check adds an issue.
///
/// Coverage samples the first [`COVERAGE_SAMPLE`] units; a unit is missing when
/// its non-empty title is not a substring of the text. The check fails once
/// `missing >= max(3, sample / 2 + 1)`.
pub fn validate_output(text: &str, knowledge: &[KnowledgeUnit]) -> ValidationReport {
    let mut issues = Vec::new();
    let stripped = text.trim();

    if stripped.is_empty() {
        issues.push(ISSUE_EMPTY.to_string());
    } else if !stripped.starts_with('#') {
        issues.push(ISSUE_NO_TITLE.to_string());
    }

    let sample = &knowledge[..knowledge.len().min(COVERAGE_SAMPLE)];
    let missing = sample
        .iter()
        .filter(|unit| !unit.title.is_empty() && !text.contains(unit.title.as_str()))
        .count();
    if missing >= (sample.len() / 2 + 1).max(3) {
        issues.push(ISSUE_LOW_COVERAGE.to_string());
    }

    debug!(missing, sampled = sample.len(), issues = issues.len(), "output validated");
    ValidationReport::from_issues(issues)
}
