//! Consistency review: asks the generator to compare the composed document
//! against the source sections and report unsupported statements.

use serde_json::Value;
use tracing::{debug, instrument};

use html2doc_generation::{Generator, Message, RequestOptions};
use html2doc_shared::{Result, ReviewReport, SectionChunk};

use crate::json::{self, text_field};

/// Maximum number of section fragments sent as reference text.
pub const MAX_REFERENCE_SECTIONS: usize = 30;

/// Output budget for the review request.
pub const REVIEW_MAX_OUTPUT_TOKENS: u32 = 600;

const INSTRUCTIONS: &str = "You are a quality inspector for support manuals. \
Compare the reference sections with the generated Markdown and list every statement \
that is absent from or contradicts the sources as a JSON array. \
Each element is an object with the keys statement and reason. \
Return [] when there is nothing to report.";

/// Review `markdown` against the first [`MAX_REFERENCE_SECTIONS`] sections.
///
/// Makes no request when the text is blank or there are no sections; the
/// review then passes with no findings.
///
/// # Errors
///
/// Propagates generation failures and JSON parse errors.
#[instrument(skip_all, fields(sections = sections.len()))]
pub async fn review_consistency<G: Generator>(
    generator: &G,
    options: &RequestOptions,
    markdown: &str,
    sections: &[SectionChunk],
) -> Result<ReviewReport> {
    if markdown.trim().is_empty() || sections.is_empty() {
        return Ok(ReviewReport {
            passed: true,
            findings: Vec::new(),
        });
    }

    let reference = sections
        .iter()
        .take(MAX_REFERENCE_SECTIONS)
        .map(SectionChunk::to_prompt_fragment)
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = format!(
        "### Reference sections\n{reference}\n\n### Generated Markdown\n{markdown}"
    );

    let messages = [Message::system(INSTRUCTIONS), Message::user(prompt)];
    let options = options.clone().with_max_output_tokens(REVIEW_MAX_OUTPUT_TOKENS);
    let generation = generator.generate(&messages, &options).await?;

    let findings: Vec<String> = json::parse_items(&generation.text)?
        .iter()
        .filter_map(finding_text)
        .collect();

    debug!(findings = findings.len(), "consistency review complete");
    Ok(ReviewReport {
        passed: findings.is_empty(),
        findings,
    })
}

fn finding_text(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(s) => s.trim().to_string(),
        Value::Object(object) => {
            let statement = text_field(object, "statement");
            let reason = text_field(object, "reason");
            match (statement.trim(), reason.trim()) {
                ("", reason) => reason.to_string(),
                (statement, "") => statement.to_string(),
                (statement, reason) => format!("{statement} (reason: {reason})"),
            }
        }
        _ => String::new(),
    };
    (!text.is_empty()).then_some(text)
}
