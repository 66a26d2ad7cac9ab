//! Knowledge Extractor: one generation request per section.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use html2doc_generation::{Generator, Message, RequestOptions};
use html2doc_shared::{Html2DocError, KnowledgeUnit, Result, SectionChunk};

use crate::json::{self, first_text_field, list_field, text_field};

const INSTRUCTIONS: &str = "You are an editor of customer-support manuals. \
Read the section below and return the knowledge an agent can act on as a JSON array. \
Each element is an object with the keys id, title, summary, steps, prerequisites, \
related_queries, tags and source_section. \
Return nothing but the JSON.";

/// Extract knowledge units from one section.
///
/// The outline, when given, is sent as document-wide context ahead of the
/// section itself.
///
/// # Errors
///
/// Propagates generation failures and returns [`Html2DocError::Parse`] when the
/// response is not a JSON array or object of knowledge items.
#[instrument(skip_all, fields(section = %section.id))]
pub async fn extract_knowledge<G: Generator>(
    generator: &G,
    options: &RequestOptions,
    section: &SectionChunk,
    outline: Option<&str>,
) -> Result<Vec<KnowledgeUnit>> {
    let context = outline
        .filter(|o| !o.trim().is_empty())
        .map(|o| format!("Document outline:\n{o}"))
        .unwrap_or_default();
    let body = format!("Section {}:\n{}", section.id, section.to_prompt_fragment());

    let messages = [
        Message::system(INSTRUCTIONS),
        Message::user_parts([context, body]),
    ];
    let generation = generator.generate(&messages, options).await?;
    let units = parse_knowledge(&section.id, &generation.text)?;

    debug!(units = units.len(), "knowledge extracted");
    Ok(units)
}

/// Turn a knowledge response into units attributed to `section_id`.
pub(crate) fn parse_knowledge(section_id: &str, text: &str) -> Result<Vec<KnowledgeUnit>> {
    let mut units = Vec::new();

    for (index, item) in json::parse_items(text)?.iter().enumerate() {
        if json::is_empty_value(item) {
            warn!(section = section_id, position = index + 1, "skipping empty knowledge item");
            continue;
        }
        let Value::Object(object) = item else {
            return Err(Html2DocError::parse(format!(
                "knowledge item {} for {section_id} is not an object",
                index + 1
            )));
        };

        let id = first_text_field(object, &["id", "identifier"])
            .unwrap_or_else(|| format!("{section_id}-ku-{}", index + 1));

        units.push(KnowledgeUnit {
            id,
            title: text_field(object, "title"),
            summary: text_field(object, "summary"),
            steps: list_field(object, "steps"),
            prerequisites: list_field(object, "prerequisites"),
            related_queries: list_field(object, "related_queries"),
            tags: list_field(object, "tags"),
            source_section: Some(section_id.to_string()),
        });
    }

    Ok(units)
}
