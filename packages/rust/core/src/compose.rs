//! Document Composer.

use serde_json::json;
use tracing::{debug, instrument};

use html2doc_generation::{Generator, Message, RequestOptions};
use html2doc_shared::{Asset, DocumentMetadata, KnowledgeUnit, RelationEdge, Result, SectionChunk};

const INSTRUCTIONS: &str = "You write Markdown documentation. \
Organize the provided knowledge into a clear support manual. \
Open with a top-level `# Title` heading, then include a summary, detailed steps and a related links section. \
Use the relations to cross-reference related procedures. \
When a document outline or assets such as images are provided, refer to them where they help explain a procedure.";

/// Everything the composer reads. A missing outline is sent as `null`.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub metadata: &'a DocumentMetadata,
    pub knowledge: &'a [KnowledgeUnit],
    pub relations: &'a [RelationEdge],
    pub sections: &'a [SectionChunk],
    pub outline: Option<&'a str>,
    pub assets: &'a [Asset],
}

/// Compose the final document text with a single request.
///
/// The response is returned trimmed; structure is checked later by the
/// validator.
///
/// # Errors
///
/// Propagates generation failures.
#[instrument(skip_all, fields(units = input.knowledge.len(), relations = input.relations.len()))]
pub async fn compose_document<G: Generator>(
    generator: &G,
    options: &RequestOptions,
    input: ComposeInput<'_>,
) -> Result<String> {
    let payload = json!({
        "metadata": {
            "title": input.metadata.display_title(),
            "context": input.metadata.context,
        },
        "knowledge": input.knowledge,
        "relations": input.relations,
        "sections": input.sections,
        "outline": input.outline,
        "assets": input.assets,
    });

    let messages = [Message::system(INSTRUCTIONS), Message::user(payload.to_string())];
    let generation = generator.generate(&messages, options).await?;
    let text = generation.text.trim().to_string();

    debug!(chars = text.len(), "document composed");
    Ok(text)
}
