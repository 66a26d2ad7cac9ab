//! Relation Linker: one request per document over the full knowledge list.

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use html2doc_generation::{Generator, Message, RequestOptions};
use html2doc_shared::{KnowledgeUnit, RelationEdge, Result};

use crate::json::{self, first_text_field, text_field};

const INSTRUCTIONS: &str = "You are a knowledge-graph specialist. \
Read the knowledge units below and return the meaningful relations between them \
(prerequisite, derivative, alternative and similar) as a JSON array. \
Each element is an object with the keys source_id, target_id, relation and reason.";

/// Label used when a relation object carries none.
const DEFAULT_RELATION: &str = "related";

/// Infer directed relations over all knowledge units of a document.
///
/// Makes no request when `knowledge` is empty.
///
/// # Errors
///
/// Propagates generation failures and JSON parse errors.
#[instrument(skip_all, fields(units = knowledge.len()))]
pub async fn link_relations<G: Generator>(
    generator: &G,
    options: &RequestOptions,
    knowledge: &[KnowledgeUnit],
) -> Result<Vec<RelationEdge>> {
    if knowledge.is_empty() {
        return Ok(Vec::new());
    }

    let payload = json!(knowledge);
    let messages = [
        Message::system(INSTRUCTIONS),
        Message::user(format!("Knowledge units: {payload}")),
    ];
    let generation = generator.generate(&messages, options).await?;
    let edges = parse_relations(&generation.text)?;

    debug!(edges = edges.len(), "relations linked");
    Ok(edges)
}

/// Parse a relation response, dropping items that lack an endpoint.
pub(crate) fn parse_relations(text: &str) -> Result<Vec<RelationEdge>> {
    let edges = json::parse_items(text)?
        .iter()
        .enumerate()
        .filter(|(_, item)| !json::is_empty_value(item))
        .filter_map(|(index, item)| {
            let edge = edge_from(item);
            if edge.is_none() {
                warn!(position = index + 1, "dropping relation without both endpoints");
            }
            edge
        })
        .collect();
    Ok(edges)
}

fn edge_from(item: &Value) -> Option<RelationEdge> {
    let object = item.as_object()?;
    let source_id = first_text_field(object, &["source_id"])?;
    let target_id = first_text_field(object, &["target_id"])?;

    Some(RelationEdge {
        source_id,
        target_id,
        relation: first_text_field(object, &["relation"])
            .unwrap_or_else(|| DEFAULT_RELATION.to_string()),
        reason: text_field(object, "reason"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use html2doc_generation::ScriptedGenerator;

    fn options() -> RequestOptions {
        RequestOptions {
            model: "mock".into(),
            temperature: 0.0,
            top_p: None,
            max_output_tokens: None,
        }
    }

    fn unit(id: &str) -> KnowledgeUnit {
        KnowledgeUnit {
            id: id.into(),
            title: format!("Unit {id}"),
            source_section: Some("sec-1".into()),
            ..KnowledgeUnit::default()
        }
    }

    #[tokio::test]
    async fn empty_knowledge_makes_no_request() {
        let generator = ScriptedGenerator::default();
        let edges = link_relations(&generator, &options(), &[]).await.unwrap();
        assert!(edges.is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn sends_all_units_in_one_request() {
        let generator = ScriptedGenerator::with_responses([
            r#"[{"source_id": "a", "target_id": "b", "relation": "prerequisite", "reason": "a first"}]"#,
        ]);
        let edges = link_relations(&generator, &options(), &[unit("a"), unit("b")])
            .await
            .unwrap();

        assert_eq!(generator.call_count(), 1);
        let content = &generator.requests()[0][1].content;
        assert!(content.starts_with("Knowledge units: ["));
        assert!(content.contains(r#""id":"a""#) && content.contains(r#""id":"b""#));

        assert_eq!(
            edges,
            vec![RelationEdge {
                source_id: "a".into(),
                target_id: "b".into(),
                relation: "prerequisite".into(),
                reason: "a first".into(),
            }]
        );
    }

    #[test]
    fn drops_items_missing_an_endpoint() {
        let text = r#"[
            {"source_id": "a", "target_id": "b"},
            {"source_id": "a"},
            {"target_id": "b", "relation": "alternative"},
            {"source_id": "", "target_id": "b"},
            "a -> b",
            null
        ]"#;
        let edges = parse_relations(text).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, "related");
        assert_eq!(edges[0].reason, "");
    }

    #[test]
    fn dangling_endpoints_are_kept() {
        let edges = parse_relations(r#"[{"source_id": "x", "target_id": "nowhere"}]"#).unwrap();
        assert_eq!(edges[0].target_id, "nowhere");
    }
}
