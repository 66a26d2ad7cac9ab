//! Persistence Sink: writes the composed document and its companion record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use html2doc_shared::{
    Asset, DocumentMetadata, Html2DocError, KnowledgeUnit, RelationEdge, Result, ReviewReport,
    SectionChunk, ValidationReport,
};

/// Structured side-car written next to every output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRecord {
    /// Time-sortable identifier of the pipeline run that produced the record.
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 of the input HTML.
    pub input_sha256: String,
    pub metadata: DocumentMetadata,
    pub outline: Option<String>,
    pub sections: Vec<SectionChunk>,
    pub assets: Vec<Asset>,
    pub knowledge: Vec<KnowledgeUnit>,
    pub relations: Vec<RelationEdge>,
    pub validation: ValidationReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewReport>,
}

/// Paths written by [`persist_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPaths {
    pub output_path: PathBuf,
    pub record_path: PathBuf,
}

/// Write `text` to the record's output path, then the companion record to its
/// sibling `.json` path. Parent directories are created as needed and existing
/// files are overwritten.
///
/// Each file is replaced atomically; the pair is not. A failure between the
/// two writes leaves the document without its record.
///
/// # Errors
///
/// Returns [`Html2DocError::Io`] on filesystem failures and
/// [`Html2DocError::Storage`] when the record cannot be serialized.
#[instrument(skip_all, fields(output = %record.metadata.output_path.display()))]
pub fn persist_document(text: &str, record: &CompanionRecord) -> Result<PersistedPaths> {
    let output_path = record.metadata.output_path.clone();
    let record_path = record.metadata.companion_path();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Html2DocError::io(parent, e))?;
    }

    write_atomic(&output_path, text)?;

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Html2DocError::Storage(format!("companion record serialization failed: {e}")))?;
    write_atomic(&record_path, &json)?;

    info!(
        output = %output_path.display(),
        record = %record_path.display(),
        "document persisted"
    );

    Ok(PersistedPaths {
        output_path,
        record_path,
    })
}

/// Write through a temporary sibling and rename over the target.
fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp = PathBuf::from(temp_name);

    std::fs::write(&temp, content).map_err(|e| Html2DocError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| Html2DocError::io(target, e))?;

    debug!(path = %target.display(), size = content.len(), "wrote file");
    Ok(())
}
