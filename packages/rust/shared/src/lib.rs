//! Shared types, error model, and job configuration for html2doc.
//!
//! This crate is the foundation depended on by all other html2doc crates.
//! It provides:
//! - [`Html2DocError`] — the unified error type
//! - Domain types ([`DocumentMetadata`], [`SectionChunk`], [`KnowledgeUnit`], ...)
//! - Job configuration ([`JobConfig`], [`load_job_config`], output resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    FileEntry, JobConfig, ModelConfig, OutputConfig, PipelineConfig, ProviderConfig,
    load_input_list, load_job_config, resolve_documents,
};
pub use error::{Html2DocError, Result};
pub use types::{
    Asset, COMPANION_EXTENSION, DocumentMetadata, KnowledgeUnit, RelationEdge, ReviewReport,
    SectionChunk, TokenUsage, ValidationReport, companion_path_for,
};
