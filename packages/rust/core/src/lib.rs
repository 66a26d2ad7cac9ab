//! Core pipeline for html2doc.
//!
//! Takes one HTML document through structural extraction, knowledge
//! extraction, relation linking, composition, optional review and validation,
//! and persistence. [`batch::run_batch`] drives a whole job config.

pub mod batch;
pub mod compose;
mod json;
pub mod knowledge;
pub mod persist;
pub mod pipeline;
pub mod relations;
pub mod review;
pub mod validate;

pub use batch::{BatchProgress, DocumentResult, SilentProgress, run_batch};
pub use persist::{CompanionRecord, PersistedPaths};
pub use pipeline::{DocumentState, Pipeline, PipelineOptions, Stage, Terminal};
