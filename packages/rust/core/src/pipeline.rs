//! Per-document pipeline:
//! load → extract → (outline) → knowledge → relations → compose → (review) → (validate) → persist.
//!
//! Each stage takes the [`DocumentState`] by value and returns the next one;
//! a failing stage hands the state it was given back with the error. The
//! first failure ends the run with [`Terminal::Aborted`].

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use html2doc_extract::{build_outline, extract};
use html2doc_generation::{Generator, RequestOptions};
use html2doc_shared::{
    Asset, DocumentMetadata, Html2DocError, KnowledgeUnit, PipelineConfig, RelationEdge, Result,
    ReviewReport, SectionChunk, ValidationReport,
};

use crate::batch::BatchProgress;
use crate::compose::{ComposeInput, compose_document};
use crate::knowledge::extract_knowledge;
use crate::persist::{CompanionRecord, PersistedPaths, persist_document};
use crate::relations::link_relations;
use crate::review::review_consistency;
use crate::validate::validate_output;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One step of the per-document pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Extract,
    Outline,
    Knowledge,
    Relations,
    Compose,
    Review,
    Validate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Extract => "extract",
            Self::Outline => "outline",
            Self::Knowledge => "knowledge",
            Self::Relations => "relations",
            Self::Compose => "compose",
            Self::Review => "review",
            Self::Validate => "validate",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub outline: bool,
    pub review: bool,
    pub validate: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            outline: config.outline,
            review: config.review,
            validate: config.validate,
        }
    }
}

impl PipelineOptions {
    /// The stage sequence these options produce.
    pub fn stages(&self) -> Vec<Stage> {
        [
            (Stage::Load, true),
            (Stage::Extract, true),
            (Stage::Outline, self.outline),
            (Stage::Knowledge, true),
            (Stage::Relations, true),
            (Stage::Compose, true),
            (Stage::Review, self.review),
            (Stage::Validate, self.validate),
            (Stage::Persist, true),
        ]
        .into_iter()
        .filter_map(|(stage, enabled)| enabled.then_some(stage))
        .collect()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything one document's run has produced so far.
///
/// Stages never mutate a field set by an earlier stage; each returns a new
/// state with its own output filled in.
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub run_id: Uuid,
    pub metadata: DocumentMetadata,
    pub html: Option<String>,
    pub input_sha256: Option<String>,
    pub sections: Vec<SectionChunk>,
    pub assets: Vec<Asset>,
    pub outline: Option<String>,
    pub knowledge: Vec<KnowledgeUnit>,
    pub relations: Vec<RelationEdge>,
    pub markdown: Option<String>,
    pub review: Option<ReviewReport>,
    pub validation: Option<ValidationReport>,
    pub persisted: Option<PersistedPaths>,
}

impl DocumentState {
    pub fn new(metadata: DocumentMetadata) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            metadata,
            html: None,
            input_sha256: None,
            sections: Vec::new(),
            assets: Vec::new(),
            outline: None,
            knowledge: Vec::new(),
            relations: Vec::new(),
            markdown: None,
            review: None,
            validation: None,
            persisted: None,
        }
    }

    fn require_html(&self) -> Result<&str> {
        self.html
            .as_deref()
            .ok_or_else(|| Html2DocError::Pipeline("document was not loaded".into()))
    }

    fn require_markdown(&self) -> Result<&str> {
        self.markdown
            .as_deref()
            .ok_or_else(|| Html2DocError::Pipeline("document was not composed".into()))
    }

    /// Build the next state from a stage's output, or fail with this one.
    fn then_with<T>(self, outcome: Result<T>, next: impl FnOnce(Self, T) -> Self) -> StageResult {
        match outcome {
            Ok(value) => Ok(next(self, value)),
            Err(error) => Err(StageFailure {
                error,
                state: Box::new(self),
            }),
        }
    }
}

/// A stage error together with the unchanged state the stage received.
#[derive(Debug)]
struct StageFailure {
    error: Html2DocError,
    state: Box<DocumentState>,
}

type StageResult = std::result::Result<DocumentState, StageFailure>;

/// How one document's run ended.
#[derive(Debug)]
pub enum Terminal {
    Persisted {
        state: Box<DocumentState>,
        paths: PersistedPaths,
    },
    Aborted {
        stage: Stage,
        error: Html2DocError,
        state: Box<DocumentState>,
    },
}

impl Terminal {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs documents through the stage sequence with one generator.
pub struct Pipeline<'a, G> {
    generator: &'a G,
    request: RequestOptions,
    options: PipelineOptions,
}

impl<'a, G: Generator> Pipeline<'a, G> {
    pub fn new(generator: &'a G, request: RequestOptions, options: PipelineOptions) -> Self {
        Self {
            generator,
            request,
            options,
        }
    }

    /// Process one document from a fresh state to a terminal state.
    #[instrument(skip_all, fields(input = %metadata.input_path.display()))]
    pub async fn run(&self, metadata: DocumentMetadata, progress: &dyn BatchProgress) -> Terminal {
        let start = Instant::now();
        let mut state = DocumentState::new(metadata);
        info!(run_id = %state.run_id, "pipeline started");

        for stage in self.options.stages() {
            progress.stage_entered(stage);
            debug!(%stage, "entering stage");

            match self.advance(stage, state).await {
                Ok(next) => state = next,
                Err(StageFailure { error, state }) => {
                    error!(%stage, %error, "pipeline aborted");
                    return Terminal::Aborted {
                        stage,
                        error,
                        state,
                    };
                }
            }
        }

        let Some(paths) = state.persisted.clone() else {
            return Terminal::Aborted {
                stage: Stage::Persist,
                error: Html2DocError::Pipeline("document was not persisted".into()),
                state: Box::new(state),
            };
        };

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            output = %paths.output_path.display(),
            "pipeline finished"
        );
        Terminal::Persisted {
            state: Box::new(state),
            paths,
        }
    }

    async fn advance(&self, stage: Stage, state: DocumentState) -> StageResult {
        match stage {
            Stage::Load => load(state).await,
            Stage::Extract => extract_structure(state),
            Stage::Outline => Ok(outline(state)),
            Stage::Knowledge => self.knowledge(state).await,
            Stage::Relations => self.relations(state).await,
            Stage::Compose => self.compose(state).await,
            Stage::Review => self.review(state).await,
            Stage::Validate => validate(state),
            Stage::Persist => persist(state),
        }
    }

    async fn knowledge(&self, state: DocumentState) -> StageResult {
        let knowledge = self.extract_all(&state).await;
        state.then_with(knowledge, |state, knowledge| {
            info!(units = knowledge.len(), "knowledge extraction complete");
            DocumentState { knowledge, ..state }
        })
    }

    /// Units for every section, in section order. Stops at the first failure.
    async fn extract_all(&self, state: &DocumentState) -> Result<Vec<KnowledgeUnit>> {
        let mut knowledge = Vec::new();
        for section in &state.sections {
            let units = extract_knowledge(
                self.generator,
                &self.request,
                section,
                state.outline.as_deref(),
            )
            .await?;
            knowledge.extend(units);
        }
        Ok(knowledge)
    }

    async fn relations(&self, state: DocumentState) -> StageResult {
        let relations = link_relations(self.generator, &self.request, &state.knowledge).await;
        state.then_with(relations, |state, relations| DocumentState { relations, ..state })
    }

    async fn compose(&self, state: DocumentState) -> StageResult {
        let input = ComposeInput {
            metadata: &state.metadata,
            knowledge: &state.knowledge,
            relations: &state.relations,
            sections: &state.sections,
            outline: state.outline.as_deref(),
            assets: &state.assets,
        };
        let markdown = compose_document(self.generator, &self.request, input).await;
        state.then_with(markdown, |state, markdown| DocumentState {
            markdown: Some(markdown),
            ..state
        })
    }

    async fn review(&self, state: DocumentState) -> StageResult {
        let report = self.passing_review(&state).await;
        state.then_with(report, |state, report| DocumentState {
            review: Some(report),
            ..state
        })
    }

    async fn passing_review(&self, state: &DocumentState) -> Result<ReviewReport> {
        let report = review_consistency(
            self.generator,
            &self.request,
            state.require_markdown()?,
            &state.sections,
        )
        .await?;
        if !report.passed {
            return Err(Html2DocError::Review {
                findings: report.findings,
            });
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Local stages
// ---------------------------------------------------------------------------

async fn load(state: DocumentState) -> StageResult {
    let path = &state.metadata.input_path;
    let html = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Html2DocError::InputNotFound { path: path.clone() }
        } else {
            Html2DocError::io(path, e)
        }
    });

    state.then_with(html, |state, html| {
        let digest = format!("{:x}", Sha256::digest(html.as_bytes()));
        debug!(bytes = html.len(), "input loaded");
        DocumentState {
            html: Some(html),
            input_sha256: Some(digest),
            ..state
        }
    })
}

fn extract_structure(state: DocumentState) -> StageResult {
    let document = state.require_html().map(extract);
    state.then_with(document, |state, document| {
        info!(
            sections = document.sections.len(),
            assets = document.assets.len(),
            "structure extracted"
        );
        DocumentState {
            sections: document.sections,
            assets: document.assets,
            ..state
        }
    })
}

fn outline(state: DocumentState) -> DocumentState {
    let outline = build_outline(&state.sections);
    DocumentState {
        outline: Some(outline),
        ..state
    }
}

fn validate(state: DocumentState) -> StageResult {
    let report = state
        .require_markdown()
        .map(|markdown| validate_output(markdown, &state.knowledge))
        .and_then(|report| {
            if report.valid {
                Ok(report)
            } else {
                Err(Html2DocError::Validation {
                    issues: report.issues,
                })
            }
        });
    state.then_with(report, |state, report| DocumentState {
        validation: Some(report),
        ..state
    })
}

fn persist(state: DocumentState) -> StageResult {
    let record = CompanionRecord {
        run_id: state.run_id,
        generated_at: Utc::now(),
        input_sha256: state.input_sha256.clone().unwrap_or_default(),
        metadata: state.metadata.clone(),
        outline: state.outline.clone(),
        sections: state.sections.clone(),
        assets: state.assets.clone(),
        knowledge: state.knowledge.clone(),
        relations: state.relations.clone(),
        validation: state
            .validation
            .clone()
            .unwrap_or_else(ValidationReport::skipped),
        review: state.review.clone(),
    };
    let paths = state
        .require_markdown()
        .and_then(|markdown| persist_document(markdown, &record));
    state.then_with(paths, |state, paths| DocumentState {
        persisted: Some(paths),
        ..state
    })
}
