//! Batch driver: runs every configured document through the pipeline, one at
//! a time, and isolates per-document failures.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use html2doc_generation::{Generator, RequestOptions};
use html2doc_shared::{
    DocumentMetadata, Html2DocError, JobConfig, Result, ReviewReport, TokenUsage,
    ValidationReport, resolve_documents,
};

use crate::pipeline::{Pipeline, PipelineOptions, Stage, Terminal};

/// Outcome of one document, as consumed by the CLI.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub metadata: DocumentMetadata,
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub record_path: Option<PathBuf>,
    pub validation: Option<ValidationReport>,
    pub review: Option<ReviewReport>,
    /// Stage that failed, when the document was aborted.
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Tokens consumed while processing this document.
    pub usage: TokenUsage,
    pub elapsed: Duration,
}

/// Progress callback for batch runs.
pub trait BatchProgress: Send + Sync {
    /// Called before a document enters the pipeline (`current` is 1-based).
    fn document_started(&self, metadata: &DocumentMetadata, current: usize, total: usize);
    /// Called when a pipeline stage begins.
    fn stage_entered(&self, stage: Stage);
    /// Called once the document reached a terminal state.
    fn document_finished(&self, result: &DocumentResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn document_started(&self, _metadata: &DocumentMetadata, _current: usize, _total: usize) {}
    fn stage_entered(&self, _stage: Stage) {}
    fn document_finished(&self, _result: &DocumentResult) {}
}

/// Convert every document in `config`, strictly in order.
///
/// Output paths are resolved (and checked for collisions) before anything is
/// processed. A failing document is recorded in its result and the batch moves
/// on.
///
/// # Errors
///
/// Returns [`Html2DocError::Config`] for configuration problems and
/// [`Html2DocError::Io`] when the output directory cannot be created. Per-document
/// failures are never returned here.
#[instrument(skip_all, fields(files = config.files.len(), model = %config.model.name))]
pub async fn run_batch<G: Generator>(
    generator: &G,
    config: &JobConfig,
    progress: &dyn BatchProgress,
) -> Result<Vec<DocumentResult>> {
    let output_dir = config.output_dir();
    let documents = resolve_documents(&config.files, &output_dir)?;

    std::fs::create_dir_all(&output_dir).map_err(|e| Html2DocError::io(&output_dir, e))?;

    let pipeline = Pipeline::new(
        generator,
        RequestOptions::from(&config.model),
        PipelineOptions::from(&config.pipeline),
    );

    let total = documents.len();
    let mut results = Vec::with_capacity(total);
    info!(total, output_dir = %output_dir.display(), generator = generator.name(), "batch started");

    for (index, metadata) in documents.into_iter().enumerate() {
        progress.document_started(&metadata, index + 1, total);

        let start = Instant::now();
        let before = generator.usage_total();
        let terminal = pipeline.run(metadata, progress).await;
        let usage = generator.usage_total().since(before);

        let result = document_result(terminal, usage, start.elapsed());
        progress.document_finished(&result);
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        warn!(failed, total, "batch finished with failures");
    } else {
        info!(total, "batch finished");
    }

    Ok(results)
}

fn document_result(terminal: Terminal, usage: TokenUsage, elapsed: Duration) -> DocumentResult {
    match terminal {
        Terminal::Persisted { state, paths } => DocumentResult {
            metadata: state.metadata,
            success: true,
            output_path: Some(paths.output_path),
            record_path: Some(paths.record_path),
            validation: state.validation,
            review: state.review,
            failed_stage: None,
            error: None,
            usage,
            elapsed,
        },
        Terminal::Aborted { stage, error, state } => DocumentResult {
            metadata: state.metadata,
            success: false,
            output_path: None,
            record_path: None,
            validation: error
                .validation_issues()
                .map(|issues| ValidationReport::from_issues(issues.to_vec())),
            review: state.review,
            failed_stage: Some(stage),
            error: Some(error.to_string()),
            usage,
            elapsed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use html2doc_generation::ScriptedGenerator;
    use html2doc_shared::{FileEntry, OutputConfig};
    use std::path::Path;

    /// Path to the shared HTML fixtures.
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/html")
            .join(name)
    }

    fn entry(input: PathBuf) -> FileEntry {
        FileEntry {
            input,
            title: None,
            context: None,
            output: None,
        }
    }

    fn config(files: Vec<FileEntry>, output_dir: &Path) -> JobConfig {
        JobConfig {
            files,
            output: OutputConfig {
                dir: Some(output_dir.to_path_buf()),
            },
            base_dir: output_dir.to_path_buf(),
            ..JobConfig::default()
        }
    }

    fn manual_responses() -> Vec<&'static str> {
        vec![
            r#"[{"id": "intro", "title": "Support manual overview", "summary": "Scope of the manual"}]"#,
            r#"```json
[{"title": "Reset a customer password", "steps": ["Open the account settings page.", "Choose Reset password"]}]
```"#,
            r#"[{"title": "Plan seat limits", "tags": ["billing"]}]"#,
            r#"[{"title": "Check usage from the console"}]"#,
            r#"[{"source_id": "sec-3-ku-1", "target_id": "sec-4-ku-1", "relation": "prerequisite", "reason": "limits explain usage"}]"#,
            "# Customer Support Manual\n\n## Support manual overview\n\n## Reset a customer password\n\n\
             ## Plan seat limits\n\n## Check usage from the console\n\n## Related links\n",
        ]
    }

    #[tokio::test]
    async fn converts_fixture_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = entry(fixture("support-manual.html"));
        file.title = Some("Customer Support Manual".into());
        file.context = Some("support desk".into());
        let config = config(vec![file], dir.path());
        let generator = ScriptedGenerator::with_responses(manual_responses());

        let results = run_batch(&generator, &config, &SilentProgress).await.unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.success, "{:?}", result.error);
        assert_eq!(generator.call_count(), 6);

        let output_path = result.output_path.as_ref().unwrap();
        assert_eq!(output_path, &dir.path().join("support-manual.md"));
        assert!(output_path.exists());
        assert!(
            std::fs::read_to_string(output_path)
                .unwrap()
                .starts_with("# Customer Support Manual")
        );

        let record_path = result.record_path.as_ref().unwrap();
        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(record_path).unwrap()).unwrap();
        assert_eq!(record["metadata"]["title"], "Customer Support Manual");
        assert_eq!(record["metadata"]["context"], "support desk");
        assert_eq!(record["validation"]["valid"], true);
        assert_eq!(record["validation"]["issues"], serde_json::json!([]));
        assert_eq!(record["sections"].as_array().unwrap().len(), 4);
        assert_eq!(record["assets"].as_array().unwrap().len(), 2);
        assert_eq!(record["knowledge"][0]["id"], "intro");
        assert_eq!(record["knowledge"][1]["id"], "sec-2-ku-1");
        assert_eq!(record["knowledge"][1]["source_section"], "sec-2");
        assert_eq!(record["relations"][0]["relation"], "prerequisite");
        assert_eq!(record["input_sha256"].as_str().unwrap().len(), 64);

        assert_eq!(
            result.usage,
            TokenUsage {
                input_tokens: 60,
                output_tokens: 30
            }
        );
    }

    #[tokio::test]
    async fn duplicate_outputs_fail_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = config(
            vec![
                entry(dir.path().join("a/manual.html")),
                entry(dir.path().join("b/manual.html")),
            ],
            &out,
        );
        let generator = ScriptedGenerator::default();

        let err = run_batch(&generator, &config, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Html2DocError::Config { .. }));
        let msg = err.to_string();
        assert!(msg.contains("a/manual.html") || msg.contains("a\\manual.html"), "{msg}");
        assert_eq!(generator.call_count(), 0);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn failures_are_isolated_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            vec![
                entry(dir.path().join("missing.html")),
                entry(fixture("support-manual.html")),
            ],
            dir.path(),
        );
        let generator = ScriptedGenerator::with_responses(manual_responses());

        let results = run_batch(&generator, &config, &SilentProgress).await.unwrap();
        assert_eq!(results.len(), 2);

        let missing = &results[0];
        assert!(!missing.success);
        assert_eq!(missing.failed_stage, Some(Stage::Load));
        assert!(missing.error.as_deref().unwrap().starts_with("input file not found"));
        assert_eq!(missing.usage, TokenUsage::default());
        assert!(missing.output_path.is_none());

        assert!(results[1].success);
        assert_eq!(results[1].usage.input_tokens, 60);
    }

    #[tokio::test]
    async fn provider_failure_is_recorded_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("second.html");
        std::fs::write(&second, "<h1>Second</h1><p>Short page.</p>").unwrap();
        let config = config(
            vec![entry(fixture("support-manual.html")), entry(second)],
            &dir.path().join("out"),
        );

        let generator = ScriptedGenerator::default();
        generator.push_failure("HTTP 503: upstream unavailable");
        for response in ["[]", "# Second\n\nShort page."] {
            generator.push_response(response);
        }

        let results = run_batch(&generator, &config, &SilentProgress).await.unwrap();
        assert!(!results[0].success);
        assert_eq!(results[0].failed_stage, Some(Stage::Knowledge));
        assert_eq!(
            results[0].error.as_deref(),
            Some("generation error: HTTP 503: upstream unavailable")
        );

        assert!(results[1].success, "{:?}", results[1].error);
        assert!(dir.path().join("out/second.md").exists());
        assert!(dir.path().join("out/second.json").exists());
    }

    #[tokio::test]
    async fn validation_failure_surfaces_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<h1>Page</h1><p>Body.</p>").unwrap();
        let config = config(vec![entry(input)], dir.path());
        let generator = ScriptedGenerator::with_responses(["[]", ""]);

        let results = run_batch(&generator, &config, &SilentProgress).await.unwrap();
        let result = &results[0];
        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(Stage::Validate));
        let report = result.validation.as_ref().unwrap();
        assert!(!report.valid);
        assert_eq!(report.issues, vec!["output is empty"]);
        assert!(!dir.path().join("page.md").exists());
    }
}
