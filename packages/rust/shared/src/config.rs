//! Job configuration for html2doc.
//!
//! A job config is a YAML file listing the documents to convert plus model,
//! provider, pipeline, and output settings. Relative paths resolve against the
//! directory holding the file. CLI flags override config file values, which
//! override defaults.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Html2DocError, Result};
use crate::types::{COMPANION_EXTENSION, DocumentMetadata, companion_path_for};

/// Extension given to outputs derived from the input stem.
const DEFAULT_OUTPUT_EXTENSION: &str = "md";

/// Output directory name used when the config does not set one.
const DEFAULT_OUTPUT_DIR: &str = "output";

// ---------------------------------------------------------------------------
// Config structs (matching the YAML schema)
// ---------------------------------------------------------------------------

/// Top-level job config, deserialized from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Generation model parameters.
    #[serde(default)]
    pub model: ModelConfig,

    /// Generation provider endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Optional pipeline stages.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Documents to convert, in processing order.
    #[serde(default)]
    pub files: Vec<FileEntry>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `model:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            temperature: default_temperature(),
            top_p: None,
            max_output_tokens: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}

/// `provider:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `pipeline:` section, toggling the optional stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub outline: bool,

    #[serde(default = "default_true")]
    pub validate: bool,

    #[serde(default)]
    pub review: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outline: true,
            validate: true,
            review: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `output:` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// One document to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub input: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Explicit output name, relative to the output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl FileEntry {
    fn resolved_against(mut self, base_dir: &Path) -> Self {
        self.input = resolve_path(&self.input, base_dir);
        self
    }
}

/// An input-list item: a bare path or a full entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListItem {
    Path(PathBuf),
    Entry(FileEntry),
}

/// An input-list file: a sequence, or a mapping with a `files` key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputList {
    Items(Vec<ListItem>),
    Wrapped { files: Vec<ListItem> },
}

impl JobConfig {
    /// Resolved output directory (`output.dir`, else `<config dir>/output`).
    pub fn output_dir(&self) -> PathBuf {
        match &self.output.dir {
            Some(dir) => resolve_path(dir, &self.base_dir),
            None => self.base_dir.join(DEFAULT_OUTPUT_DIR),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load a job config from a YAML file.
///
/// Inputs are resolved against the file's directory. Unless `allow_empty_files`
/// is set (an input list will supply them), `files` must not be empty.
pub fn load_job_config(path: &Path, allow_empty_files: bool) -> Result<JobConfig> {
    let content = read_config_file(path)?;

    let mut config: JobConfig = if content.trim().is_empty() {
        JobConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            Html2DocError::config(format!("failed to parse {}: {e}", path.display()))
        })?
    };

    config.base_dir = parent_dir(path);
    config.files = std::mem::take(&mut config.files)
        .into_iter()
        .map(|entry| entry.resolved_against(&config.base_dir))
        .collect();

    if config.files.is_empty() && !allow_empty_files {
        return Err(Html2DocError::config(format!(
            "`files` in {} must contain at least one entry",
            path.display()
        )));
    }

    tracing::debug!(
        path = %path.display(),
        files = config.files.len(),
        model = %config.model.name,
        "loaded job config"
    );

    Ok(config)
}

/// Load an input-list file: a YAML sequence of paths/entries, or a mapping
/// with a `files` key. Entries resolve against the list file's directory.
pub fn load_input_list(path: &Path) -> Result<Vec<FileEntry>> {
    let content = read_config_file(path)?;

    let list: InputList = serde_yaml::from_str(&content).map_err(|e| {
        Html2DocError::config(format!(
            "input list {} must be a sequence of paths or entries, or a mapping with `files`: {e}",
            path.display()
        ))
    })?;

    let items = match list {
        InputList::Items(items) | InputList::Wrapped { files: items } => items,
    };

    if items.is_empty() {
        return Err(Html2DocError::config(format!(
            "input list {} must contain at least one entry",
            path.display()
        )));
    }

    let base_dir = parent_dir(path);
    Ok(items
        .into_iter()
        .map(|item| match item {
            ListItem::Path(input) => FileEntry {
                input,
                title: None,
                context: None,
                output: None,
            },
            ListItem::Entry(entry) => entry,
        })
        .map(|entry| entry.resolved_against(&base_dir))
        .collect())
}

// ---------------------------------------------------------------------------
// Output resolution
// ---------------------------------------------------------------------------

/// Turn configured entries into per-document metadata.
///
/// Every resolved output path, and the companion record beside it, must be
/// unique across the batch; collisions are reported together with every
/// input that maps onto the same path.
pub fn resolve_documents(files: &[FileEntry], output_dir: &Path) -> Result<Vec<DocumentMetadata>> {
    if files.is_empty() {
        return Err(Html2DocError::config("no documents configured"));
    }

    let mut documents = Vec::with_capacity(files.len());
    let mut targets: BTreeMap<PathBuf, Vec<&Path>> = BTreeMap::new();
    let mut records: BTreeMap<PathBuf, Vec<(&Path, PathBuf)>> = BTreeMap::new();

    for entry in files {
        let output_path = resolve_output_path(entry, output_dir);

        if output_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(COMPANION_EXTENSION))
        {
            return Err(Html2DocError::config(format!(
                "output {} for {} would collide with its companion record; choose a non-.{COMPANION_EXTENSION} name",
                output_path.display(),
                entry.input.display()
            )));
        }

        targets
            .entry(output_path.clone())
            .or_default()
            .push(&entry.input);
        records
            .entry(companion_path_for(&output_path))
            .or_default()
            .push((&entry.input, output_path.clone()));

        documents.push(DocumentMetadata {
            input_path: entry.input.clone(),
            output_path,
            title: entry.title.clone(),
            context: entry.context.clone(),
        });
    }

    let mut problems = Vec::new();

    let outputs = collisions(
        targets
            .iter()
            .filter(|(_, inputs)| inputs.len() > 1)
            .map(|(output, inputs)| (output, inputs.clone())),
    );
    if !outputs.is_empty() {
        problems.push(format!("duplicate output paths: {outputs}"));
    }

    // Identical outputs are already reported above; only distinct outputs
    // sharing one record are new.
    let shared_records = collisions(
        records
            .iter()
            .filter(|(_, owners)| {
                owners
                    .iter()
                    .any(|(_, output)| *output != owners[0].1)
            })
            .map(|(record, owners)| (record, owners.iter().map(|(input, _)| *input).collect())),
    );
    if !shared_records.is_empty() {
        problems.push(format!("duplicate companion records: {shared_records}"));
    }

    if !problems.is_empty() {
        return Err(Html2DocError::config(problems.join("; ")));
    }

    Ok(documents)
}

/// `path <- input, input` per group, groups separated by `; `.
fn collisions<'a>(groups: impl Iterator<Item = (&'a PathBuf, Vec<&'a Path>)>) -> String {
    groups
        .map(|(path, inputs)| {
            let sources = inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} <- {sources}", path.display())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Explicit `output` (relative to the output dir), else `<stem>.md`.
fn resolve_output_path(entry: &FileEntry, output_dir: &Path) -> PathBuf {
    let raw = match &entry.output {
        Some(explicit) => resolve_path(explicit, output_dir),
        None => {
            let stem = entry
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            output_dir.join(format!("{stem}.{DEFAULT_OUTPUT_EXTENSION}"))
        }
    };
    normalize_lexically(&raw)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_config_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Html2DocError::config(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    std::fs::read_to_string(path).map_err(|e| Html2DocError::io(path, e))
}

fn parent_dir(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute
        .parent()
        .map(normalize_lexically)
        .unwrap_or_default()
}

fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base_dir.join(path))
    }
}

/// Drop `.` components and fold `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(input: &str) -> FileEntry {
        FileEntry {
            input: input.into(),
            title: None,
            context: None,
            output: None,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    #[test]
    fn defaults_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "job.yaml", "files:\n  - input: manual.html\n");

        let config = load_job_config(&path, false).expect("load");
        assert_eq!(config.model.name, "gpt-4.1-mini");
        assert!((config.model.temperature - 0.1).abs() < f32::EPSILON);
        assert!(config.model.top_p.is_none());
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert!(config.pipeline.outline);
        assert!(config.pipeline.validate);
        assert!(!config.pipeline.review);
        assert_eq!(config.files.len(), 1);
        assert!(config.files[0].input.is_absolute());
        assert!(config.files[0].input.ends_with("manual.html"));
        assert!(config.output_dir().ends_with("output"));
    }

    #[test]
    fn full_config_parses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let yaml = r#"
model:
  name: gpt-4o
  temperature: 0.3
  top_p: 0.9
  max_output_tokens: 2000
provider:
  base_url: http://localhost:8080/v1
  api_key_env: LOCAL_KEY
pipeline:
  outline: false
  review: true
output:
  dir: ../rendered
files:
  - input: docs/a.html
    title: Alpha
    context: Support desk
    output: alpha-guide.md
"#;
        let path = write(dir.path(), "job.yaml", yaml);

        let config = load_job_config(&path, false).expect("load");
        assert_eq!(config.model.name, "gpt-4o");
        assert_eq!(config.model.max_output_tokens, Some(2000));
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert!(!config.pipeline.outline);
        assert!(config.pipeline.validate);
        assert!(config.pipeline.review);
        assert_eq!(config.files[0].title.as_deref(), Some("Alpha"));
        assert_eq!(config.output_dir(), normalize_lexically(&dir.path().join("../rendered")));
    }

    #[test]
    fn empty_files_rejected_unless_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "job.yaml", "model:\n  name: gpt-4o\n");

        let err = load_job_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("at least one entry"));
        assert!(load_job_config(&path, true).is_ok());
    }

    #[test]
    fn missing_input_field_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "job.yaml", "files:\n  - title: No input\n");

        let err = load_job_config(&path, false).unwrap_err();
        assert!(matches!(err, Html2DocError::Config { .. }));
        assert!(err.to_string().contains("input"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let err = load_job_config(Path::new("/nonexistent/html2doc/job.yaml"), false).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn input_list_accepts_paths_and_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "inputs.yaml",
            "- a.html\n- input: b.html\n  title: Bee\n",
        );

        let files = load_input_list(&path).expect("load list");
        assert_eq!(files.len(), 2);
        assert!(files[0].input.ends_with("a.html"));
        assert!(files[0].input.is_absolute());
        assert_eq!(files[1].title.as_deref(), Some("Bee"));
    }

    #[test]
    fn input_list_accepts_files_mapping() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "inputs.yaml", "files:\n  - a.html\n");

        let files = load_input_list(&path).expect("load list");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn input_list_rejects_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "inputs.yaml", "[]\n");

        assert!(load_input_list(&path).is_err());
    }

    #[test]
    fn unique_targets_resolve() {
        let out = Path::new("/work/out");
        let docs =
            resolve_documents(&[entry("/work/alpha/first.html"), entry("/work/beta/second.html")], out)
                .expect("resolve");
        assert_eq!(docs[0].output_path, PathBuf::from("/work/out/first.md"));
        assert_eq!(docs[1].output_path, PathBuf::from("/work/out/second.md"));
        assert_eq!(docs[1].companion_path(), PathBuf::from("/work/out/second.json"));
    }

    #[test]
    fn duplicate_stems_are_rejected_with_both_sources() {
        let out = Path::new("/work/out");
        let err = resolve_documents(&[entry("/work/x/manual.html"), entry("/work/y/manual.html")], out)
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Html2DocError::Config { .. }));
        assert!(msg.contains("manual.md"));
        assert!(msg.contains("/work/x/manual.html"));
        assert!(msg.contains("/work/y/manual.html"));
    }

    #[test]
    fn explicit_outputs_disambiguate_stems() {
        let out = Path::new("/work/out");
        let mut a = entry("/work/x/manual.html");
        a.output = Some("alpha.md".into());
        let mut b = entry("/work/y/manual.html");
        b.output = Some("beta.md".into());

        let docs = resolve_documents(&[a, b], out).expect("resolve");
        assert_eq!(docs[0].output_path, PathBuf::from("/work/out/alpha.md"));
        assert_eq!(docs[1].output_path, PathBuf::from("/work/out/beta.md"));
    }

    #[test]
    fn explicit_output_conflicts_are_rejected() {
        let out = Path::new("/work/out");
        let mut a = entry("/work/x/one.html");
        a.output = Some("duplicate.md".into());
        let mut b = entry("/work/y/two.html");
        b.output = Some("./duplicate.md".into());

        assert!(resolve_documents(&[a, b], out).is_err());
    }

    #[test]
    fn outputs_sharing_a_companion_record_are_rejected() {
        let out = Path::new("/work/out");
        let mut a = entry("/work/x/guide.html");
        a.output = Some("guide.md".into());
        let mut b = entry("/work/y/other.html");
        b.output = Some("guide.txt".into());

        let err = resolve_documents(&[a, b], out).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Html2DocError::Config { .. }));
        assert!(msg.contains("duplicate companion records"));
        assert!(msg.contains("guide.json"));
        assert!(msg.contains("/work/x/guide.html"));
        assert!(msg.contains("/work/y/other.html"));
        assert!(!msg.contains("duplicate output paths"));
    }

    #[test]
    fn identical_outputs_are_reported_once() {
        let out = Path::new("/work/out");
        let err = resolve_documents(&[entry("/work/x/manual.html"), entry("/work/y/manual.html")], out)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate output paths"));
        assert!(!msg.contains("duplicate companion records"));
    }

    #[test]
    fn json_output_is_rejected() {
        let mut a = entry("/work/x/one.html");
        a.output = Some("one.json".into());

        let err = resolve_documents(&[a], Path::new("/work/out")).unwrap_err();
        assert!(err.to_string().contains("companion record"));
    }

    #[test]
    fn normalize_folds_dot_components() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c.md")),
            PathBuf::from("/a/c.md")
        );
    }
}
