//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use html2doc_core::{BatchProgress, DocumentResult, PipelineOptions, Stage, run_batch};
use html2doc_generation::OpenAiClient;
use html2doc_shared::{
    DocumentMetadata, JobConfig, companion_path_for, load_input_list, load_job_config,
    resolve_documents,
};

use crate::dotenv;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// html2doc: turn HTML manuals into validated Markdown knowledge documents.
#[derive(Parser)]
#[command(
    name = "html2doc",
    version,
    about = "Convert HTML manuals into grounded Markdown knowledge documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert every configured document.
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Output directory (overrides `output.dir`).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// `.env` file to read the API key from (default: nearest `.env`).
        #[arg(long)]
        env_file: Option<PathBuf>,
    },

    /// Load and resolve the configuration without calling the provider.
    Check {
        #[command(flatten)]
        job: JobArgs,
    },
}

/// Where the job comes from.
#[derive(Args)]
pub(crate) struct JobArgs {
    /// YAML job configuration.
    #[arg(short, long, env = "HTML2DOC_CONFIG")]
    pub config: PathBuf,

    /// YAML list of extra input files, appended after the config's `files`.
    #[arg(long)]
    pub inputs: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "html2doc=info",
        1 => "html2doc=debug",
        _ => "html2doc=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run {
            job,
            output_dir,
            env_file,
        } => cmd_run(&job, output_dir.as_deref(), env_file.as_deref()).await,
        Command::Check { job } => cmd_check(&job),
    }
}

/// Load the job config, append the input list, and apply the output override.
fn load_job(args: &JobArgs, output_dir: Option<&Path>) -> Result<JobConfig> {
    let mut job = load_job_config(&args.config, args.inputs.is_some())?;

    if let Some(list) = &args.inputs {
        job.files.extend(load_input_list(list)?);
    }

    if let Some(dir) = output_dir {
        let dir = std::path::absolute(dir)
            .wrap_err_with(|| format!("cannot resolve output directory {}", dir.display()))?;
        job.output.dir = Some(dir);
    }

    Ok(job)
}

async fn cmd_run(args: &JobArgs, output_dir: Option<&Path>, env_file: Option<&Path>) -> Result<ExitCode> {
    let job = load_job(args, output_dir)?;

    let key_name = &job.provider.api_key_env;
    let api_key = dotenv::lookup(key_name, env_file)?.ok_or_else(|| {
        eyre!("{key_name} is not set; export it or add it to a .env file")
    })?;
    let client = OpenAiClient::new(&job.provider, api_key)?;

    info!(
        config = %args.config.display(),
        files = job.files.len(),
        model = %job.model.name,
        "starting conversion"
    );

    let reporter = CliProgress::new();
    let results = run_batch(&client, &job, &reporter).await?;
    reporter.finish();

    let failed = print_results(&results);
    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_check(args: &JobArgs) -> Result<ExitCode> {
    let job = load_job(args, None)?;
    let output_dir = job.output_dir();
    let documents = resolve_documents(&job.files, &output_dir)?;

    let stages: Vec<&str> = PipelineOptions::from(&job.pipeline)
        .stages()
        .iter()
        .map(Stage::as_str)
        .collect();

    println!("  Model:      {}", job.model.name);
    println!("  Endpoint:   {}", job.provider.base_url);
    println!("  API key:    ${}", job.provider.api_key_env);
    println!("  Stages:     {}", stages.join(" -> "));
    println!("  Output dir: {}", output_dir.display());
    println!();
    for doc in &documents {
        print_job(doc);
    }
    println!();
    println!("{} document(s) resolved", documents.len());

    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_job(doc: &DocumentMetadata) {
    let mut line = format!(
        "{} -> {} (record: {})",
        doc.input_path.display(),
        doc.output_path.display(),
        companion_path_for(&doc.output_path).display()
    );
    if let Some(title) = &doc.title {
        line.push_str(&format!(" [title: {title}]"));
    }
    println!("{line}");
}

/// Print one line per document plus a summary. Returns the failure count.
fn print_results(results: &[DocumentResult]) -> usize {
    for result in results {
        println!("{}", result_line(result));
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    println!("succeeded {succeeded} / failed {failed}");
    failed
}

fn result_line(result: &DocumentResult) -> String {
    let input = result.metadata.input_path.display();
    match (&result.output_path, &result.record_path) {
        (Some(output), Some(record)) if result.success => format!(
            "[OK] {input} -> {} (record: {})",
            output.display(),
            record.display()
        ),
        (Some(output), None) if result.success => format!("[OK] {input} -> {}", output.display()),
        _ => format!(
            "[NG] {input}: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl BatchProgress for CliProgress {
    fn document_started(&self, metadata: &DocumentMetadata, current: usize, total: usize) {
        self.spinner
            .set_prefix(format!("[{current}/{total}] {}", metadata.stem()));
        self.spinner.set_message("");
    }

    fn stage_entered(&self, stage: Stage) {
        self.spinner.set_message(stage.to_string());
    }

    fn document_finished(&self, result: &DocumentResult) {
        let status = if result.success { "done" } else { "failed" };
        self.spinner.println(format!(
            "{status}: {} ({:.1}s, {} tokens)",
            result.metadata.input_path.display(),
            result.elapsed.as_secs_f64(),
            result.usage.total()
        ));
    }
}
