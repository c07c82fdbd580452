//! CLI command definitions for docforge.
//!
//! `docforge local` documents one checkout; `docforge batch` runs a JSON list
//! of tasks, grouping tasks that share a checkout.

use crate::llm::{LiteLlmClient, LlmProvider, OpenRouterProvider, DEFAULT_MODEL};
use crate::scaffold::{OrchestratorConfig, ProxyConfig, WriterConfig};
use crate::task::{summarize_reports, LocalTask, TaskRunner, TaskSpec};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default output directory for run artifacts.
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// File written at the output root after a batch.
const BATCH_SUMMARY_FILE: &str = "batch_summary.json";

/// Repository documentation generator driven by LLM agents.
#[derive(Parser)]
#[command(name = "docforge")]
#[command(about = "Generate in-code documentation for a repository with LLM agents")]
#[command(version)]
#[command(
    long_about = "docforge lets an agent explore a repository through search tools, then asks a writer to document the code as edits.\n\nEach write attempt is applied to the checkout and classified; the diff of the first finished attempt is kept.\n\nExample usage:\n  docforge local --project ./my-repo --output-dir ./output"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Document one local project.
    Local(LocalArgs),

    /// Run a JSON list of tasks.
    Batch(BatchArgs),
}

/// Options shared by every run.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory receiving one sub-directory per task.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Model for the agent, the proxy and the writer.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Sampling temperature for the agent and the writer.
    #[arg(long, default_value = "0.2")]
    pub temperature: f64,

    /// Context-gathering rounds before writing is forced.
    #[arg(long, default_value = "15")]
    pub conv_round_limit: usize,

    /// Documentation write attempts per task.
    #[arg(long, default_value = "3")]
    pub write_retries: usize,

    /// Proxy tries per round when extracting tool calls.
    #[arg(long, default_value = "5")]
    pub proxy_retries: usize,

    /// Allow one tool call per round, restricted by the capability adjacency table.
    #[arg(long)]
    pub state_machine: bool,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY; otherwise LITELLM_* is used).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,
}

impl RunArgs {
    fn orchestrator_config(&self) -> OrchestratorConfig {
        let model = self.model.clone().unwrap_or_default();
        OrchestratorConfig::new()
            .with_round_limit(self.conv_round_limit)
            .with_state_machine(self.state_machine)
            .with_proxy(
                ProxyConfig::new()
                    .with_retries(self.proxy_retries)
                    .with_model(model.clone()),
            )
            .with_writer(
                WriterConfig::new()
                    .with_retries(self.write_retries)
                    .with_model(model.clone()),
            )
            .with_model(model)
            .with_temperature(self.temperature)
    }
}

/// Arguments for `docforge local`.
#[derive(Parser, Debug)]
pub struct LocalArgs {
    /// Path of the project checkout.
    #[arg(short = 'p', long)]
    pub project: PathBuf,

    /// Task identifier; defaults to the project directory name.
    #[arg(long)]
    pub task_id: Option<String>,

    /// README to start from, relative to the project unless absolute.
    #[arg(long)]
    pub readme: Option<PathBuf>,

    /// Commit the checkout is reset to between attempts.
    #[arg(long)]
    pub base_commit: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for `docforge batch`.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSON array of tasks: {"task_id", "repo_path", "readme"?, "base_commit"?, "group"?}.
    #[arg(short = 't', long)]
    pub tasks: PathBuf,

    /// Task groups run concurrently.
    #[arg(short = 'j', long, default_value = "1")]
    pub num_workers: usize,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Local(args) => run_local_command(args).await,
        Commands::Batch(args) => run_batch_command(args).await,
    }
}

async fn run_local_command(args: LocalArgs) -> anyhow::Result<()> {
    let project = args
        .project
        .canonicalize()
        .with_context(|| format!("Project path {} not found", args.project.display()))?;
    let task_id = args.task_id.clone().unwrap_or_else(|| {
        project
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    });

    let task = LocalTask::new(task_id, project, args.readme.clone(), args.base_commit.clone())?;
    let llm = build_llm_client(args.run.api_key.clone(), args.run.model.clone())?;
    std::fs::create_dir_all(&args.run.output_dir)?;

    let runner = TaskRunner::new(llm, args.run.orchestrator_config(), &args.run.output_dir);
    let report = runner.run_task(&task).await;

    if let Some(error) = &report.error {
        anyhow::bail!("Task {} failed: {}", report.task_id, error);
    }
    info!(
        task_id = %report.task_id,
        status = report.status_name(),
        "Task complete"
    );
    Ok(())
}

async fn run_batch_command(args: BatchArgs) -> anyhow::Result<()> {
    let specs = TaskSpec::load_list(&args.tasks)
        .with_context(|| format!("Failed to load tasks from {}", args.tasks.display()))?;
    if specs.is_empty() {
        anyhow::bail!("No tasks in {}", args.tasks.display());
    }

    let llm = build_llm_client(args.run.api_key.clone(), args.run.model.clone())?;
    std::fs::create_dir_all(&args.run.output_dir)?;

    let runner = TaskRunner::new(llm, args.run.orchestrator_config(), &args.run.output_dir);
    let reports = runner.run_batch(specs, args.num_workers).await;

    let summary = summarize_reports(&reports);
    let summary_path = args.run.output_dir.join(BATCH_SUMMARY_FILE);
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

    let finished = reports.iter().filter(|r| r.is_finished()).count();
    info!(
        finished,
        total = reports.len(),
        summary = %summary_path.display(),
        "Batch complete"
    );
    Ok(())
}

fn build_llm_client(
    api_key: Option<String>,
    model: Option<String>,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let resolved_api_key = api_key.or_else(|| std::env::var("OPENROUTER_API_KEY").ok());

    if let Some(key) = resolved_api_key {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let provider = OpenRouterProvider::with_model(key, model);
        info!(
            model = %provider.default_model(),
            api_key = %provider.api_key_masked(),
            "Using OpenRouter with specified API key"
        );
        Ok(Arc::new(provider))
    } else {
        let client = LiteLlmClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Please provide --api-key or set OPENROUTER_API_KEY/LITELLM_API_BASE env vars.",
                e
            )
        })?;
        info!(
            api_base = %client.api_base(),
            model = %client.default_model(),
            authenticated = client.has_api_key(),
            "Using LiteLLM client from environment"
        );
        Ok(Arc::new(client))
    }
}
