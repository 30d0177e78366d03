use std::path::PathBuf;
use std::sync::Arc;

use agentteams_agents::build_hierarchy;
use agentteams_core::llm::{ChatResponse, OpenAiChatModel, ScriptedModel};
use agentteams_core::{
    AgentTask, Config, ConfigLoader, TaskEvent, TaskService, TelemetryOptions, TraceCollector,
    init_metrics_from_env, init_telemetry, persist_trace,
};
use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::runtime::Runtime;
use tokio_stream::StreamExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "agentteams-cli",
    version,
    about = "Run hierarchical agent teams from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one task and print its hand-offs as NDJSON.
    Run(RunArgs),
    /// Print the team hierarchy as a Mermaid flowchart.
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Task for the top-level supervisor.
    task: String,

    /// Supervisor decisions allowed before the task fails (defaults to `teams.max_depth`).
    #[arg(long)]
    max_depth: Option<usize>,

    /// Configuration file (defaults to AGENTTEAMS_CONFIG, then config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a summary of the hand-offs after the run.
    #[arg(long, value_enum)]
    explain: Option<ExplainFormat>,

    /// Directory to write the hand-off trace to as `{task_id}.json`.
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// Configuration file (defaults to AGENTTEAMS_CONFIG, then config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ExplainFormat {
    Markdown,
    Mermaid,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await,
            Command::Graph(args) => graph_command(args),
        }
    })
}

fn load(path: Option<PathBuf>) -> Result<Config> {
    let config = ConfigLoader::load(path)?;
    init_telemetry(TelemetryOptions {
        to_stderr: true,
        ..TelemetryOptions::default().with_level(config.logging.level.clone())
    })?;
    init_metrics_from_env("agentteams-cli");
    Ok(config)
}

async fn run_command(args: RunArgs) -> Result<()> {
    let config = load(args.config)?;
    let model = Arc::new(OpenAiChatModel::from_config(&config)?);
    let graph = build_hierarchy(model, &config)?;
    let service =
        TaskService::new(Arc::new(graph)).with_default_max_depth(config.teams.max_depth);

    let mut task = AgentTask::new(args.task).streaming(true);
    if let Some(max_depth) = args.max_depth {
        task = task.with_max_depth(max_depth);
    }
    let mut stream = service.submit(task)?;
    info!(task_id = %stream.task_id, "task started");

    let mut collector = TraceCollector::new();
    let mut failure = None;
    while let Some(event) = stream.events.next().await {
        print!("{}", event.to_ndjson()?);
        match event {
            TaskEvent::Handoff(record) => collector.record(record),
            TaskEvent::Failed { error } => failure = Some(error),
        }
    }

    if let Some(dir) = args.trace_dir {
        let path = persist_trace(&dir, &stream.task_id, collector.events())?;
        info!(path = %path.display(), "trace written");
    }

    if let Some(format) = args.explain {
        let summary = collector.summary();
        let rendered = match format {
            ExplainFormat::Markdown => summary.render_markdown(),
            ExplainFormat::Mermaid => summary.render_mermaid(),
        };
        println!();
        println!("{rendered}");
    }

    match failure {
        Some(error) => Err(anyhow!("task failed ({}): {}", error.kind.as_str(), error.message)),
        None => Ok(()),
    }
}

fn graph_command(args: GraphArgs) -> Result<()> {
    let config = load(args.config)?;
    println!("{}", render_hierarchy(&config)?);
    Ok(())
}

/// Mermaid flowchart of the hierarchy; no model is called, so no API key is needed.
fn render_hierarchy(config: &Config) -> Result<String> {
    let graph = build_hierarchy(Arc::new(ScriptedModel::new(Vec::<ChatResponse>::new())), config)?;
    Ok(graph.render_mermaid())
}
