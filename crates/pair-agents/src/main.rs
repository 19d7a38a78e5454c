use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pair_agents::telemetry::{self, RunMetrics};
use pair_agents::{AgentFactory, AgentsConfig, PairTable};
use pair_coordination::{Coordinator, ExecutionMode, RunController, RunState, RunStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Adversarial proposer/reviewer pairs under one coordinator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML pair table (built-in catalogue when absent)
    #[arg(long, global = true)]
    pairs: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify, run every planned pair, resolve conflicts, print the final state
    Run(RunArgs),
    /// Classify only and print the plan
    Plan(PlanArgs),
    /// Print the configured pair table
    Pairs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Task description
    #[arg(long)]
    task: String,

    /// Task identifier (random when absent)
    #[arg(long)]
    task_id: Option<String>,

    /// Pairs executed at once (1 = sequential)
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the terminal run state here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Append run metrics as one JSON line to this file
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Use scripted roles instead of the LLM endpoint
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Score every scripted reviewer gives in --dry-run mode
    #[arg(long, default_value_t = 8.5)]
    dry_run_score: f64,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Task description
    #[arg(long)]
    task: String,

    /// Use the rule classifier instead of the LLM endpoint
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn load_table(path: Option<&PathBuf>) -> Result<PairTable> {
    match path {
        Some(path) => PairTable::load(path),
        None => Ok(PairTable::default()),
    }
}

fn new_task_id() -> String {
    format!("task-{}", uuid::Uuid::new_v4().simple())
}

/// Cancel `cancel` on Ctrl-C or when the timeout elapses.
fn spawn_cancellation(cancel: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::signal::ctrl_c() => warn!("interrupt received; cancelling run"),
            _ = deadline => warn!("timeout reached; cancelling run"),
        }
        cancel.cancel();
    });
}

async fn run(table: PairTable, args: RunArgs) -> Result<ExitCode> {
    let factory = AgentFactory::new(table);
    let (registry, coordinator) = if args.dry_run {
        factory.scripted_agents(args.dry_run_score)?
    } else {
        let config = AgentsConfig::default();
        info!(
            url = %config.llm_url,
            model = %config.model,
            coordinator = %config.coordinator_model,
            "using LLM endpoint"
        );
        factory.llm_agents(&config)?
    };

    let controller = RunController::new(Arc::new(registry), coordinator)
        .with_mode(ExecutionMode::with_parallelism(args.concurrency));
    let cancel = CancellationToken::new();
    spawn_cancellation(cancel.clone(), args.timeout_secs.map(Duration::from_secs));

    let state = RunState::new(args.task_id.unwrap_or_else(new_task_id), args.task);
    let state = controller
        .run(state, &cancel)
        .await
        .context("Run aborted")?;
    cancel.cancel();

    let metrics = RunMetrics::from_state(&state);
    metrics.log();
    if let Some(path) = &args.metrics {
        metrics.append_jsonl(path)?;
    }

    let json = serde_json::to_string_pretty(&state).context("Failed to serialize run state")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "run state written");
        }
        None => println!("{}", json),
    }

    let approved = state.final_verdict().is_some_and(|v| v.approved);
    Ok(match (state.status(), approved) {
        (RunStatus::Completed, true) => ExitCode::SUCCESS,
        (RunStatus::Completed, false) => ExitCode::from(2),
        _ => ExitCode::from(3),
    })
}

async fn plan(table: PairTable, args: PlanArgs) -> Result<ExitCode> {
    let factory = AgentFactory::new(table);
    let coordinator: Arc<dyn Coordinator> = if args.dry_run {
        Arc::new(factory.rule_coordinator())
    } else {
        factory.llm_agents(&AgentsConfig::default())?.1
    };
    let state = RunState::new(new_task_id(), args.task);
    let plan = coordinator.classify(&state).await.context("Classification failed")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let table = load_table(cli.pairs.as_ref())?;

    match cli.command {
        Command::Run(args) => run(table, args).await,
        Command::Plan(args) => plan(table, args).await,
        Command::Pairs => {
            print!("{}", toml::to_string_pretty(&table).context("Failed to render pair table")?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
