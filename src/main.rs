//! cnd - run a batch of dependent tasks from a YAML file.
//!
//! Usage:
//!   cnd run <FILE>        Run every task in the batch and print the report
//!   cnd validate <FILE>   Validate the batch without running it

use clap::{Parser, Subcommand};
use conductor::{
    DagError, DependencyGraph, DependencyMode, Event, EventBus, EventHandler, FailurePolicy,
    Orchestrator, TaskId, YamlLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// cnd - a lightweight in-process task orchestrator
#[derive(Parser)]
#[command(name = "cnd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tasks of a batch file
    Run {
        /// Path to the batch YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Maximum concurrently running tasks (overrides the file)
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,

        /// Failure policy: continue or abort (overrides the file)
        #[arg(long, value_name = "POLICY")]
        on_failure: Option<FailurePolicy>,

        /// Reject dependencies on tasks that are not in the batch
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a batch file without running it
    Validate {
        /// Path to the batch YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Logs task lifecycle events as they happen.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::TaskStarted { task_id, .. } => {
                info!("  Task '{}' started", task_id);
            }
            Event::TaskRetrying {
                task_id,
                attempt,
                max_attempts,
                delay,
                error,
                ..
            } => {
                warn!(
                    "  Task '{}' attempt {}/{} failed, retrying in {:?}: {}",
                    task_id, attempt, max_attempts, delay, error.message
                );
            }
            Event::TaskSucceeded {
                task_id,
                attempts,
                duration,
                ..
            } => {
                info!(
                    "  Task '{}' succeeded in {:?} ({} attempt(s))",
                    task_id, duration, attempts
                );
            }
            Event::TaskFailed {
                task_id,
                attempts,
                error,
                ..
            } => {
                error!(
                    "  Task '{}' failed after {} attempt(s): {}",
                    task_id, attempts, error
                );
            }
            Event::TaskSkipped {
                task_id, reason, ..
            } => {
                warn!("  Task '{}' skipped: {}", task_id, reason.message);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            max_concurrent,
            on_failure,
            strict,
            json,
        } => {
            let succeeded = run_batch(file, max_concurrent, on_failure, strict, json).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            validate_batch(file)?;
        }
    }

    Ok(())
}

/// Run a batch file. Returns whether every task succeeded.
async fn run_batch(
    file: PathBuf,
    max_concurrent: Option<usize>,
    on_failure: Option<FailurePolicy>,
    strict: bool,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    info!("Loading batch from: {}", file.display());

    let batch = YamlLoader::load_batch(&file)?;
    let tasks = batch.build_tasks()?;

    let mut config = batch.config;
    if let Some(max) = max_concurrent {
        config = config.with_max_concurrent(max);
    }
    if let Some(policy) = on_failure {
        config = config.with_failure_policy(policy);
    }
    if strict {
        config = config.with_dependency_mode(DependencyMode::Strict);
    }

    info!(
        "Running {} task(s) (max concurrent: {}, on failure: {})",
        tasks.len(),
        config.max_concurrent,
        config.on_failure
    );

    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut orchestrator = Orchestrator::new(config).with_event_bus(Arc::new(event_bus));
    orchestrator.register_many(tasks)?;

    let report = orchestrator.run().await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }

    Ok(report.is_success() && !report.aborted())
}

/// Validate a batch file and print its dependency order.
fn validate_batch(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating batch: {}", file.display());

    let batch = match YamlLoader::load_batch(&file) {
        Ok(batch) => batch,
        Err(e) => {
            error!("Validation failed: {}", e);
            return Err(e.into());
        }
    };

    let graph = YamlLoader::dependency_graph(&batch)?;
    for (task, dependency) in graph.unknown_dependencies() {
        warn!(
            "Task '{}' depends on unknown task '{}' (treated as satisfied)",
            task, dependency
        );
    }

    println!("{}: {} task(s) OK", file.display(), batch.tasks.len());
    println!("Execution order:");
    for line in execution_plan(&graph)? {
        println!("  - {}", line);
    }

    Ok(())
}

/// One line per task in execution order, with its upstream and downstream
/// neighbours.
fn execution_plan(graph: &DependencyGraph) -> Result<Vec<String>, DagError> {
    let join = |ids: &[TaskId]| {
        ids.iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut lines = Vec::new();
    for task_id in graph.topological_sort()? {
        let mut line = task_id.to_string();
        let deps = graph.get_dependencies(&task_id).unwrap_or(&[]);
        if !deps.is_empty() {
            line.push_str(&format!(" (depends on: {})", join(deps)));
        }
        let downstream = graph.get_downstream(&task_id);
        if !downstream.is_empty() {
            line.push_str(&format!(" (required by: {})", join(&downstream)));
        }
        lines.push(line);
    }
    Ok(lines)
}
