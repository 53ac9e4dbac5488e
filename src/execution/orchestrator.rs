//! Run coordination.
//!
//! The `Orchestrator` owns the registry and drives one run at a time: every
//! task gets its own tokio task that waits for its dependencies and then
//! either executes or records a skip. Independent tasks run in parallel up
//! to the configured concurrency bound.

use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span};

use super::executor::TaskExecutor;
use super::registry::{RegistryError, TaskRegistry};
use super::state::RunState;
use super::waiter::{Clearance, wait_for_dependencies};
use crate::config::{ConfigError, DependencyMode, OrchestratorConfig};
use crate::core::dag::DagError;
use crate::core::task::Task;
use crate::core::types::RunId;
use crate::events::{Event, EventBus};
use crate::report::RunReport;

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Run settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dependency declarations failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] DagError),

    /// A task could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Coordinates registered tasks through a run.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: TaskRegistry,
    event_bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// Create an orchestrator with the given settings.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            event_bus: None,
        }
    }

    /// Emit lifecycle events to the given bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Register a task.
    pub fn register(&mut self, task: Task) -> Result<(), OrchestratorError> {
        Ok(self.registry.register(task)?)
    }

    /// Register tasks in order, stopping at the first error.
    pub fn register_many<I>(&mut self, tasks: I) -> Result<(), OrchestratorError>
    where
        I: IntoIterator<Item = Task>,
    {
        Ok(self.registry.register_many(tasks)?)
    }

    /// Run every registered task to a terminal state.
    ///
    /// Tasks are launched in descending priority order, ties in registration
    /// order. Task failures never make this return an error; they are
    /// recorded in the report.
    pub async fn run(&mut self) -> Result<RunReport, OrchestratorError> {
        self.config.validate()?;
        if self.config.dependency_mode == DependencyMode::Strict {
            self.registry.graph().validate_references()?;
        }

        let run_id = RunId::new();
        let state = Arc::new(RunState::new(self.config.on_failure));
        let mut executor = TaskExecutor::new(self.config.max_concurrent, self.config.backoff)
            .with_run_id(run_id);
        if let Some(ref bus) = self.event_bus {
            executor = executor.with_event_bus(Arc::clone(bus));
        }
        let executor = Arc::new(executor);

        let mut launches = self.registry.prepare_run();
        let signals = self.registry.signal_table();
        launches.sort_by_key(|(task, _)| Reverse(task.priority()));

        let task_count = launches.len();
        let span = info_span!(
            "orchestration_run",
            run = %run_id,
            task_count = task_count,
            max_concurrent = self.config.max_concurrent,
        );

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(parent: &span, policy = %self.config.on_failure, "starting run");
        self.emit(Event::run_started(run_id, task_count)).await;

        let mut handles = Vec::with_capacity(task_count);
        for (task, writer) in launches {
            let executor = Arc::clone(&executor);
            let signals = Arc::clone(&signals);
            let state = Arc::clone(&state);
            let task_span = info_span!(parent: &span, "task", task = %task.id());

            handles.push(tokio::spawn(
                async move {
                    match wait_for_dependencies(&task, &signals, &state).await {
                        Clearance::Proceed => executor.execute(&task, writer, &state).await,
                        Clearance::Skip(reason) => executor.skip(&task, writer, reason).await,
                    }
                }
                .instrument(task_span),
            ));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!(parent: &span, error = %err, "task execution did not complete");
            }
        }

        let completed_at = Utc::now();
        let duration = clock.elapsed();
        let report = RunReport::new(
            run_id,
            self.registry.snapshots(),
            started_at,
            completed_at,
            duration,
            state.is_aborted(),
            self.config.max_concurrent,
        );

        let summary = report.summary();
        info!(
            parent: &span,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            aborted = summary.aborted,
            duration = ?duration,
            "run completed"
        );
        debug!(parent: &span, "{}", report);
        self.emit(Event::run_completed(
            run_id,
            report.is_success(),
            summary.aborted,
            duration,
        ))
        .await;

        Ok(report)
    }

    async fn emit(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event).await;
        }
    }
}
