//! Task execution engine.
//!
//! The `TaskExecutor` handles running individual tasks with:
//! - Concurrency limiting via semaphore
//! - A per-attempt timeout
//! - Retries with exponential backoff
//! - Proper error handling and result reporting

use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, error, info, warn};

use super::registry::ResultWriter;
use super::state::RunState;
use crate::core::result::{TaskFailure, TaskResult};
use crate::core::retry::Backoff;
use crate::core::task::{AttemptContext, Task};
use crate::core::types::RunId;
use crate::events::{Event, EventBus};

/// Executor for running tasks with concurrency control and retry logic.
pub struct TaskExecutor {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Delay schedule between attempts.
    backoff: Backoff,
    /// Run the executed tasks belong to.
    run_id: RunId,
    /// Optional lifecycle event sink.
    event_bus: Option<Arc<EventBus>>,
}

impl TaskExecutor {
    /// Create a new executor with the given concurrency limit and backoff.
    pub fn new(max_concurrency: usize, backoff: Backoff) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            backoff,
            run_id: RunId::new(),
            event_bus: None,
        }
    }

    /// Tag emitted events with the given run.
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Emit lifecycle events to the given bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Get the number of available permits (slots for concurrent execution).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Execute a task that cleared its dependency check.
    ///
    /// This method will:
    /// 1. Acquire a concurrency permit
    /// 2. Skip the task if the run was aborted meanwhile
    /// 3. Run attempts until one succeeds or the attempt budget is spent
    /// 4. Publish the terminal result, then release the permit
    pub async fn execute(
        &self,
        task: &Task,
        mut writer: ResultWriter,
        state: &RunState,
    ) -> TaskResult {
        let task_id = task.id().clone();

        let permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let failure = TaskFailure::execution("concurrency limiter closed");
                error!(task = %task_id, "concurrency limiter closed");
                self.emit(Event::task_failed(self.run_id, task_id, 0, failure.clone()))
                    .await;
                return writer.fail(failure, 0, Duration::ZERO);
            }
        };

        if state.is_aborted() {
            drop(permit);
            return self.skip(task, writer, TaskFailure::aborted()).await;
        }

        writer.start();
        debug!(
            task = %task_id,
            work = task.work().description().unwrap_or("-"),
            retries = task.retries(),
            timeout = ?task.timeout(),
            "task started"
        );
        self.emit(Event::task_started(self.run_id, task_id.clone()))
            .await;

        let max_attempts = task.retries();
        let mut last_failure = TaskFailure::execution("no attempts made");
        let mut last_duration = Duration::ZERO;

        for attempt in 1..=max_attempts {
            writer.record_attempt(attempt);
            let attempt_start = Instant::now();
            let outcome = self.run_attempt(task, attempt).await;
            let elapsed = attempt_start.elapsed();

            match outcome {
                Ok(output) => {
                    let result = writer.succeed(output, attempt, elapsed);
                    drop(permit);
                    info!(task = %task_id, attempts = attempt, duration = ?elapsed, "task succeeded");
                    self.emit(Event::task_succeeded(self.run_id, task_id, attempt, elapsed))
                        .await;
                    return result;
                }
                Err(failure) => {
                    if attempt < max_attempts {
                        let delay = self.backoff.delay(attempt - 1);
                        warn!(
                            task = %task_id,
                            attempt,
                            max_attempts,
                            delay = ?delay,
                            error = %failure,
                            "attempt failed, retrying"
                        );
                        self.emit(Event::task_retrying(
                            self.run_id,
                            task_id.clone(),
                            attempt,
                            max_attempts,
                            delay,
                            failure.clone(),
                        ))
                        .await;
                        sleep(delay).await;
                    }
                    last_failure = failure;
                    last_duration = elapsed;
                }
            }
        }

        if state.record_failure() {
            warn!(task = %task_id, "task failed, aborting remaining work");
        }
        let result = writer.fail(last_failure.clone(), max_attempts, last_duration);
        drop(permit);
        error!(task = %task_id, attempts = max_attempts, error = %last_failure, "task failed");
        self.emit(Event::task_failed(
            self.run_id,
            task_id,
            max_attempts,
            last_failure,
        ))
        .await;
        result
    }

    /// Finish a task as Skipped without acquiring a permit.
    pub async fn skip(&self, task: &Task, writer: ResultWriter, reason: TaskFailure) -> TaskResult {
        let result = writer.skip(reason.clone());
        info!(task = %task.id(), reason = %reason, "task skipped");
        self.emit(Event::task_skipped(self.run_id, task.id().clone(), reason))
            .await;
        result
    }

    /// Run a single attempt bounded by the task's timeout.
    ///
    /// The attempt runs on its own tokio task so a panic inside the work item
    /// is contained, and is aborted when the timeout fires.
    async fn run_attempt(&self, task: &Task, attempt: u32) -> Result<Value, TaskFailure> {
        let limit = task.timeout();
        let ctx = AttemptContext::new(task.id().clone(), attempt, task.retries(), limit);
        let work = task.work();
        let mut handle = tokio::spawn(async move { work.run(ctx).await }.in_current_span());

        match timeout(limit, &mut handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(TaskFailure::execution(err.to_string())),
            Ok(Err(join_err)) if join_err.is_panic() => Err(TaskFailure::execution(format!(
                "work item panicked: {}",
                panic_message(join_err.into_panic())
            ))),
            Ok(Err(join_err)) => Err(TaskFailure::execution(join_err.to_string())),
            Err(_) => {
                handle.abort();
                Err(TaskFailure::timeout(limit))
            }
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(event).await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
