//! Task registry and per-task result slots.
//!
//! Every registered task owns one result slot. A slot is a
//! [`tokio::sync::watch`] channel: the sending half is wrapped in a
//! [`ResultWriter`] and handed to the task's own execution path, while
//! everyone else observes it through a [`CompletionSignal`]. The signal is
//! considered fired once the published result is terminal, and the writer is
//! consumed by the terminal transition, so a terminal result can never change.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::dag::{DagError, DependencyGraph};
use crate::core::result::{TaskFailure, TaskResult, TaskStatus};
use crate::core::task::Task;
use crate::core::types::TaskId;

/// Errors raised when registering tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A task with this identifier is already registered.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// Registering the task would close a dependency cycle.
    #[error("registering task '{0}' would create a dependency cycle")]
    Cycle(TaskId),
}

/// Registered tasks, their dependency graph and their result slots.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<Task>>,
    index: HashMap<TaskId, usize>,
    graph: DependencyGraph,
    slots: Vec<watch::Receiver<TaskResult>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, seeding a Pending result.
    ///
    /// Rejected registrations leave the registry unchanged.
    pub fn register(&mut self, task: Task) -> Result<(), RegistryError> {
        let id = task.id().clone();
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateTask(id));
        }

        self.graph
            .add_task(id.clone(), task.dependencies())
            .map_err(|err| match err {
                DagError::DuplicateTask(id) => RegistryError::DuplicateTask(id),
                DagError::CycleDetected(_) | DagError::UnknownDependency { .. } => {
                    RegistryError::Cycle(id.clone())
                }
            })?;

        debug!(task = %id, dependencies = task.dependencies().len(), "registered task");
        self.index.insert(id.clone(), self.tasks.len());
        self.slots.push(pending_slot(id));
        self.tasks.push(Arc::new(task));
        Ok(())
    }

    /// Register tasks in order, stopping at the first error.
    pub fn register_many<I>(&mut self, tasks: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = Task>,
    {
        for task in tasks {
            self.register(task)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| self.tasks[i].as_ref())
    }

    /// Task identifiers in registration order.
    pub fn task_ids(&self) -> &[TaskId] {
        self.graph.task_ids()
    }

    /// Dependency graph of the registered tasks.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Current result of a task.
    pub fn snapshot(&self, id: &TaskId) -> Option<TaskResult> {
        self.index
            .get(id)
            .map(|&i| self.slots[i].borrow().clone())
    }

    /// Current results of every task, in registration order.
    pub fn snapshots(&self) -> Vec<TaskResult> {
        self.slots.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Completion signals of every task, keyed by identifier.
    pub fn signal_table(&self) -> Arc<HashMap<TaskId, CompletionSignal>> {
        let table = self
            .tasks
            .iter()
            .zip(&self.slots)
            .map(|(task, rx)| {
                (
                    task.id().clone(),
                    CompletionSignal {
                        receiver: rx.clone(),
                    },
                )
            })
            .collect();
        Arc::new(table)
    }

    /// Reseed every slot with a Pending result and hand out the writers.
    ///
    /// Signals obtained before this call keep observing the previous run.
    pub fn prepare_run(&mut self) -> Vec<(Arc<Task>, ResultWriter)> {
        let mut pairs = Vec::with_capacity(self.tasks.len());
        for (task, slot) in self.tasks.iter().zip(self.slots.iter_mut()) {
            let (sender, receiver) = watch::channel(TaskResult::pending(task.id().clone()));
            *slot = receiver;
            pairs.push((
                Arc::clone(task),
                ResultWriter {
                    sender,
                    finished: false,
                },
            ));
        }
        pairs
    }
}

fn pending_slot(id: TaskId) -> watch::Receiver<TaskResult> {
    let (_sender, receiver) = watch::channel(TaskResult::pending(id));
    receiver
}

/// Exclusive write handle to one task's result.
///
/// Dropping a writer that never reached a terminal state publishes a Failed
/// result, so dependents never wait forever.
pub struct ResultWriter {
    sender: watch::Sender<TaskResult>,
    finished: bool,
}

impl ResultWriter {
    /// Mark the task Running and record its start time.
    pub fn start(&mut self) {
        self.sender.send_modify(|result| {
            result.status = TaskStatus::Running;
            result.started_at = Some(Utc::now());
        });
    }

    /// Record the number of attempts made so far.
    pub fn record_attempt(&mut self, attempt: u32) {
        self.sender.send_modify(|result| result.attempts = attempt);
    }

    /// Finish with Success.
    pub fn succeed(self, output: Value, attempts: u32, duration: Duration) -> TaskResult {
        self.finish(|result| {
            result.status = TaskStatus::Success;
            result.output = Some(output);
            result.attempts = attempts;
            result.duration = duration;
        })
    }

    /// Finish with Failed.
    pub fn fail(self, error: TaskFailure, attempts: u32, duration: Duration) -> TaskResult {
        self.finish(|result| {
            result.status = TaskStatus::Failed;
            result.error = Some(error);
            result.attempts = attempts;
            result.duration = duration;
        })
    }

    /// Finish with Skipped; the task never ran.
    pub fn skip(self, reason: TaskFailure) -> TaskResult {
        self.finish(|result| {
            result.status = TaskStatus::Skipped;
            result.error = Some(reason);
        })
    }

    fn finish(mut self, apply: impl FnOnce(&mut TaskResult)) -> TaskResult {
        self.finished = true;
        self.sender.send_modify(|result| {
            apply(result);
            result.completed_at = Some(Utc::now());
        });
        self.sender.borrow().clone()
    }
}

impl Drop for ResultWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.sender.send_modify(|result| {
            if result.is_terminal() {
                return;
            }
            warn!(task = %result.task_id, "execution ended without a result");
            result.status = TaskStatus::Failed;
            result.error = Some(TaskFailure::execution(
                "execution ended without a result",
            ));
            result.completed_at = Some(Utc::now());
        });
    }
}

/// Read-only view of a task's result that fires once it is terminal.
#[derive(Clone)]
pub struct CompletionSignal {
    receiver: watch::Receiver<TaskResult>,
}

impl CompletionSignal {
    /// Whether the task has reached a terminal status.
    pub fn is_fired(&self) -> bool {
        self.receiver.borrow().is_terminal()
    }

    /// The task's current result.
    pub fn snapshot(&self) -> TaskResult {
        self.receiver.borrow().clone()
    }

    /// Wait until the task is terminal and return its result.
    pub async fn wait(&self) -> TaskResult {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(TaskResult::is_terminal).await.is_err() {
            debug!("result writer dropped before completion");
        }
        let result = receiver.borrow().clone();
        result
    }
}
