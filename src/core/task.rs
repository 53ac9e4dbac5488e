//! Task definitions and the work item trait.
//!
//! A [`Task`] is an immutable description of scheduled work: identifier,
//! dependencies, timeout, attempt budget and priority, wrapping an opaque
//! [`WorkItem`]. Implement `WorkItem` (or use the adapters in
//! [`crate::core::work`]) to define what a task actually does.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::types::TaskId;

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Attempt budget used when none is configured.
pub const DEFAULT_RETRIES: u32 = 3;

/// Errors a work item can return from a single attempt.
#[derive(Debug, Error)]
pub enum WorkError {
    /// Work failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// External command exited unsuccessfully.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Output could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The work item panicked.
    #[error("work item panicked: {0}")]
    Panicked(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkError {
    /// Shorthand for [`WorkError::ExecutionFailed`].
    pub fn failed(message: impl Into<String>) -> Self {
        WorkError::ExecutionFailed(message.into())
    }

    /// Wrap any error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WorkError::Other(Box::new(err))
    }
}

/// Information handed to a work item for one attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Task being executed.
    pub task_id: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Total attempts the task may make.
    pub max_attempts: u32,
    /// Time budget for this attempt.
    pub timeout: Duration,
}

impl AttemptContext {
    pub fn new(task_id: TaskId, attempt: u32, max_attempts: u32, timeout: Duration) -> Self {
        Self {
            task_id,
            attempt,
            max_attempts,
            timeout,
        }
    }

    /// Whether this is the final attempt the task will make.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// The unit of work a task wraps.
///
/// Implementations capture their own inputs. Each call to [`run`](Self::run)
/// is one attempt; the engine bounds it with the task's timeout and may call
/// it again on failure.
///
/// # Example
///
/// ```ignore
/// use conductor::{AttemptContext, WorkError, WorkItem};
/// use async_trait::async_trait;
/// use serde_json::{Value, json};
///
/// struct Fetch {
///     url: String,
/// }
///
/// #[async_trait]
/// impl WorkItem for Fetch {
///     async fn run(&self, _ctx: AttemptContext) -> Result<Value, WorkError> {
///         Ok(json!({ "url": self.url, "status": 200 }))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkItem: Send + Sync {
    /// Run one attempt and return the output value.
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl<W> WorkItem for Arc<W>
where
    W: WorkItem + ?Sized,
{
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        (**self).run(ctx).await
    }

    fn description(&self) -> Option<&str> {
        (**self).description()
    }
}

/// An immutable task definition.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    name: String,
    work: Arc<dyn WorkItem>,
    dependencies: Vec<TaskId>,
    timeout: Duration,
    retries: u32,
    priority: i32,
}

impl Task {
    /// Start building a task with the given identifier and work item.
    pub fn builder<W>(id: impl Into<TaskId>, work: W) -> TaskBuilder
    where
        W: WorkItem + 'static,
    {
        TaskBuilder::new(id.into(), Arc::new(work))
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the work item.
    pub fn work(&self) -> Arc<dyn WorkItem> {
        Arc::clone(&self.work)
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum number of attempts (always at least 1).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder {
    id: TaskId,
    name: Option<String>,
    work: Arc<dyn WorkItem>,
    dependencies: Vec<TaskId>,
    timeout: Duration,
    retries: u32,
    priority: i32,
}

impl TaskBuilder {
    /// Create a builder from an already shared work item.
    pub fn new(id: TaskId, work: Arc<dyn WorkItem>) -> Self {
        Self {
            id,
            name: None,
            work,
            dependencies: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            priority: 0,
        }
    }

    /// Set the display name (defaults to the identifier).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a single dependency.
    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    /// Add several dependencies.
    pub fn depends_on_all<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for id in ids {
            self = self.depends_on(id);
        }
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of attempts. Zero is treated as one.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the scheduling priority (higher first).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> Task {
        let name = self.name.unwrap_or_else(|| self.id.as_str().to_string());
        Task {
            id: self.id,
            name,
            work: self.work,
            dependencies: self.dependencies,
            timeout: self.timeout,
            retries: self.retries.max(1),
            priority: self.priority,
        }
    }
}
