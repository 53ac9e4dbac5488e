//! Per-task result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::types::TaskId;

/// Lifecycle status of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, not yet started.
    Pending,
    /// Holding a concurrency slot and running attempts.
    Running,
    /// An attempt completed successfully.
    Success,
    /// All attempts failed.
    Failed,
    /// Never ran (dependency failed or run aborted).
    Skipped,
}

impl TaskStatus {
    /// Whether this status can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of why a task did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An upstream dependency did not reach Success.
    DependencyFailure,
    /// The run was aborted before this task could start.
    OrchestrationAborted,
    /// An attempt exceeded its timeout.
    Timeout,
    /// The work item itself returned an error or panicked.
    ExecutionError,
    /// A referenced dependency was never registered.
    UnknownDependency,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DependencyFailure => "DependencyFailure",
            ErrorKind::OrchestrationAborted => "OrchestrationAborted",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::UnknownDependency => "UnknownDependency",
        };
        f.write_str(s)
    }
}

/// Error description attached to Failed and Skipped results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn dependency_failed(dependency: &TaskId) -> Self {
        Self::new(
            ErrorKind::DependencyFailure,
            format!("dependency '{}' did not succeed", dependency),
        )
    }

    pub fn aborted() -> Self {
        Self::new(ErrorKind::OrchestrationAborted, "orchestration aborted")
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("timed out after {:?}", after))
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionError, message)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Present only on Success.
    pub output: Option<Value>,
    /// Present on Failed and Skipped.
    pub error: Option<TaskFailure>,
    /// Attempts made; zero when the task never ran.
    pub attempts: u32,
    /// Elapsed time of the successful or last attempt.
    #[serde(rename = "duration_secs", with = "serde_secs")]
    pub duration: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    /// A fresh Pending result.
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            output: None,
            error: None,
            attempts: 0,
            duration: Duration::ZERO,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error kind, if the task did not succeed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Serializes Duration as fractional seconds.
pub(crate) mod serde_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
