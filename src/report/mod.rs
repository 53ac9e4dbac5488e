//! Run reports.
//!
//! A [`RunReport`] is the read-only outcome of one run: every task's terminal
//! result in registration order plus run-level facts. It renders as a text
//! report through `Display` and as JSON through [`RunReport::to_json`].

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::core::result::{ErrorKind, TaskResult, TaskStatus, serde_secs};
use crate::core::types::{RunId, TaskId};

const RULE_WIDTH: usize = 50;

/// Outcome of one orchestration run.
#[derive(Debug, Clone)]
pub struct RunReport {
    run_id: RunId,
    results: Vec<TaskResult>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration: Duration,
    aborted: bool,
    max_concurrent: usize,
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of tasks that succeeded, 0 for an empty run.
    pub success_rate: f64,
    #[serde(rename = "duration_secs", with = "serde_secs")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub aborted: bool,
    pub max_concurrent: usize,
}

/// A task that ended Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub task_id: TaskId,
    pub kind: ErrorKind,
    pub error: String,
}

impl RunReport {
    pub(crate) fn new(
        run_id: RunId,
        results: Vec<TaskResult>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration: Duration,
        aborted: bool,
        max_concurrent: usize,
    ) -> Self {
        Self {
            run_id,
            results,
            started_at,
            completed_at,
            duration,
            aborted,
            max_concurrent,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether the abort flag was raised during the run.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether every task succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(TaskResult::is_success)
    }

    /// Aggregate counts and run-level facts.
    pub fn summary(&self) -> RunSummary {
        let count = |status: TaskStatus| self.results.iter().filter(|r| r.status == status).count();
        let total = self.results.len();
        let succeeded = count(TaskStatus::Success);
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64 * 100.0
        };

        RunSummary {
            run_id: self.run_id,
            total,
            succeeded,
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            success_rate,
            duration: self.duration,
            started_at: self.started_at,
            completed_at: self.completed_at,
            aborted: self.aborted,
            max_concurrent: self.max_concurrent,
        }
    }

    /// Every Failed task with its error, in registration order.
    pub fn failures(&self) -> Vec<FailureEntry> {
        self.results
            .iter()
            .filter(|r| r.status == TaskStatus::Failed)
            .filter_map(|r| {
                r.error.as_ref().map(|e| FailureEntry {
                    task_id: r.task_id.clone(),
                    kind: e.kind,
                    error: e.message.clone(),
                })
            })
            .collect()
    }

    /// All results, in registration order.
    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn result(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results.iter().find(|r| &r.task_id == id)
    }

    /// Output of a task that succeeded.
    pub fn output(&self, id: &TaskId) -> Option<&Value> {
        self.result(id).and_then(|r| r.output.as_ref())
    }

    /// Pretty-printed JSON of `{ "summary": ..., "results": { id: ... } }`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The same document as [`to_json`](Self::to_json), as a value.
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for RunReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("RunReport", 2)?;
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("results", &ResultsById(&self.results))?;
        state.end()
    }
}

/// Serializes results as a map keyed by task id, keeping registration order.
struct ResultsById<'a>(&'a [TaskResult]);

impl Serialize for ResultsById<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(&result.task_id, result)?;
        }
        map.end()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary();
        let rule = "=".repeat(RULE_WIDTH);

        writeln!(f, "{}", rule)?;
        writeln!(f, "ORCHESTRATION REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total Tasks:    {}", summary.total)?;
        writeln!(
            f,
            "Success:        {} ({:.1}%)",
            summary.succeeded, summary.success_rate
        )?;
        writeln!(f, "Failed:         {}", summary.failed)?;
        writeln!(f, "Skipped:        {}", summary.skipped)?;
        writeln!(f, "Duration:       {:.2}s", summary.duration.as_secs_f64())?;
        writeln!(f, "Max Concurrent: {}", summary.max_concurrent)?;

        if summary.aborted {
            writeln!(f)?;
            writeln!(f, "ABORTED due to failure")?;
        }

        let failures = self.failures();
        if !failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "FAILED TASKS:")?;
            for failure in &failures {
                writeln!(f, "  - {}: {}", failure.task_id, failure.error)?;
            }
        }

        write!(f, "{}", rule)
    }
}
