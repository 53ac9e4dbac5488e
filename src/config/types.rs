//! Configuration type definitions.
//!
//! Run-level settings ([`OrchestratorConfig`]) and the YAML batch file
//! structures ([`BatchFile`], [`TaskConfig`], [`WorkConfig`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;
use crate::core::retry::Backoff;

/// Default maximum number of concurrently executing tasks.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// What happens to remaining work after a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Independent tasks keep running; only dependents are skipped.
    #[default]
    Continue,
    /// Any failure stops all work that has not started yet.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(ConfigError::InvalidConfig(format!(
                "unknown failure policy '{}', expected 'continue' or 'abort'",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Continue => f.write_str("continue"),
            FailurePolicy::Abort => f.write_str("abort"),
        }
    }
}

/// How references to unregistered dependencies are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMode {
    /// Log a warning and treat the dependency as satisfied.
    #[default]
    Lenient,
    /// Refuse to start the run.
    Strict,
}

/// Run-wide orchestrator settings, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of tasks executing at once.
    pub max_concurrent: usize,
    /// Failure propagation policy.
    pub on_failure: FailurePolicy,
    /// Handling of unknown dependency identifiers.
    pub dependency_mode: DependencyMode,
    /// Delay schedule between retry attempts.
    pub backoff: Backoff,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            on_failure: FailurePolicy::default(),
            dependency_mode: DependencyMode::default(),
            backoff: Backoff::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_dependency_mode(mut self, mode: DependencyMode) -> Self {
        self.dependency_mode = mode;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check invariants that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_concurrent cannot be zero".into(),
            ));
        }
        if self.backoff.max < self.backoff.base {
            return Err(ConfigError::InvalidConfig(
                "backoff max_ms cannot be lower than base_ms".into(),
            ));
        }
        Ok(())
    }
}

/// A batch file: run settings plus task definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    /// Run-level settings.
    #[serde(flatten)]
    pub config: OrchestratorConfig,
    /// Task definitions, in registration order.
    pub tasks: Vec<TaskConfig>,
}

/// Task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task identifier (unique within the batch).
    pub id: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Work item type and configuration.
    #[serde(flatten)]
    pub work: WorkConfig,
    /// Identifiers of tasks that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: Option<f64>,
    /// Maximum number of attempts.
    pub retries: Option<u32>,
    /// Scheduling priority (higher first).
    pub priority: Option<i32>,
}

/// Work item type configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkConfig {
    /// External command.
    #[serde(rename = "command")]
    Command {
        /// Program to run.
        command: String,
        /// Command arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory.
        working_dir: Option<String>,
    },
    /// Sleep, then succeed.
    #[serde(rename = "sleep")]
    Sleep {
        /// Sleep duration in milliseconds.
        millis: u64,
    },
    /// Succeed immediately with a constant value.
    #[serde(rename = "echo")]
    Echo {
        /// Output value.
        #[serde(default)]
        value: serde_yaml::Value,
    },
}

impl WorkConfig {
    /// Short type name, for display.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkConfig::Command { .. } => "command",
            WorkConfig::Sleep { .. } => "sleep",
            WorkConfig::Echo { .. } => "echo",
        }
    }
}
