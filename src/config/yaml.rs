//! YAML batch file parsing.
//!
//! Parses batch definitions from YAML files and validates them before any
//! task is built.

use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::types::{BatchFile, DependencyMode, WorkConfig};
use crate::core::dag::DependencyGraph;
use crate::core::types::TaskId;

/// Loader for YAML batch files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a batch file from disk.
    pub fn load_batch(path: impl AsRef<Path>) -> Result<BatchFile, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let batch: BatchFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_batch(&batch)?;
        Ok(batch)
    }

    /// Parse a batch from a YAML string.
    pub fn parse_batch(yaml: &str) -> Result<BatchFile, ConfigError> {
        let batch: BatchFile = serde_yaml::from_str(yaml)?;
        Self::validate_batch(&batch)?;
        Ok(batch)
    }

    /// Validate a batch definition.
    pub fn validate_batch(batch: &BatchFile) -> Result<(), ConfigError> {
        batch.config.validate()?;

        // Check for at least one task
        if batch.tasks.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "batch must have at least one task".into(),
            ));
        }

        let mut task_ids: HashSet<&str> = HashSet::new();
        for task in &batch.tasks {
            if task.id.trim().is_empty() {
                return Err(ConfigError::MissingField("id".into()));
            }
            if !task_ids.insert(&task.id) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
            if task.retries == Some(0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}': retries must be at least 1",
                    task.id
                )));
            }
            if let Some(secs) = task.timeout_secs
                && !(secs.is_finite() && secs > 0.0)
            {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}': timeout_secs must be a positive number",
                    task.id
                )));
            }
            if let WorkConfig::Command { command, .. } = &task.work
                && command.trim().is_empty()
            {
                return Err(ConfigError::MissingField(format!(
                    "command (task '{}')",
                    task.id
                )));
            }
        }

        Self::dependency_graph(batch)?;
        Ok(())
    }

    /// Build the dependency graph of a batch, rejecting cycles and, in strict
    /// mode, unknown dependencies.
    pub fn dependency_graph(batch: &BatchFile) -> Result<DependencyGraph, ConfigError> {
        let mut graph = DependencyGraph::new();
        for task in &batch.tasks {
            let deps: Vec<TaskId> = task.depends_on.iter().map(TaskId::new).collect();
            graph.add_task(TaskId::new(&task.id), &deps)?;
        }
        if batch.config.dependency_mode == DependencyMode::Strict {
            graph.validate_references()?;
        }
        Ok(graph)
    }
}
