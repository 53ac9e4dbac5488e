//! Task builder from YAML batch configuration.
//!
//! This module converts [`TaskConfig`] entries into runnable [`Task`]s.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::error::ConfigError;
use super::types::{BatchFile, OrchestratorConfig, TaskConfig, WorkConfig};
use super::yaml::YamlLoader;
use crate::core::task::{Task, TaskBuilder, WorkItem};
use crate::core::types::TaskId;
use crate::core::work;
use crate::execution::CommandWork;

/// Builder for creating tasks from batch configuration.
pub struct BatchBuilder;

impl BatchBuilder {
    /// Build every task of a batch, in file order.
    pub fn build(batch: &BatchFile) -> Result<Vec<Task>, ConfigError> {
        batch.tasks.iter().map(Self::build_task).collect()
    }

    /// Build a Task from TaskConfig.
    pub fn build_task(config: &TaskConfig) -> Result<Task, ConfigError> {
        let work = Self::build_work(&config.work)?;
        let mut builder = TaskBuilder::new(TaskId::new(&config.id), work)
            .depends_on_all(config.depends_on.iter().map(TaskId::new));

        if let Some(name) = &config.name {
            builder = builder.name(name);
        }
        if let Some(secs) = config.timeout_secs {
            let timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                ConfigError::InvalidConfig(format!("task '{}': timeout_secs: {}", config.id, e))
            })?;
            builder = builder.timeout(timeout);
        }
        if let Some(retries) = config.retries {
            builder = builder.retries(retries);
        }
        if let Some(priority) = config.priority {
            builder = builder.priority(priority);
        }

        Ok(builder.build())
    }

    fn build_work(config: &WorkConfig) -> Result<Arc<dyn WorkItem>, ConfigError> {
        match config {
            WorkConfig::Command {
                command,
                args,
                env,
                working_dir,
            } => {
                let mut builder = CommandWork::builder(command).args(args).envs(env.clone());
                if let Some(dir) = working_dir {
                    builder = builder.working_dir(dir);
                }
                Ok(Arc::new(builder.build()))
            }
            WorkConfig::Sleep { millis } => {
                Ok(Arc::new(work::sleep(Duration::from_millis(*millis))))
            }
            WorkConfig::Echo { value } => {
                // Convert serde_yaml::Value to serde_json::Value
                let json_value = serde_json::to_value(value)
                    .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
                Ok(Arc::new(work::value(json_value)))
            }
        }
    }
}

impl BatchFile {
    /// Build the batch's tasks in file order.
    pub fn build_tasks(&self) -> Result<Vec<Task>, ConfigError> {
        BatchBuilder::build(self)
    }
}

/// Load, validate and build a batch file in one step.
pub fn load_batch_file(
    path: impl AsRef<Path>,
) -> Result<(OrchestratorConfig, Vec<Task>), ConfigError> {
    let batch = YamlLoader::load_batch(path)?;
    let tasks = BatchBuilder::build(&batch)?;
    Ok((batch.config, tasks))
}
