//! conductor: an in-process orchestrator for dependent async tasks.
//!
//! Tasks are registered with their dependencies, a timeout, an attempt
//! budget and a priority. A run starts every task as soon as its
//! dependencies succeeded, bounded by a shared concurrency limit, retries
//! failed attempts with exponential backoff and applies the failure policy
//! (`continue` skips dependents, `abort` stops everything not yet started).
//! The outcome is a [`RunReport`].
//!
//! ```no_run
//! use conductor::{Orchestrator, OrchestratorConfig, Task, work};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), conductor::OrchestratorError> {
//! let mut orchestrator = Orchestrator::new(OrchestratorConfig::default().with_max_concurrent(2));
//! orchestrator.register_many(vec![
//!     Task::builder("extract", work::value(json!([1, 2, 3]))).build(),
//!     Task::builder("load", work::value(json!("ok")))
//!         .depends_on("extract")
//!         .build(),
//! ])?;
//!
//! let report = orchestrator.run().await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! Batches can also be described in YAML (see [`config`]) and run with the
//! `cnd` binary.

pub mod batch;
pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod report;
pub mod testing;

pub use batch::{TaskSpec, parallel_map, run_batch};
pub use config::{
    BatchFile, ConfigError, DependencyMode, FailurePolicy, OrchestratorConfig, YamlLoader,
    load_batch_file,
};
pub use core::dag::{DagError, DependencyGraph};
pub use core::result::{ErrorKind, TaskFailure, TaskResult, TaskStatus};
pub use core::retry::Backoff;
pub use core::task::{AttemptContext, Task, TaskBuilder, WorkError, WorkItem};
pub use core::types::{RunId, TaskId};
pub use core::work;
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandWork, Orchestrator, OrchestratorError, RegistryError};
pub use report::{FailureEntry, RunReport, RunSummary};
