//! Task execution engine.
//!
//! This module provides the execution infrastructure for running tasks:
//! the registry with its result slots, dependency gating, the per-task
//! executor, run coordination and external command work.

mod command;
mod executor;
mod orchestrator;
mod registry;
mod state;
mod waiter;

pub use command::{CommandWork, CommandWorkBuilder};
pub use executor::TaskExecutor;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use registry::{CompletionSignal, RegistryError, ResultWriter, TaskRegistry};
pub use state::RunState;
pub use waiter::{Clearance, wait_for_dependencies};
