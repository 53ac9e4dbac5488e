//! Dependency gating.
//!
//! Before a task may compete for a concurrency slot it waits here for its
//! registered dependencies to reach a terminal status. The wait ends early
//! as soon as one dependency did not succeed or the run is aborted; a task
//! that proceeds has seen every dependency succeed.

use std::collections::HashMap;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::registry::CompletionSignal;
use super::state::RunState;
use crate::core::result::TaskFailure;
use crate::core::task::Task;
use crate::core::types::TaskId;

/// Outcome of the dependency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearance {
    /// All dependencies succeeded and the run is not aborted.
    Proceed,
    /// The task must not run.
    Skip(TaskFailure),
}

impl Clearance {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Clearance::Proceed)
    }
}

/// Wait for the dependencies of `task` and decide whether it may run.
///
/// Unknown dependencies are logged and treated as satisfied; the known ones
/// are awaited together. The first dependency to finish without success
/// yields a `DependencyFailure` skip without
/// waiting for the rest; under the abort policy it also raises the abort
/// flag. An abort seen on entry, raised while parked on a dependency, or
/// observed after a dependency wait yields an `OrchestrationAborted` skip.
pub async fn wait_for_dependencies(
    task: &Task,
    signals: &HashMap<TaskId, CompletionSignal>,
    state: &RunState,
) -> Clearance {
    if state.is_aborted() {
        return Clearance::Skip(TaskFailure::aborted());
    }

    let mut pending = JoinSet::new();
    for dependency in task.dependencies() {
        let Some(signal) = signals.get(dependency) else {
            warn!(
                task = %task.id(),
                dependency = %dependency,
                "unknown dependency, treating as satisfied"
            );
            continue;
        };
        let (dependency, signal) = (dependency.clone(), signal.clone());
        pending.spawn(async move { (dependency, signal.wait().await) });
    }

    // Dropping `pending` on an early return cancels the remaining waits.
    loop {
        let next = tokio::select! {
            biased;
            next = pending.join_next() => next,
            _ = state.aborted() => {
                debug!(task = %task.id(), "abort raised while waiting on dependencies");
                return Clearance::Skip(TaskFailure::aborted());
            }
        };
        let (dependency, result) = match next {
            None => break,
            Some(Ok(finished)) => finished,
            Some(Err(e)) => {
                warn!(task = %task.id(), error = %e, "dependency wait ended abnormally");
                return Clearance::Skip(TaskFailure::aborted());
            }
        };

        if !result.is_success() {
            debug!(
                task = %task.id(),
                dependency = %dependency,
                status = %result.status,
                "dependency did not succeed"
            );
            state.record_failure();
            return Clearance::Skip(TaskFailure::dependency_failed(&dependency));
        }
        if state.is_aborted() {
            return Clearance::Skip(TaskFailure::aborted());
        }
    }

    if state.is_aborted() {
        return Clearance::Skip(TaskFailure::aborted());
    }
    Clearance::Proceed
}
