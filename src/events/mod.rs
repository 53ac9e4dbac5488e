//! Lifecycle events and event handling.
//!
//! This module provides event emission for run and task lifecycle events,
//! enabling observability into orchestration runs without coupling the
//! engine to any particular output.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::result::TaskFailure;
use crate::core::types::{RunId, TaskId};

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run has started.
    RunStarted {
        run_id: RunId,
        task_count: usize,
        timestamp: Instant,
    },

    /// A run finished; every task has a terminal status.
    RunCompleted {
        run_id: RunId,
        /// Whether every task succeeded.
        success: bool,
        /// Whether the abort flag was raised during the run.
        aborted: bool,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task acquired a concurrency slot and began its first attempt.
    TaskStarted {
        run_id: RunId,
        task_id: TaskId,
        timestamp: Instant,
    },

    /// A task attempt failed and another attempt will follow.
    ///
    /// Emitted immediately before the backoff delay.
    TaskRetrying {
        run_id: RunId,
        task_id: TaskId,
        /// The attempt number that just failed (1-indexed).
        attempt: u32,
        /// Total number of attempts the task may make.
        max_attempts: u32,
        /// Backoff before the next attempt.
        delay: Duration,
        /// Why the attempt failed.
        error: TaskFailure,
        timestamp: Instant,
    },

    /// A task completed successfully.
    TaskSucceeded {
        run_id: RunId,
        task_id: TaskId,
        attempts: u32,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task exhausted its attempts.
    TaskFailed {
        run_id: RunId,
        task_id: TaskId,
        attempts: u32,
        error: TaskFailure,
        timestamp: Instant,
    },

    /// A task was skipped without running.
    TaskSkipped {
        run_id: RunId,
        task_id: TaskId,
        reason: TaskFailure,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::RunStarted { timestamp, .. } => *timestamp,
            Event::RunCompleted { timestamp, .. } => *timestamp,
            Event::TaskStarted { timestamp, .. } => *timestamp,
            Event::TaskRetrying { timestamp, .. } => *timestamp,
            Event::TaskSucceeded { timestamp, .. } => *timestamp,
            Event::TaskFailed { timestamp, .. } => *timestamp,
            Event::TaskSkipped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the run the event belongs to.
    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::RunCompleted { run_id, .. }
            | Event::TaskStarted { run_id, .. }
            | Event::TaskRetrying { run_id, .. }
            | Event::TaskSucceeded { run_id, .. }
            | Event::TaskFailed { run_id, .. }
            | Event::TaskSkipped { run_id, .. } => *run_id,
        }
    }

    /// Get the task the event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::RunStarted { .. } | Event::RunCompleted { .. } => None,
            Event::TaskStarted { task_id, .. }
            | Event::TaskRetrying { task_id, .. }
            | Event::TaskSucceeded { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskSkipped { task_id, .. } => Some(task_id),
        }
    }

    /// Create a RunStarted event.
    pub fn run_started(run_id: RunId, task_count: usize) -> Self {
        Event::RunStarted {
            run_id,
            task_count,
            timestamp: Instant::now(),
        }
    }

    /// Create a RunCompleted event.
    pub fn run_completed(run_id: RunId, success: bool, aborted: bool, duration: Duration) -> Self {
        Event::RunCompleted {
            run_id,
            success,
            aborted,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStarted event.
    pub fn task_started(run_id: RunId, task_id: TaskId) -> Self {
        Event::TaskStarted {
            run_id,
            task_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskRetrying event.
    pub fn task_retrying(
        run_id: RunId,
        task_id: TaskId,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: TaskFailure,
    ) -> Self {
        Event::TaskRetrying {
            run_id,
            task_id,
            attempt,
            max_attempts,
            delay,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskSucceeded event.
    pub fn task_succeeded(run_id: RunId, task_id: TaskId, attempts: u32, duration: Duration) -> Self {
        Event::TaskSucceeded {
            run_id,
            task_id,
            attempts,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFailed event.
    pub fn task_failed(run_id: RunId, task_id: TaskId, attempts: u32, error: TaskFailure) -> Self {
        Event::TaskFailed {
            run_id,
            task_id,
            attempts,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskSkipped event.
    pub fn task_skipped(run_id: RunId, task_id: TaskId, reason: TaskFailure) -> Self {
        Event::TaskSkipped {
            run_id,
            task_id,
            reason,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
