//! Testing utilities for users of the conductor library.
//!
//! This module provides helpers for testing orchestration behavior:
//!
//! - [`FlakyWork`]: A work item that fails N times then succeeds
//! - [`SlowWork`]: A work item that sleeps before succeeding
//! - [`ConcurrencyProbe`]: Measures how many work items run at once
//! - [`RecordingHandler`]: An event handler that keeps every event
//! - [`TestHarness`]: Runs a set of tasks through an orchestrator

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{FailurePolicy, OrchestratorConfig};
use crate::core::retry::Backoff;
use crate::core::task::{AttemptContext, Task, WorkError, WorkItem};
use crate::core::types::TaskId;
use crate::events::{Event, EventHandler};
use crate::execution::{Orchestrator, OrchestratorError};
use crate::report::RunReport;

/// A work item that fails a configurable number of times, then succeeds.
///
/// Clones share their counters, so a test can keep one handle and move
/// another into a task.
///
/// ```
/// use conductor::testing::FlakyWork;
///
/// // Fails 2 times, then succeeds on the 3rd attempt
/// let work = FlakyWork::new(2);
/// assert_eq!(work.calls(), 0);
/// ```
#[derive(Clone)]
pub struct FlakyWork {
    inner: Arc<FlakyState>,
}

struct FlakyState {
    /// `None` means fail forever.
    failures: Option<u32>,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl FlakyWork {
    /// Create a work item that fails `failures` times then succeeds.
    pub fn new(failures: u32) -> Self {
        Self::with_failures(Some(failures))
    }

    /// Create a work item that never succeeds.
    pub fn always_failing() -> Self {
        Self::with_failures(None)
    }

    fn with_failures(failures: Option<u32>) -> Self {
        Self {
            inner: Arc::new(FlakyState {
                failures,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of times the work item has been run.
    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// When each run started.
    pub fn call_times(&self) -> Vec<Instant> {
        self.inner
            .call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WorkItem for FlakyWork {
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        self.inner
            .call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;

        match self.inner.failures {
            Some(failures) if call > failures => Ok(json!({ "attempt": ctx.attempt })),
            _ => Err(WorkError::failed(format!(
                "intentional failure on attempt {}",
                ctx.attempt
            ))),
        }
    }

    fn description(&self) -> Option<&str> {
        Some("flaky")
    }
}

/// A work item that sleeps, then returns its output.
#[derive(Debug, Clone)]
pub struct SlowWork {
    duration: Duration,
    output: Value,
}

impl SlowWork {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            output: Value::Null,
        }
    }

    /// Set the value returned after sleeping.
    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.output = output.into();
        self
    }
}

#[async_trait]
impl WorkItem for SlowWork {
    async fn run(&self, _ctx: AttemptContext) -> Result<Value, WorkError> {
        tokio::time::sleep(self.duration).await;
        Ok(self.output.clone())
    }
}

/// Tracks how many of its work items are running at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeState>,
}

#[derive(Default)]
struct ProbeState {
    active: AtomicUsize,
    max_observed: AtomicUsize,
    started: Mutex<Vec<TaskId>>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A work item that counts itself active while sleeping for `duration`.
    pub fn work(&self, duration: Duration) -> ProbeWork {
        ProbeWork {
            probe: self.clone(),
            duration,
        }
    }

    /// Number of probe work items running right now.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Highest number of probe work items ever running at once.
    pub fn max_observed(&self) -> usize {
        self.inner.max_observed.load(Ordering::SeqCst)
    }

    /// Tasks in the order their work started.
    pub fn started(&self) -> Vec<TaskId> {
        self.inner
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Work item created by [`ConcurrencyProbe::work`].
pub struct ProbeWork {
    probe: ConcurrencyProbe,
    duration: Duration,
}

#[async_trait]
impl WorkItem for ProbeWork {
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        let state = &self.probe.inner;
        state
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.task_id.clone());

        let now_active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_observed.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        state.active.fetch_sub(1, Ordering::SeqCst);

        Ok(json!(ctx.task_id))
    }
}

/// Event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in arrival order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Recorded events concerning one task.
    pub async fn events_for(&self, task_id: &str) -> Vec<Event> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.task_id().is_some_and(|id| id.as_str() == task_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// A test harness for running tasks through an orchestrator.
///
/// Uses a 1 ms backoff so retry-heavy tests stay fast.
///
/// # Example
///
/// ```ignore
/// use conductor::testing::{FlakyWork, TestHarness};
/// use conductor::Task;
///
/// let report = TestHarness::new()
///     .with_concurrency(2)
///     .execute_and_assert_success(vec![Task::builder("t", FlakyWork::new(1)).build()])
///     .await;
/// ```
pub struct TestHarness {
    config: OrchestratorConfig,
}

impl TestHarness {
    /// Create a new test harness.
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default()
                .with_backoff(Backoff::exponential(Duration::from_millis(1))),
        }
    }

    /// Set the concurrency limit for task execution.
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    /// Set the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.on_failure = policy;
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the tasks in order and run them.
    pub async fn execute(&self, tasks: Vec<Task>) -> Result<RunReport, OrchestratorError> {
        let mut orchestrator = Orchestrator::new(self.config.clone());
        orchestrator.register_many(tasks)?;
        orchestrator.run().await
    }

    /// Execute and assert that every task succeeded.
    pub async fn execute_and_assert_success(&self, tasks: Vec<Task>) -> RunReport {
        let report = match self.execute(tasks).await {
            Ok(report) => report,
            Err(err) => panic!("Expected run to start, got {}", err),
        };
        assert!(
            report.is_success(),
            "Expected every task to succeed. Failures: {:?}",
            report.failures()
        );
        report
    }

    /// Execute and assert that at least one task did not succeed.
    pub async fn execute_and_assert_failure(&self, tasks: Vec<Task>) -> RunReport {
        let report = match self.execute(tasks).await {
            Ok(report) => report,
            Err(err) => panic!("Expected run to start, got {}", err),
        };
        assert!(!report.is_success(), "Expected run to fail, but it succeeded");
        report
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
