//! One-call entry points.
//!
//! [`parallel_map`] runs a function over a list of items with bounded
//! concurrency and returns the outputs in input order. [`run_batch`] runs a
//! list of [`TaskSpec`]s under a given configuration and logs the text report.

use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::OrchestratorConfig;
use crate::core::task::{
    AttemptContext, DEFAULT_RETRIES, DEFAULT_TIMEOUT, Task, TaskBuilder, WorkError, WorkItem,
};
use crate::core::types::TaskId;
use crate::core::work;
use crate::execution::{Orchestrator, OrchestratorError};
use crate::report::RunReport;

/// Map `func` over `items`, at most `max_concurrent` at a time.
///
/// Item `i` becomes task `item_{i}` with the default timeout and attempt
/// budget. The result has one entry per item, in input order: `Some(output)`
/// when the item succeeded, `None` when it failed. Outputs are handed back
/// as-is and never pass through JSON, so `O` needs no serde support.
///
/// ```ignore
/// let doubled = conductor::batch::parallel_map(
///     |x: u32| async move { Ok::<_, WorkError>(x * 2) },
///     vec![1, 2, 3],
///     2,
/// )
/// .await?;
/// assert_eq!(doubled, vec![Some(2), Some(4), Some(6)]);
/// ```
pub async fn parallel_map<F, Fut, I, O>(
    func: F,
    items: Vec<I>,
    max_concurrent: usize,
) -> Result<Vec<Option<O>>, OrchestratorError>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, WorkError>> + Send + 'static,
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    let config = OrchestratorConfig::default().with_max_concurrent(max_concurrent);
    let mut orchestrator = Orchestrator::new(config);

    let func = Arc::new(func);
    let slots: Arc<Vec<Mutex<Option<O>>>> =
        Arc::new(items.iter().map(|_| Mutex::new(None)).collect());
    let ids: Vec<TaskId> = (0..items.len())
        .map(|i| TaskId::new(format!("item_{}", i)))
        .collect();
    for (i, (id, item)) in ids.iter().zip(items).enumerate() {
        let func = Arc::clone(&func);
        let slots = Arc::clone(&slots);
        let work = work::from_fn(move |_ctx: AttemptContext| {
            let pending = (*func)(item.clone());
            let slots = Arc::clone(&slots);
            async move {
                let output = pending.await?;
                *slots[i].lock().unwrap_or_else(PoisonError::into_inner) = Some(output);
                Ok::<_, WorkError>(Value::Null)
            }
        });
        orchestrator.register(
            Task::builder(id, work)
                .name(format!("Process item {}", i))
                .build(),
        )?;
    }

    let report = orchestrator.run().await?;
    debug!(
        items = ids.len(),
        succeeded = report.summary().succeeded,
        "parallel map finished"
    );

    // A slot filled by an attempt that still timed out does not count.
    Ok(ids
        .iter()
        .zip(slots.iter())
        .map(|(id, slot)| {
            let succeeded = report.result(id).is_some_and(|r| r.is_success());
            let output = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            output.filter(|_| succeeded)
        })
        .collect())
}

/// A task description for [`run_batch`].
///
/// Fields left at their [`TaskSpec::new`] values use the usual defaults:
/// name equal to the id, no dependencies, five minute timeout, three
/// attempts and priority 0.
#[derive(Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    pub name: Option<String>,
    pub work: Arc<dyn WorkItem>,
    pub dependencies: Vec<TaskId>,
    pub timeout: Duration,
    pub retries: u32,
    pub priority: i32,
}

impl TaskSpec {
    pub fn new<W>(id: impl Into<TaskId>, work: W) -> Self
    where
        W: WorkItem + 'static,
    {
        Self {
            id: id.into(),
            name: None,
            work: Arc::new(work),
            dependencies: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            priority: 0,
        }
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

impl From<TaskSpec> for Task {
    fn from(spec: TaskSpec) -> Self {
        let mut builder = TaskBuilder::new(spec.id, spec.work)
            .depends_on_all(spec.dependencies)
            .timeout(spec.timeout)
            .retries(spec.retries)
            .priority(spec.priority);
        if let Some(name) = spec.name {
            builder = builder.name(name);
        }
        builder.build()
    }
}

/// Register `specs` in order, run them, and log the text report.
pub async fn run_batch(
    specs: Vec<TaskSpec>,
    config: OrchestratorConfig,
) -> Result<RunReport, OrchestratorError> {
    let mut orchestrator = Orchestrator::new(config);
    orchestrator.register_many(specs.into_iter().map(Task::from))?;

    let report = orchestrator.run().await?;
    info!("\n{}", report);
    Ok(report)
}
