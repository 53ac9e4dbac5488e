//! Closure adapters for [`WorkItem`].
//!
//! - [`from_fn`]: an async closure, polled on the runtime
//! - [`blocking`]: a synchronous closure, run on tokio's blocking pool
//! - [`value`]: a constant output, handy for tests and placeholders
//! - [`sleep`]: wait, then succeed with `null`
//!
//! All of them satisfy the same trait, so the executor does not know which
//! kind it is running.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::task::{AttemptContext, WorkError, WorkItem};

/// Work item backed by an async closure.
pub struct FnWork<F, Fut, T> {
    func: F,
    _marker: PhantomData<fn() -> (Fut, T)>,
}

/// Wrap an async closure as a work item.
///
/// The closure is called once per attempt; its output is converted to JSON.
///
/// ```ignore
/// let work = conductor::work::from_fn(|ctx| async move {
///     Ok::<_, WorkError>(format!("attempt {}", ctx.attempt))
/// });
/// ```
pub fn from_fn<F, Fut, T>(func: F) -> FnWork<F, Fut, T>
where
    F: Fn(AttemptContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, WorkError>> + Send,
    T: Serialize,
{
    FnWork {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, T> WorkItem for FnWork<F, Fut, T>
where
    F: Fn(AttemptContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, WorkError>> + Send,
    T: Serialize,
{
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        let output = (self.func)(ctx).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Work item backed by a synchronous closure.
pub struct BlockingWork<F, T> {
    func: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

/// Wrap a blocking closure as a work item.
///
/// Each attempt runs on tokio's blocking thread pool so it does not stall
/// other tasks. A timed-out attempt is abandoned, but the thread keeps
/// running the closure until it returns.
pub fn blocking<F, T>(func: F) -> BlockingWork<F, T>
where
    F: Fn(AttemptContext) -> Result<T, WorkError> + Send + Sync + 'static,
    T: Serialize + Send + 'static,
{
    BlockingWork {
        func: Arc::new(func),
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, T> WorkItem for BlockingWork<F, T>
where
    F: Fn(AttemptContext) -> Result<T, WorkError> + Send + Sync + 'static,
    T: Serialize + Send + 'static,
{
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        let func = Arc::clone(&self.func);
        let output = tokio::task::spawn_blocking(move || (*func)(ctx))
            .await
            .map_err(|e| WorkError::Panicked(e.to_string()))??;
        Ok(serde_json::to_value(output)?)
    }
}

/// Work item that always returns the same value.
#[derive(Debug, Clone)]
pub struct ValueWork {
    value: Value,
}

/// A work item that immediately succeeds with `value`.
pub fn value(value: impl Into<Value>) -> ValueWork {
    ValueWork {
        value: value.into(),
    }
}

#[async_trait]
impl WorkItem for ValueWork {
    async fn run(&self, _ctx: AttemptContext) -> Result<Value, WorkError> {
        Ok(self.value.clone())
    }
}

/// Work item that sleeps, then succeeds with `null`.
#[derive(Debug, Clone, Copy)]
pub struct SleepWork {
    duration: Duration,
}

/// A work item that waits for `duration` and then succeeds.
pub fn sleep(duration: Duration) -> SleepWork {
    SleepWork { duration }
}

#[async_trait]
impl WorkItem for SleepWork {
    async fn run(&self, _ctx: AttemptContext) -> Result<Value, WorkError> {
        tokio::time::sleep(self.duration).await;
        Ok(Value::Null)
    }
}
