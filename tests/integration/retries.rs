//! Retry, backoff and timeout tests.

use conductor::testing::{FlakyWork, RecordingHandler, SlowWork};
use conductor::{
    AttemptContext, Backoff, ErrorKind, Event, EventBus, Orchestrator, OrchestratorConfig, Task,
    TaskStatus, WorkError, work,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{fast_config, result};

#[tokio::test]
async fn test_always_failing_task_exhausts_attempts_with_growing_backoff() {
    let flaky = FlakyWork::always_failing();
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let config = OrchestratorConfig::default()
        .with_backoff(Backoff::exponential(Duration::from_millis(10)));
    let mut orchestrator = Orchestrator::new(config).with_event_bus(bus);
    orchestrator
        .register(Task::builder("stubborn", flaky.clone()).retries(3).build())
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let stubborn = result(&report, "stubborn");
    assert_eq!(stubborn.status, TaskStatus::Failed);
    assert_eq!(stubborn.attempts, 3);
    assert_eq!(stubborn.error_kind(), Some(ErrorKind::ExecutionError));
    assert!(
        stubborn
            .error
            .as_ref()
            .is_some_and(|e| e.message.contains("attempt 3"))
    );
    assert_eq!(flaky.calls(), 3);

    let times = flaky.call_times();
    assert!(times[1] - times[0] >= Duration::from_millis(10));
    assert!(times[2] - times[1] >= Duration::from_millis(20));

    let delays: Vec<Duration> = handler
        .events_for("stubborn")
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::TaskRetrying { delay, .. } => Some(delay),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[tokio::test]
async fn test_flaky_task_succeeds_on_later_attempt() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(Task::builder("flaky", FlakyWork::new(2)).retries(3).build())
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let flaky = result(&report, "flaky");
    assert_eq!(flaky.status, TaskStatus::Success);
    assert_eq!(flaky.attempts, 3);
    assert_eq!(flaky.output, Some(json!({"attempt": 3})));
    assert!(flaky.error.is_none());
}

#[tokio::test]
async fn test_single_attempt_is_not_retried() {
    let flaky = FlakyWork::always_failing();
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(Task::builder("once", flaky.clone()).retries(1).build())
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(result(&report, "once").attempts, 1);
    assert_eq!(flaky.calls(), 1);
}

#[tokio::test]
async fn test_timeout_fails_after_exhausting_attempts() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(
            Task::builder("sluggish", SlowWork::new(Duration::from_secs(5)))
                .timeout(Duration::from_millis(20))
                .retries(2)
                .build(),
        )
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let sluggish = result(&report, "sluggish");
    assert_eq!(sluggish.status, TaskStatus::Failed);
    assert_eq!(sluggish.attempts, 2);
    assert_eq!(sluggish.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(
        sluggish.error.as_ref().map(|e| e.message.as_str()),
        Some("timed out after 20ms")
    );
    assert!(report.duration() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_timed_out_attempt_can_be_followed_by_success() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(
            Task::builder(
                "warmup",
                work::from_fn(|ctx: AttemptContext| async move {
                    if ctx.attempt == 1 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, WorkError>(ctx.attempt)
                }),
            )
            .timeout(Duration::from_millis(20))
            .retries(2)
            .build(),
        )
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let warmup = result(&report, "warmup");
    assert_eq!(warmup.status, TaskStatus::Success);
    assert_eq!(warmup.attempts, 2);
    assert_eq!(warmup.output, Some(json!(2)));
}

#[tokio::test]
async fn test_dependency_skips_are_not_retried() {
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let mut orchestrator = Orchestrator::new(fast_config()).with_event_bus(bus);
    orchestrator
        .register_many(vec![
            Task::builder("root", FlakyWork::always_failing())
                .retries(2)
                .build(),
            Task::builder("leaf", work::value(json!(1)))
                .depends_on("root")
                .retries(5)
                .build(),
        ])
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(result(&report, "leaf").attempts, 0);
    let leaf_events = handler.events_for("leaf").await;
    assert_eq!(leaf_events.len(), 1);
    assert!(matches!(leaf_events[0], Event::TaskSkipped { .. }));
}
