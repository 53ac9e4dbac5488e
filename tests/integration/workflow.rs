//! Complete workflow integration tests.
//!
//! Tests that verify a run from task registration to the final report.

use conductor::testing::{RecordingHandler, SlowWork};
use conductor::{
    AttemptContext, Event, EventBus, Orchestrator, OrchestratorError, RegistryError, Task,
    TaskStatus, WorkError, work,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{fast_config, instant, result};

#[tokio::test]
async fn test_pipeline_passes_through_dependency_order() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register_many(vec![
            Task::builder(
                "extract",
                work::from_fn(|_ctx: AttemptContext| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, WorkError>(vec![1, 2, 3])
                }),
            )
            .name("Extract rows")
            .build(),
            Task::builder("transform", SlowWork::new(Duration::from_millis(5)).with_output(6))
                .depends_on("extract")
                .build(),
            Task::builder("load", work::value(json!({"loaded": true})))
                .depends_on("transform")
                .build(),
        ])
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert!(report.is_success());
    let extract = result(&report, "extract");
    let transform = result(&report, "transform");
    let load = result(&report, "load");
    assert!(extract.completed_at <= transform.started_at);
    assert!(transform.completed_at <= load.started_at);
    assert_eq!(extract.output, Some(json!([1, 2, 3])));
    assert_eq!(transform.output, Some(json!(6)));
    assert_eq!(load.attempts, 1);
}

#[tokio::test]
async fn test_independent_tasks_do_not_wait_for_each_other() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register_many(vec![
            Task::builder("slow", SlowWork::new(Duration::from_millis(100))).build(),
            instant("fast"),
        ])
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let slow = result(&report, "slow");
    let fast = result(&report, "fast");
    assert!(fast.completed_at < slow.completed_at);
}

#[tokio::test]
async fn test_blocking_work_runs_on_pool() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(
            Task::builder(
                "checksum",
                work::blocking(|ctx: AttemptContext| {
                    std::thread::sleep(Duration::from_millis(5));
                    Ok::<_, WorkError>(format!("{}:{}", ctx.task_id, ctx.attempt))
                }),
            )
            .build(),
        )
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(result(&report, "checksum").output, Some(json!("checksum:1")));
}

#[tokio::test]
async fn test_unknown_dependency_is_satisfied_in_lenient_mode() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(
            Task::builder("orphan", work::value(json!(1)))
                .depends_on("never-registered")
                .build(),
        )
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(result(&report, "orphan").status, TaskStatus::Success);
}

#[tokio::test]
async fn test_cycle_rejected_at_registration() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register(Task::builder("a", work::value(json!(1))).depends_on("b").build())
        .unwrap();

    let err = orchestrator
        .register(Task::builder("b", work::value(json!(2))).depends_on("a").build())
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Registry(RegistryError::Cycle(_))
    ));
    assert_eq!(orchestrator.registry().len(), 1);

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.summary().total, 1);
}

#[tokio::test]
async fn test_results_are_stable_after_run() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register_many(vec![
            instant("a"),
            Task::builder("b", work::value(json!(2))).depends_on("a").build(),
        ])
        .unwrap();

    let report = orchestrator.run().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(orchestrator.registry().snapshots(), report.results());
    assert!(report.results().iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn test_events_follow_task_lifecycle() {
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let mut orchestrator = Orchestrator::new(fast_config()).with_event_bus(bus);
    orchestrator
        .register_many(vec![
            instant("first"),
            Task::builder("second", work::value(json!(2)))
                .depends_on("first")
                .build(),
        ])
        .unwrap();

    orchestrator.run().await.unwrap();

    let first = handler.events_for("first").await;
    assert!(matches!(first[0], Event::TaskStarted { .. }));
    assert!(matches!(first[1], Event::TaskSucceeded { attempts: 1, .. }));
    assert_eq!(first.len(), 2);

    let events = handler.events().await;
    let first_done = events
        .iter()
        .position(|e| matches!(e, Event::TaskSucceeded { task_id, .. } if task_id.as_str() == "first"))
        .unwrap();
    let second_started = events
        .iter()
        .position(|e| matches!(e, Event::TaskStarted { task_id, .. } if task_id.as_str() == "second"))
        .unwrap();
    assert!(first_done < second_started);
    assert!(matches!(events.last(), Some(Event::RunCompleted { success: true, .. })));
}

#[tokio::test]
async fn test_report_renders_text_and_json() {
    let mut orchestrator = Orchestrator::new(fast_config());
    orchestrator
        .register_many(vec![instant("alpha"), instant("beta")])
        .unwrap();

    let report = orchestrator.run().await.unwrap();

    let text = report.to_string();
    assert!(text.contains("Total Tasks:    2"));
    assert!(text.contains("Success:        2 (100.0%)"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["summary"]["succeeded"], 2);
    assert_eq!(json["summary"]["aborted"], false);
    assert_eq!(json["results"]["alpha"]["output"], "alpha");
    assert_eq!(json["results"]["beta"]["attempts"], 1);
}
