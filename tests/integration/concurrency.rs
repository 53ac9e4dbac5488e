//! Concurrency bound and scheduling order tests.

use conductor::testing::{ConcurrencyProbe, TestHarness};
use conductor::{Task, TaskId};
use std::time::Duration;

#[tokio::test]
async fn test_running_tasks_never_exceed_bound() {
    let probe = ConcurrencyProbe::new();
    let tasks = (0..10)
        .map(|i| Task::builder(format!("job-{}", i), probe.work(Duration::from_millis(20))).build())
        .collect();

    let report = TestHarness::new()
        .with_concurrency(3)
        .execute_and_assert_success(tasks)
        .await;

    assert_eq!(report.summary().succeeded, 10);
    assert_eq!(report.summary().max_concurrent, 3);
    assert!(probe.max_observed() <= 3);
    assert!(probe.max_observed() >= 2, "tasks should overlap");
    assert_eq!(probe.active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bound_holds_on_multi_thread_runtime() {
    let probe = ConcurrencyProbe::new();
    let tasks = (0..12)
        .map(|i| Task::builder(format!("job-{}", i), probe.work(Duration::from_millis(10))).build())
        .collect();

    TestHarness::new()
        .with_concurrency(2)
        .execute_and_assert_success(tasks)
        .await;

    assert!(probe.max_observed() <= 2);
    assert_eq!(probe.started().len(), 12);
}

#[tokio::test]
async fn test_priority_orders_slot_acquisition() {
    let probe = ConcurrencyProbe::new();
    let work = || probe.work(Duration::from_millis(5));
    let tasks = vec![
        Task::builder("low", work()).priority(0).build(),
        Task::builder("high", work()).priority(10).build(),
        Task::builder("mid", work()).priority(5).build(),
        Task::builder("mid-later", work()).priority(5).build(),
    ];

    TestHarness::new()
        .with_concurrency(1)
        .execute_and_assert_success(tasks)
        .await;

    let order: Vec<TaskId> = probe.started();
    let names: Vec<&str> = order.iter().map(|id| id.as_str()).collect();
    assert_eq!(names, vec!["high", "mid", "mid-later", "low"]);
}

#[tokio::test]
async fn test_waiting_on_dependencies_holds_no_slot() {
    let probe = ConcurrencyProbe::new();
    let tasks = vec![
        Task::builder("down", probe.work(Duration::from_millis(1)))
            .depends_on("up")
            .priority(100)
            .build(),
        Task::builder("up", probe.work(Duration::from_millis(20))).build(),
    ];

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        TestHarness::new()
            .with_concurrency(1)
            .execute_and_assert_success(tasks),
    )
    .await
    .expect("run should not deadlock");

    assert_eq!(report.summary().succeeded, 2);
    let names: Vec<TaskId> = probe.started();
    assert_eq!(names, vec![TaskId::new("up"), TaskId::new("down")]);
}
