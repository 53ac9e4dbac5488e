//! Failure policy integration tests.
//!
//! Covers the diamond A -> (B, C) -> D under both policies and the abort
//! flag's effect on work that has not started yet.

use conductor::testing::{FlakyWork, SlowWork, TestHarness};
use conductor::{ErrorKind, FailurePolicy, Task, TaskStatus, work};
use serde_json::json;
use std::time::Duration;

use crate::common::{instant, result};

fn diamond(a: Task, b: Task) -> Vec<Task> {
    vec![
        a,
        b,
        Task::builder("C", SlowWork::new(Duration::from_millis(20)).with_output("c"))
            .depends_on("A")
            .build(),
        Task::builder("D", work::value(json!("d")))
            .depends_on_all(["B", "C"])
            .build(),
    ]
}

fn failing(id: &str) -> Task {
    Task::builder(id, FlakyWork::always_failing())
        .retries(1)
        .build()
}

#[tokio::test]
async fn test_diamond_continue_skips_only_dependents() {
    let tasks = diamond(
        instant("A"),
        Task::builder("B", FlakyWork::always_failing())
            .depends_on("A")
            .retries(1)
            .build(),
    );

    let report = TestHarness::new()
        .with_policy(FailurePolicy::Continue)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "A").status, TaskStatus::Success);
    assert_eq!(result(&report, "B").status, TaskStatus::Failed);
    assert_eq!(result(&report, "C").status, TaskStatus::Success);

    let d = result(&report, "D");
    assert_eq!(d.status, TaskStatus::Skipped);
    assert_eq!(d.error_kind(), Some(ErrorKind::DependencyFailure));
    assert_eq!(d.attempts, 0);
    assert!(!report.aborted());

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task_id.as_str(), "B");
}

#[tokio::test]
async fn test_diamond_abort_skips_everything_downstream() {
    let tasks = diamond(
        failing("A"),
        Task::builder("B", work::value(json!("b")))
            .depends_on("A")
            .build(),
    );

    let report = TestHarness::new()
        .with_policy(FailurePolicy::Abort)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "A").status, TaskStatus::Failed);
    assert_eq!(
        result(&report, "A").error_kind(),
        Some(ErrorKind::ExecutionError)
    );
    for id in ["B", "C", "D"] {
        let skipped = result(&report, id);
        assert_eq!(skipped.status, TaskStatus::Skipped, "task {}", id);
        assert!(skipped.output.is_none());
    }
    assert!(report.aborted());

    let summary = report.summary();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 3);
    assert!(summary.aborted);
}

#[tokio::test]
async fn test_abort_stops_queued_independent_work() {
    let tasks = vec![
        instant("later-1"),
        instant("later-2"),
        Task::builder("breaks", FlakyWork::always_failing())
            .retries(1)
            .priority(10)
            .build(),
    ];

    let report = TestHarness::new()
        .with_concurrency(1)
        .with_policy(FailurePolicy::Abort)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "breaks").status, TaskStatus::Failed);
    for id in ["later-1", "later-2"] {
        let skipped = result(&report, id);
        assert_eq!(skipped.status, TaskStatus::Skipped);
        assert_eq!(
            skipped.error_kind(),
            Some(ErrorKind::OrchestrationAborted)
        );
    }
    assert!(report.aborted());
}

#[tokio::test]
async fn test_continue_lets_independent_work_finish() {
    let tasks = vec![
        instant("later-1"),
        instant("later-2"),
        Task::builder("breaks", FlakyWork::always_failing())
            .retries(1)
            .priority(10)
            .build(),
    ];

    let report = TestHarness::new()
        .with_concurrency(1)
        .with_policy(FailurePolicy::Continue)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "later-1").status, TaskStatus::Success);
    assert_eq!(result(&report, "later-2").status, TaskStatus::Success);
    assert!(!report.aborted());
}

#[tokio::test]
async fn test_abort_does_not_preempt_running_work() {
    let tasks = vec![
        Task::builder("long", SlowWork::new(Duration::from_millis(50)).with_output("done")).build(),
        failing("quick"),
        Task::builder("waiting", work::value(json!(1)))
            .depends_on("long")
            .build(),
    ];

    let report = TestHarness::new()
        .with_policy(FailurePolicy::Abort)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "long").status, TaskStatus::Success);
    assert_eq!(result(&report, "quick").status, TaskStatus::Failed);

    let waiting = result(&report, "waiting");
    assert_eq!(waiting.status, TaskStatus::Skipped);
    assert_eq!(
        waiting.error_kind(),
        Some(ErrorKind::OrchestrationAborted)
    );
}

#[tokio::test]
async fn test_failed_dependency_skips_before_slow_sibling_finishes() {
    let tasks = vec![
        Task::builder("C", SlowWork::new(Duration::from_millis(400)).with_output("c")).build(),
        failing("B"),
        Task::builder("D", work::value(json!("d")))
            .depends_on_all(["C", "B"])
            .build(),
    ];

    let report = TestHarness::new()
        .with_policy(FailurePolicy::Continue)
        .execute_and_assert_failure(tasks)
        .await;

    assert_eq!(result(&report, "C").status, TaskStatus::Success);
    let d = result(&report, "D");
    assert_eq!(d.status, TaskStatus::Skipped);
    assert_eq!(d.error_kind(), Some(ErrorKind::DependencyFailure));

    let c_done = result(&report, "C").completed_at.unwrap();
    let d_done = d.completed_at.unwrap();
    assert!(d_done < c_done, "D should finish while C is still running");
}

#[tokio::test]
async fn test_abort_releases_dependents_of_running_work() {
    let tasks = vec![
        Task::builder("slow", SlowWork::new(Duration::from_millis(400)).with_output("s")).build(),
        failing("quick"),
        Task::builder("after-slow", work::value(json!(1)))
            .depends_on("slow")
            .build(),
    ];

    let report = TestHarness::new()
        .with_policy(FailurePolicy::Abort)
        .execute_and_assert_failure(tasks)
        .await;

    let after = result(&report, "after-slow");
    assert_eq!(after.status, TaskStatus::Skipped);
    assert_eq!(after.error_kind(), Some(ErrorKind::OrchestrationAborted));
    assert!(after.completed_at.unwrap() < result(&report, "slow").completed_at.unwrap());
}
