//! Batch file integration tests.
//!
//! Loads YAML batches from disk and runs them end to end, including real
//! child processes for command tasks.

use conductor::{
    ConfigError, DagError, DependencyMode, ErrorKind, FailurePolicy, Orchestrator,
    OrchestratorError, TaskStatus, YamlLoader, load_batch_file,
};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::common::result;

fn write_batch(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("batch.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[tokio::test]
async fn test_batch_file_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write_batch(
        &dir,
        r#"
max_concurrent: 2
on_failure: continue
backoff: { base_ms: 1, max_ms: 10 }
tasks:
  - id: setup
    name: Setup environment
    type: command
    command: sh
    args: ["-c", "echo ready"]
  - id: pause
    type: sleep
    millis: 10
    depends_on: [setup]
  - id: settings
    type: echo
    value:
      region: eu
      replicas: 2
    depends_on: [setup]
  - id: report
    type: command
    command: sh
    args: ["-c", "echo $GREETING from $CONDUCTOR_TASK_ID"]
    env:
      GREETING: hello
    depends_on: [pause, settings]
"#,
    );

    let (config, tasks) = load_batch_file(&path).unwrap();
    assert_eq!(config.max_concurrent, 2);
    assert_eq!(tasks.len(), 4);

    let mut orchestrator = Orchestrator::new(config);
    orchestrator.register_many(tasks).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert!(report.is_success(), "{}", report);
    let setup = result(&report, "setup").output.clone().unwrap();
    assert_eq!(setup["stdout"], "ready\n");
    assert_eq!(setup["exit_code"], 0);
    assert_eq!(
        result(&report, "settings").output,
        Some(serde_json::json!({"region": "eu", "replicas": 2}))
    );
    let output = result(&report, "report").output.clone().unwrap();
    assert_eq!(output["stdout"], "hello from report\n");
}

#[tokio::test]
async fn test_failing_command_reports_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = write_batch(
        &dir,
        r#"
on_failure: abort
tasks:
  - id: broken
    type: command
    command: sh
    args: ["-c", "echo oops >&2; exit 3"]
    retries: 1
  - id: after
    type: echo
    value: never
    depends_on: [broken]
"#,
    );

    let batch = YamlLoader::load_batch(&path).unwrap();
    assert_eq!(batch.config.on_failure, FailurePolicy::Abort);

    let mut orchestrator = Orchestrator::new(batch.config.clone());
    orchestrator.register_many(batch.build_tasks().unwrap()).unwrap();
    let report = orchestrator.run().await.unwrap();

    let broken = result(&report, "broken");
    assert_eq!(broken.status, TaskStatus::Failed);
    assert_eq!(broken.error_kind(), Some(ErrorKind::ExecutionError));
    let message = &broken.error.as_ref().unwrap().message;
    assert!(message.contains("code 3"), "{}", message);
    assert!(message.contains("oops"), "{}", message);

    assert_eq!(result(&report, "after").status, TaskStatus::Skipped);
    assert!(report.aborted());
}

#[test]
fn test_invalid_batches_are_rejected() {
    let dir = TempDir::new().unwrap();

    let zero_bound = write_batch(&dir, "max_concurrent: 0\ntasks:\n  - id: a\n    type: echo\n");
    assert!(matches!(
        YamlLoader::load_batch(&zero_bound),
        Err(ConfigError::InvalidConfig(_))
    ));

    let cycle = write_batch(
        &dir,
        "tasks:\n  - id: a\n    type: echo\n    depends_on: [b]\n  - id: b\n    type: echo\n    depends_on: [a]\n",
    );
    assert!(matches!(
        YamlLoader::load_batch(&cycle),
        Err(ConfigError::Dependency(DagError::CycleDetected(_)))
    ));

    let strict = write_batch(
        &dir,
        "dependency_mode: strict\ntasks:\n  - id: a\n    type: echo\n    depends_on: [ghost]\n",
    );
    assert!(matches!(
        YamlLoader::load_batch(&strict),
        Err(ConfigError::Dependency(DagError::UnknownDependency { .. }))
    ));

    let missing = dir.path().join("missing.yml");
    assert!(matches!(
        YamlLoader::load_batch(&missing),
        Err(ConfigError::FileReadError { .. })
    ));
}

#[tokio::test]
async fn test_strict_override_rejects_lenient_file_at_run() {
    let dir = TempDir::new().unwrap();
    let path = write_batch(
        &dir,
        "tasks:\n  - id: a\n    type: echo\n    depends_on: [ghost]\n",
    );

    let (config, tasks) = load_batch_file(&path).unwrap();
    assert_eq!(config.dependency_mode, DependencyMode::Lenient);

    let mut orchestrator = Orchestrator::new(config.with_dependency_mode(DependencyMode::Strict));
    orchestrator.register_many(tasks).unwrap();

    assert!(matches!(
        orchestrator.run().await,
        Err(OrchestratorError::Validation(DagError::UnknownDependency { .. }))
    ));
}
