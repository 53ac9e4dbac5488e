//! External command work item.
//!
//! [`CommandWork`] runs a program as a child process and reports its
//! captured output. It is the work item behind `type: command` entries in
//! batch files.
//!
//! ```rust
//! use conductor::{CommandWork, Task};
//! use std::time::Duration;
//!
//! let task = Task::builder(
//!     "extract",
//!     CommandWork::builder("pg_dump")
//!         .args(["--format", "custom", "analytics"])
//!         .env("PGHOST", "db.internal")
//!         .build(),
//! )
//! .timeout(Duration::from_secs(300))
//! .build();
//! ```
//!
//! # Output
//!
//! On exit code 0 the task output is an object with `stdout`, `stderr` and
//! `exit_code`. A non-zero exit is reported as
//! [`WorkError::CommandFailed`] carrying the code and stderr.
//!
//! # Timeouts
//!
//! The child is spawned with `kill_on_drop`, so when the executor abandons
//! a timed-out attempt the process is killed rather than left running.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::core::task::{AttemptContext, WorkError, WorkItem};

/// A work item that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandWork {
    /// Program to execute
    program: String,
    /// Command arguments
    args: Vec<String>,
    /// Environment variables
    env: BTreeMap<String, String>,
    /// Working directory
    working_dir: Option<PathBuf>,
    /// Display string, "program arg1 arg2"
    description: String,
}

impl CommandWork {
    /// Create a new builder for a command work item.
    pub fn builder(program: impl Into<String>) -> CommandWorkBuilder {
        CommandWorkBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }
}

#[async_trait]
impl WorkItem for CommandWork {
    async fn run(&self, ctx: AttemptContext) -> Result<Value, WorkError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        cmd.env("CONDUCTOR_TASK_ID", ctx.task_id.as_str());
        cmd.env("CONDUCTOR_ATTEMPT", ctx.attempt.to_string());

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| WorkError::ExecutionFailed(format!("{}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            Ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": code,
            }))
        } else {
            Err(WorkError::CommandFailed { code, stderr })
        }
    }

    fn description(&self) -> Option<&str> {
        Some(&self.description)
    }
}

/// Builder for creating `CommandWork` instances.
#[derive(Debug, Clone)]
pub struct CommandWorkBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandWorkBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build the `CommandWork`.
    pub fn build(self) -> CommandWork {
        let description = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        CommandWork {
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            description,
        }
    }
}
