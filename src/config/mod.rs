//! Configuration: run settings and YAML batch files.
//!
//! A batch file combines run-level settings with task definitions:
//!
//! ```yaml
//! max_concurrent: 4
//! on_failure: abort
//! backoff:
//!   base_ms: 500
//!   max_ms: 10000
//! tasks:
//!   - id: fetch
//!     type: command
//!     command: curl
//!     args: ["-sf", "https://example.com/data.json"]
//!     timeout_secs: 30
//!     retries: 5
//!   - id: settle
//!     type: sleep
//!     millis: 250
//!     depends_on: [fetch]
//! ```

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::{BatchBuilder, load_batch_file};
pub use error::ConfigError;
pub use types::{
    BatchFile, DEFAULT_MAX_CONCURRENT, DependencyMode, FailurePolicy, OrchestratorConfig,
    TaskConfig, WorkConfig,
};
pub use yaml::YamlLoader;
