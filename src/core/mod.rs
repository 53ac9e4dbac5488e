//! Core domain types: identifiers, task definitions, results, backoff and
//! dependency validation.

pub mod dag;
pub mod result;
pub mod retry;
pub mod task;
pub mod types;
pub mod work;
