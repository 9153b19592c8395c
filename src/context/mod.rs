//! Executor-facing contracts owned by the workflow runner.
//!
//! - [`NodeExecutionContext`] — per-node-call input bundle.
//! - [`NodeExecutionResult`] / [`ExecutionStatus`] — the terminal outcome.

pub mod execution;
pub mod result;

pub use execution::{ExecutionData, NodeExecutionContext};
pub use result::{ExecutionStatus, NodeExecutionResult};
