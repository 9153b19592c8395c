//! Error types for the node-execution engine.
//!
//! - [`NodeError`] — Errors raised by internal steps of a node executor.
//!
//! Executors never let a `NodeError` escape their `execute` boundary: every
//! error is either coerced into a `FAILURE`/`TIMEOUT` result, or — inside
//! condition evaluation — coerced to `false` via [`fail_closed`].

pub mod node_error;

pub use node_error::NodeError;

/// Convenience alias for node-level results.
pub type NodeResult<T> = Result<T, NodeError>;

/// Coerce an evaluation error to `false`, logging the cause.
///
/// Condition sub-paths fail closed: a misconfigured or erroring condition
/// must select the false branch instead of aborting the workflow instance.
pub fn fail_closed(what: &str, result: NodeResult<bool>) -> bool {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("{what} degraded to false: {e}");
            false
        }
    }
}
