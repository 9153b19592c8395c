use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Terminal status of one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Success,
    Failure,
    /// A bounded wait elapsed before the underlying call finished. Callers
    /// apply a different retry policy than for `Failure`.
    Timeout,
}

/// Outcome of one node execution, consumed by the workflow runner.
///
/// Terminal once returned; the runner does not mutate it. Every executor
/// guarantees a well-formed result — no panic and no error ever crosses the
/// executor boundary.
#[derive(Debug, Clone, Serialize)]
pub struct NodeExecutionResult {
    pub status: ExecutionStatus,
    pub output: Map<String, Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl NodeExecutionResult {
    pub fn success(output: Map<String, Value>) -> Self {
        Self::build(ExecutionStatus::Success, output, None)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::build(ExecutionStatus::Failure, Map::new(), Some(message.into()))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::build(ExecutionStatus::Timeout, Map::new(), Some(message.into()))
    }

    fn build(status: ExecutionStatus, output: Map<String, Value>, error: Option<String>) -> Self {
        let now = Utc::now();
        NodeExecutionResult {
            status,
            output,
            error,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    /// Backdate the start timestamp to when the executor began and derive
    /// the duration from it.
    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = at;
        self.duration_ms = (self.finished_at - at).num_milliseconds();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
