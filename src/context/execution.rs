use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Execution data accumulated across one workflow instance.
///
/// The map is shared by reference between every node of the instance. Nodes
/// only ever insert; writes are last-writer-wins. The runner executes nodes
/// of one instance strictly sequentially, so the lock is uncontended within
/// an instance — it exists because distinct instances may run concurrently
/// on the same executor set.
pub type ExecutionData = Arc<RwLock<Map<String, Value>>>;

/// Per-node-call bundle supplied by the workflow runner.
///
/// Read-only to executors apart from [`insert_execution_data`], which is the
/// only mutation the contract permits.
///
/// [`insert_execution_data`]: NodeExecutionContext::insert_execution_data
#[derive(Debug, Clone)]
pub struct NodeExecutionContext {
    /// Workflow instance id
    pub instance_id: String,

    /// Node id within the workflow definition
    pub node_id: String,

    /// Human-readable node name
    pub node_name: String,

    /// Node-type configuration; shape is defined per node type
    pub config: Value,

    /// Shared execution data for the whole instance
    pub execution_data: ExecutionData,

    /// Caller user id, if the invocation carries one
    pub user_id: Option<i64>,

    /// Tenant id, if the invocation carries one
    pub tenant_id: Option<i64>,
}

impl NodeExecutionContext {
    pub fn new(
        instance_id: impl Into<String>,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        config: Value,
    ) -> Self {
        NodeExecutionContext {
            instance_id: instance_id.into(),
            node_id: node_id.into(),
            node_name: node_name.into(),
            config,
            execution_data: Arc::new(RwLock::new(Map::new())),
            user_id: None,
            tenant_id: None,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Attach an existing execution-data map, shared with prior nodes of the
    /// same instance.
    pub fn with_execution_data(mut self, data: ExecutionData) -> Self {
        self.execution_data = data;
        self
    }

    /// Insert a key into the shared execution data. Last writer wins.
    pub fn insert_execution_data(&self, key: impl Into<String>, value: Value) {
        self.execution_data.write().insert(key.into(), value);
    }

    /// Look up a single execution-data key.
    pub fn execution_value(&self, key: &str) -> Option<Value> {
        self.execution_data.read().get(key).cloned()
    }

    /// Snapshot of the execution data, for embedding into outbound payloads.
    pub fn execution_snapshot(&self) -> Map<String, Value> {
        self.execution_data.read().clone()
    }

    /// Expression scope: execution data plus the identity of this call.
    pub fn scope(&self) -> Map<String, Value> {
        let mut scope = self.execution_snapshot();
        scope.insert("instanceId".into(), Value::String(self.instance_id.clone()));
        scope.insert("nodeId".into(), Value::String(self.node_id.clone()));
        scope.insert(
            "userId".into(),
            self.user_id.map_or(Value::Null, Value::from),
        );
        scope.insert(
            "tenantId".into(),
            self.tenant_id.map_or(Value::Null, Value::from),
        );
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_data_is_shared_across_contexts() {
        let first = NodeExecutionContext::new("wf-1", "n1", "first", Value::Null);
        let second = NodeExecutionContext::new("wf-1", "n2", "second", Value::Null)
            .with_execution_data(first.execution_data.clone());

        first.insert_execution_data("amount", json!(120));
        assert_eq!(second.execution_value("amount"), Some(json!(120)));
    }

    #[test]
    fn last_writer_wins() {
        let ctx = NodeExecutionContext::new("wf-1", "n1", "node", Value::Null);
        ctx.insert_execution_data("k", json!(1));
        ctx.insert_execution_data("k", json!(2));
        assert_eq!(ctx.execution_value("k"), Some(json!(2)));
    }

    #[test]
    fn scope_injects_call_identity() {
        let ctx = NodeExecutionContext::new("wf-1", "n1", "node", Value::Null).with_user(42);
        ctx.insert_execution_data("dept", json!("ops"));

        let scope = ctx.scope();
        assert_eq!(scope.get("instanceId"), Some(&json!("wf-1")));
        assert_eq!(scope.get("userId"), Some(&json!(42)));
        assert_eq!(scope.get("tenantId"), Some(&Value::Null));
        assert_eq!(scope.get("dept"), Some(&json!("ops")));
    }
}
