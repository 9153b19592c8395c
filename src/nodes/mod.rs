//! Node executors and their registry.
//!
//! The workflow runner resolves the executor matching a node's declared
//! type and calls it with a [`NodeExecutionContext`]; a well-formed
//! [`NodeExecutionResult`] always comes back. Executors are stateless and
//! reentrant: nodes of one instance run sequentially, but many instances
//! may call into the same executor set concurrently.

pub mod approval;
pub mod condition;
pub mod notification;
pub mod system;

pub use approval::{ApprovalExecutor, Approver};
pub use condition::ConditionExecutor;
pub use notification::NotificationExecutor;
pub use system::SystemExecutor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{NodeExecutionContext, NodeExecutionResult};
use crate::gateway::GatewayClient;

/// Trait for node execution. Each node type implements this.
///
/// `execute` cannot fail: the reliability contract of the subsystem is that
/// no executor lets an error escape — misconfiguration and downstream
/// failures become `FAILURE` (or `TIMEOUT`) results instead.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, ctx: &NodeExecutionContext) -> NodeExecutionResult;

    /// Node type tag this executor is registered under.
    fn node_type(&self) -> &str;
}

/// Registry of node executors by node type string.
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    /// Build a registry with the four built-in executors wired to the given
    /// gateway. Must be called within a Tokio runtime (the notification
    /// executor spawns its queue worker).
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        let mut registry = NodeExecutorRegistry {
            executors: HashMap::new(),
        };
        registry.register(Box::new(ConditionExecutor::new(gateway.clone())));
        registry.register(Box::new(ApprovalExecutor::new(gateway.clone())));
        registry.register(Box::new(NotificationExecutor::new(gateway.clone())));
        registry.register(Box::new(SystemExecutor::new(gateway)));
        registry
    }

    pub fn register(&mut self, executor: Box<dyn NodeExecutor>) {
        self.executors
            .insert(executor.node_type().to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<&dyn NodeExecutor> {
        self.executors.get(node_type).map(|e| e.as_ref())
    }
}
