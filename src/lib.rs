//! # Opsflow — Workflow Node Executors
//!
//! `opsflow` is the node-execution layer of a workflow engine for operations
//! platforms. A surrounding runner walks a workflow definition and hands each
//! node to the executor matching its declared type; this crate provides the
//! shared execution contract and the four built-in executors:
//!
//! - **Condition**: five evaluation strategies (expression, rule, comparison,
//!   business predicate, custom) producing a boolean plus a selected branch.
//!   All evaluation failures degrade to `false` rather than aborting the
//!   instance.
//! - **Approval**: a decision procedure over a named approver set with four
//!   modes (sequential, parallel, any, condition) and three conditional
//!   rules (any-manager, all-managers, level-based quota).
//! - **Notification**: fan-out to eight channels through the gateway, with
//!   asynchronous dispatch through an in-process queue by default and a
//!   multi-channel aggregate mode with per-channel failure isolation.
//! - **System**: generic side-effecting operations (HTTP, database, file,
//!   notification relay, integration, batch, script) with an optional
//!   timeout wrapper that yields a distinct TIMEOUT status.
//!
//! Downstream services are reached through the [`gateway::GatewayClient`]
//! trait; [`gateway::HttpGatewayClient`] is the provided HTTP implementation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opsflow::{
//!     GatewayConfig, HttpGatewayClient, NodeExecutionContext, NodeExecutorRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = Arc::new(HttpGatewayClient::new(GatewayConfig::default()));
//!     let registry = NodeExecutorRegistry::new(gateway);
//!
//!     let ctx = NodeExecutionContext::new(
//!         "WF-2024-001",
//!         "node-1",
//!         "amount check",
//!         serde_json::json!({
//!             "conditionType": "rule",
//!             "rule": "amount.greater.1000",
//!             "trueBranch": "approve",
//!             "falseBranch": "reject",
//!         }),
//!     );
//!     ctx.insert_execution_data("amount", serde_json::json!(2500));
//!
//!     let executor = registry.get("condition").unwrap();
//!     let result = executor.execute(&ctx).await;
//!     println!("{:?}", result.status);
//! }
//! ```

pub mod context;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod nodes;

pub use context::{ExecutionStatus, NodeExecutionContext, NodeExecutionResult};
pub use error::{NodeError, NodeResult};
pub use gateway::{
    DegradedDecisionPolicy, GatewayClient, GatewayConfig, HttpGatewayClient, Method,
    ServiceTarget,
};
pub use nodes::{
    ApprovalExecutor, ConditionExecutor, NodeExecutor, NodeExecutorRegistry,
    NotificationExecutor, SystemExecutor,
};
