//! Downstream gateway contracts.
//!
//! Executors never talk to delivery channels or business services directly;
//! every side effect goes through a [`GatewayClient`] addressed by a logical
//! service target and path, with JSON request/response bodies. The trait is
//! the seam tests mock and deployments wire to their transport.

pub mod approval;
pub mod http;
pub mod predicates;

pub use approval::{ApprovalGateway, ApprovalTask, DegradedDecisionPolicy};
pub use http::{GatewayConfig, HttpGatewayClient};
pub use predicates::BusinessPredicateClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeResult;

/// Logical downstream service a call is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceTarget {
    /// Shared platform services: permissions, areas, approval decisions,
    /// notification channels, generic system operations.
    Common,
    /// Device-communication service.
    Device,
    /// OA service owning approval task records.
    Oa,
}

/// Request method, transport-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A blocking (from the executor's perspective) call to a downstream
/// service. Implementations return the envelope's `data` payload on
/// success and a gateway error otherwise.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn call(
        &self,
        service: ServiceTarget,
        method: Method,
        path: &str,
        body: Value,
    ) -> NodeResult<Value>;
}
