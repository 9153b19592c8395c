use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::context::NodeExecutionContext;
use crate::gateway::{GatewayClient, Method, ServiceTarget};
use crate::nodes::approval::Approver;

/// Approval task record handed to the OA service. Ephemeral on this side:
/// created once per node execution, never updated in place.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalTask {
    pub task_id: String,
    pub instance_id: String,
    pub node_id: String,
    pub node_name: String,
    pub approval_type: Option<String>,
    pub approval_mode: String,
    pub title: String,
    pub description: String,
    pub applicants: Value,
    pub business_data: Map<String, Value>,
    pub priority: String,
    pub create_time: DateTime<Utc>,
    pub timeout_time: DateTime<Utc>,
}

/// Stand-in decision used when the approval gateway is unreachable.
///
/// This is a documented simulation policy, not a security-equivalent
/// decision. Production deployments should select [`Disabled`], which turns
/// gateway unavailability into a per-approver rejection.
///
/// [`Disabled`]: DegradedDecisionPolicy::Disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegradedDecisionPolicy {
    /// Approve iff the approver's declared role is `admin` or `manager`.
    #[default]
    RoleBased,
    /// Reject every approver.
    Disabled,
}

impl DegradedDecisionPolicy {
    pub fn decide(&self, approver: &Approver) -> bool {
        match self {
            DegradedDecisionPolicy::RoleBased => approver.is_manager(),
            DegradedDecisionPolicy::Disabled => false,
        }
    }
}

/// Adapter for the two approval-side effects: recording a task with the OA
/// service and obtaining per-approver decisions.
#[derive(Clone)]
pub struct ApprovalGateway {
    gateway: Arc<dyn GatewayClient>,
    degraded: DegradedDecisionPolicy,
}

impl ApprovalGateway {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        ApprovalGateway {
            gateway,
            degraded: DegradedDecisionPolicy::default(),
        }
    }

    pub fn with_degraded_policy(mut self, policy: DegradedDecisionPolicy) -> Self {
        self.degraded = policy;
        self
    }

    /// Record the approval task remotely, best-effort.
    ///
    /// Returns the id the rest of the node execution should use: the
    /// gateway-assigned id when the OA service supplies one, otherwise the
    /// locally derived id already on the task. A remote failure is logged
    /// and swallowed so the workflow is never blocked by this side effect.
    pub async fn create_task(&self, ctx: &NodeExecutionContext, task: &ApprovalTask) -> String {
        let body = json!({
            "approvalTask": task,
            "workflowInstanceId": ctx.instance_id,
            "workflowNodeId": ctx.node_id,
            "workflowNodeName": ctx.node_name,
        });

        match self
            .gateway
            .call(
                ServiceTarget::Oa,
                Method::Post,
                "/api/v1/approval/tasks/create",
                body,
            )
            .await
        {
            Ok(data) => match data.get("taskId").and_then(Value::as_str) {
                Some(remote_id) => remote_id.to_string(),
                None => task.task_id.clone(),
            },
            Err(e) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    "approval task creation failed, continuing with local id: {e}"
                );
                task.task_id.clone()
            }
        }
    }

    /// Obtain one approver's decision.
    ///
    /// Never errors: a gateway failure falls back to the configured
    /// degraded-mode policy, and a malformed response counts as a
    /// rejection.
    pub async fn decide(
        &self,
        ctx: &NodeExecutionContext,
        task_id: &str,
        approver_id: &str,
        approver: &Approver,
    ) -> bool {
        let body = json!({
            "approvalTaskId": task_id,
            "approverId": approver_id,
            "approverInfo": approver,
            "instanceId": ctx.instance_id,
            "nodeId": ctx.node_id,
            "executionData": ctx.execution_snapshot(),
            "userId": ctx.user_id,
            "tenantId": ctx.tenant_id,
        });

        match self
            .gateway
            .call(
                ServiceTarget::Common,
                Method::Post,
                "/api/v1/approval/process",
                body,
            )
            .await
        {
            Ok(data) => data.get("approved").and_then(Value::as_bool).unwrap_or(false),
            Err(e) => {
                let decision = self.degraded.decide(approver);
                tracing::warn!(
                    approver = approver_id,
                    decision,
                    "approval gateway unavailable, applying degraded policy: {e}"
                );
                decision
            }
        }
    }
}
