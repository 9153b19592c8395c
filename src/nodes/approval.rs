//! Approval node executor.
//!
//! A state machine over a set of named approvers with four approval modes
//! (sequential, parallel, any, conditional) and three conditional sub-rules
//! (any-manager, all-managers, level-based quota). Individual decisions come
//! from the approval gateway; a per-approver failure is that approver's
//! rejection, never a node-level crash.
//!
//! Approvers are held in an `IndexMap`, so sequential mode iterates in the
//! order the approver object was written in the node configuration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::context::{NodeExecutionContext, NodeExecutionResult};
use crate::error::{NodeError, NodeResult};
use crate::gateway::{ApprovalGateway, ApprovalTask, DegradedDecisionPolicy, GatewayClient};
use crate::nodes::NodeExecutor;

/// One approver entry from the node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Approver {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub required: bool,
    /// Extra attributes forwarded untouched to the approval gateway.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Approver {
    pub fn is_manager(&self) -> bool {
        matches!(self.role.as_deref(), Some("manager" | "admin"))
    }

    /// Level weight for the level-based quota; unset levels count as 1.
    pub fn effective_level(&self) -> i64 {
        self.level.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApprovalMode {
    Sequential,
    Parallel,
    Any,
    Conditional,
}

impl ApprovalMode {
    /// Sequential is the default for missing and unknown tags.
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("parallel") => ApprovalMode::Parallel,
            Some("any") => ApprovalMode::Any,
            Some("condition") => ApprovalMode::Conditional,
            _ => ApprovalMode::Sequential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApprovalRule {
    AnyManager,
    AllManagers,
    LevelBased,
}

impl ApprovalRule {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "any_manager" => Some(ApprovalRule::AnyManager),
            "all_managers" => Some(ApprovalRule::AllManagers),
            "level_based" => Some(ApprovalRule::LevelBased),
            _ => None,
        }
    }
}

const DEFAULT_TIMEOUT_HOURS: i64 = 168;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalConfig {
    #[serde(default)]
    approval_type: Option<String>,
    #[serde(default)]
    approval_mode: Option<String>,
    #[serde(default)]
    approvers: IndexMap<String, Approver>,
    #[serde(default)]
    approval_rule: Option<String>,
    #[serde(default)]
    required_level: Option<i64>,
    #[serde(default)]
    business_type: Option<String>,
    #[serde(default)]
    approval_reason: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    timeout_hours: Option<i64>,
}

/// Approval node executor.
pub struct ApprovalExecutor {
    gateway: ApprovalGateway,
}

impl ApprovalExecutor {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        ApprovalExecutor {
            gateway: ApprovalGateway::new(gateway),
        }
    }

    /// Select the stand-in decision policy used when the approval gateway
    /// is unreachable.
    pub fn with_degraded_policy(mut self, policy: DegradedDecisionPolicy) -> Self {
        self.gateway = self.gateway.with_degraded_policy(policy);
        self
    }

    async fn run(&self, ctx: &NodeExecutionContext, cfg: &ApprovalConfig) -> NodeExecutionResult {
        if cfg.approvers.is_empty() {
            return NodeExecutionResult::failure("approver list is empty");
        }

        let mode = ApprovalMode::parse(cfg.approval_mode.as_deref());
        let task = build_task(ctx, cfg);
        let task_id = self.gateway.create_task(ctx, &task).await;
        ctx.insert_execution_data("approvalTaskId", Value::String(task_id.clone()));

        match mode {
            ApprovalMode::Sequential => self.sequential(ctx, cfg, &task_id).await,
            ApprovalMode::Parallel => self.parallel(ctx, cfg, &task_id).await,
            ApprovalMode::Any => self.any(ctx, cfg, &task_id).await,
            ApprovalMode::Conditional => self.conditional(ctx, cfg, &task_id).await,
        }
    }

    /// Iterate approvers in configuration order; the first rejection
    /// short-circuits and later approvers are never contacted.
    async fn sequential(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        for (approver_id, approver) in &cfg.approvers {
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            record_decision(ctx, approver_id, approver, approved);
            if !approved {
                return NodeExecutionResult::failure(format!(
                    "approval rejected by {approver_id}"
                ));
            }
        }

        NodeExecutionResult::success(output(&[
            ("approvalTaskId", json!(task_id)),
            ("approvalMode", json!("sequential")),
            ("totalApprovers", json!(cfg.approvers.len())),
        ]))
    }

    /// Fan out every decision concurrently, then require all to approve.
    /// No short-circuit: the aggregate is order-independent.
    async fn parallel(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        let decisions = join_all(cfg.approvers.iter().map(|(approver_id, approver)| async move {
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            (approver_id, approver, approved)
        }))
        .await;

        let total_count = decisions.len();
        let mut approved_count = 0;
        for (approver_id, approver, approved) in decisions {
            record_decision(ctx, approver_id, approver, approved);
            if approved {
                approved_count += 1;
            }
        }

        if approved_count == total_count {
            NodeExecutionResult::success(output(&[
                ("approvalTaskId", json!(task_id)),
                ("approvalMode", json!("parallel")),
                ("approvedCount", json!(approved_count)),
                ("totalCount", json!(total_count)),
            ]))
        } else {
            NodeExecutionResult::failure(format!(
                "parallel approval not fully approved: {approved_count}/{total_count}"
            ))
        }
    }

    /// Iterate until the first approval; if nobody approves, fail.
    async fn any(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        for (approver_id, approver) in &cfg.approvers {
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            record_decision(ctx, approver_id, approver, approved);
            if approved {
                return NodeExecutionResult::success(output(&[
                    ("approvalTaskId", json!(task_id)),
                    ("approvalMode", json!("any")),
                    ("approvedBy", json!(approver_id)),
                    ("totalApprovers", json!(cfg.approvers.len())),
                ]));
            }
        }

        NodeExecutionResult::failure("all approvers rejected")
    }

    async fn conditional(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        let rule = cfg.approval_rule.as_deref().unwrap_or("").trim();
        match ApprovalRule::parse(rule) {
            Some(ApprovalRule::AnyManager) => self.any_manager(ctx, cfg, task_id).await,
            Some(ApprovalRule::AllManagers) => self.all_managers(ctx, cfg, task_id).await,
            Some(ApprovalRule::LevelBased) => self.level_based(ctx, cfg, task_id).await,
            // Blank or unknown rule falls back to sequential approval.
            None => self.sequential(ctx, cfg, task_id).await,
        }
    }

    /// First approval from a manager- or admin-role approver wins.
    async fn any_manager(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        for (approver_id, approver) in cfg.approvers.iter().filter(|(_, a)| a.is_manager()) {
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            record_decision(ctx, approver_id, approver, approved);
            if approved {
                return NodeExecutionResult::success(output(&[
                    ("approvalTaskId", json!(task_id)),
                    ("approvalMode", json!("conditional")),
                    ("approvalRule", json!("any_manager")),
                    ("approvedBy", json!(approver_id)),
                ]));
            }
        }

        NodeExecutionResult::failure("no manager approved")
    }

    /// Every manager/admin approver must approve, and at least one must
    /// exist.
    async fn all_managers(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        let mut manager_count = 0usize;
        let mut approved_count = 0usize;

        for (approver_id, approver) in cfg.approvers.iter().filter(|(_, a)| a.is_manager()) {
            manager_count += 1;
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            record_decision(ctx, approver_id, approver, approved);
            if approved {
                approved_count += 1;
            }
        }

        if manager_count > 0 && approved_count == manager_count {
            NodeExecutionResult::success(output(&[
                ("approvalTaskId", json!(task_id)),
                ("approvalMode", json!("conditional")),
                ("approvalRule", json!("all_managers")),
                ("approvedManagerCount", json!(approved_count)),
                ("totalManagerCount", json!(manager_count)),
            ]))
        } else {
            NodeExecutionResult::failure(format!(
                "managers did not all approve: {approved_count}/{manager_count}"
            ))
        }
    }

    /// Weighted quorum: the levels of approving approvers must sum to at
    /// least `requiredLevel` (default 1).
    async fn level_based(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ApprovalConfig,
        task_id: &str,
    ) -> NodeExecutionResult {
        let required_level = cfg.required_level.unwrap_or(1);
        let mut total_approved_level = 0i64;
        let mut approver_levels = Map::new();

        for (approver_id, approver) in &cfg.approvers {
            let approved = self.gateway.decide(ctx, task_id, approver_id, approver).await;
            record_decision(ctx, approver_id, approver, approved);
            if approved {
                total_approved_level += approver.effective_level();
                approver_levels.insert(approver_id.clone(), json!(approver.effective_level()));
            }
        }

        if total_approved_level >= required_level {
            NodeExecutionResult::success(output(&[
                ("approvalTaskId", json!(task_id)),
                ("approvalMode", json!("conditional")),
                ("approvalRule", json!("level_based")),
                ("requiredLevel", json!(required_level)),
                ("totalApprovedLevel", json!(total_approved_level)),
                ("approverLevels", Value::Object(approver_levels)),
            ]))
        } else {
            NodeExecutionResult::failure(format!(
                "approved level {total_approved_level} below required {required_level}"
            ))
        }
    }
}

/// Record one decision into the shared execution data so downstream nodes
/// can inspect the approval history.
fn record_decision(
    ctx: &NodeExecutionContext,
    approver_id: &str,
    approver: &Approver,
    approved: bool,
) {
    debug!(approver = approver_id, approved, "recording approval decision");
    ctx.insert_execution_data(
        format!("approval_{approver_id}"),
        json!({
            "status": if approved { "approved" } else { "rejected" },
            "approver": approver,
            "time": Utc::now(),
        }),
    );
}

fn build_task(ctx: &NodeExecutionContext, cfg: &ApprovalConfig) -> ApprovalTask {
    let business_type = cfg.business_type.as_deref().unwrap_or("general");
    let applicant = ctx
        .execution_value("applicantName")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown applicant".into());

    let mut description = format!(
        "instance: {}\nnode: {} ({})\n",
        ctx.instance_id, ctx.node_id, ctx.node_name
    );
    if let Some(reason) = &cfg.approval_reason {
        description.push_str(&format!("reason: {reason}\n"));
    }
    description.push_str(&format!("created: {}", Utc::now()));

    let now = Utc::now();
    ApprovalTask {
        task_id: format!("TASK-{}-{}", ctx.instance_id, ctx.node_id),
        instance_id: ctx.instance_id.clone(),
        node_id: ctx.node_id.clone(),
        node_name: ctx.node_name.clone(),
        approval_type: cfg.approval_type.clone(),
        approval_mode: cfg
            .approval_mode
            .clone()
            .unwrap_or_else(|| "sequential".into()),
        title: format!("[{business_type}] {applicant} - {}", ctx.node_name),
        description,
        applicants: serde_json::to_value(&cfg.approvers).unwrap_or(Value::Null),
        business_data: ctx.execution_snapshot(),
        priority: cfg.priority.clone().unwrap_or_else(|| "NORMAL".into()),
        create_time: now,
        timeout_time: timeout_deadline(now, cfg.timeout_hours),
    }
}

/// Deadline `hours` from `at`; out-of-range values fall back to the
/// default window instead of overflowing inside chrono.
fn timeout_deadline(at: chrono::DateTime<Utc>, hours: Option<i64>) -> chrono::DateTime<Utc> {
    let hours = match hours {
        Some(h) if h > 0 => h,
        Some(h) => {
            warn!(timeout_hours = h, "non-positive approval timeout, using default");
            DEFAULT_TIMEOUT_HOURS
        }
        None => DEFAULT_TIMEOUT_HOURS,
    };
    Duration::try_hours(hours)
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or_else(|| {
            warn!(timeout_hours = hours, "approval timeout out of range, using default");
            at + Duration::hours(DEFAULT_TIMEOUT_HOURS)
        })
}

fn output(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn parse_config(config: &Value) -> NodeResult<ApprovalConfig> {
    if !config.is_object() {
        return Err(NodeError::Config(
            "approval node configuration is empty".into(),
        ));
    }
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::Config(format!("invalid approval configuration: {e}")))
}

#[async_trait]
impl NodeExecutor for ApprovalExecutor {
    async fn execute(&self, ctx: &NodeExecutionContext) -> NodeExecutionResult {
        let begun = Utc::now();
        info!(
            instance_id = %ctx.instance_id,
            node_id = %ctx.node_id,
            "executing approval node {}", ctx.node_name
        );

        let cfg = match parse_config(&ctx.config) {
            Ok(cfg) => cfg,
            Err(e) => return NodeExecutionResult::failure(e.to_string()).started(begun),
        };

        let result = self.run(ctx, &cfg).await.started(begun);
        info!(
            instance_id = %ctx.instance_id,
            node_id = %ctx.node_id,
            status = ?result.status,
            duration_ms = result.duration_ms,
            "approval node finished"
        );
        result
    }

    fn node_type(&self) -> &str {
        "approval"
    }
}
