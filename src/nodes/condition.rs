//! Condition node executor.
//!
//! Orchestrates five condition strategies (expression, rule, comparison,
//! business predicate, custom) and produces a boolean plus the selected
//! outgoing branch. No sub-path ever raises upward: adapter and parse
//! errors degrade to `false` with a logged warning, so a misconfigured
//! condition can never abort the workflow instance.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::{NodeExecutionContext, NodeExecutionResult};
use crate::error::{fail_closed, NodeError, NodeResult};
use crate::evaluator::operators::{as_number, compare, to_text, CompareOp};
use crate::evaluator::{evaluate_bool, in_time_range, lookup_field, resolve_operand};
use crate::evaluator::{Clock, SystemClock};
use crate::gateway::{BusinessPredicateClient, GatewayClient};
use crate::nodes::NodeExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionType {
    Expression,
    Rule,
    Comparison,
    Business,
    Custom,
}

impl ConditionType {
    /// Missing type defaults to `expression`; an unknown tag resolves to
    /// `None` and the node falls back to its configured default result.
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("expression") => Some(ConditionType::Expression),
            Some("rule") => Some(ConditionType::Rule),
            Some("comparison") => Some(ConditionType::Comparison),
            Some("business") => Some(ConditionType::Business),
            Some("custom") => Some(ConditionType::Custom),
            Some(_) => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Expression => "expression",
            ConditionType::Rule => "rule",
            ConditionType::Comparison => "comparison",
            ConditionType::Business => "business",
            ConditionType::Custom => "custom",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionConfig {
    #[serde(default)]
    condition_type: Option<String>,
    #[serde(default)]
    condition_expression: Option<String>,
    #[serde(default)]
    condition_rule: Option<String>,
    #[serde(default)]
    condition_value: Option<Value>,
    #[serde(default)]
    left_operand: Option<String>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    right_operand: Option<String>,
    #[serde(default)]
    custom_evaluator: Option<String>,
    #[serde(default)]
    custom_params: Option<Map<String, Value>>,
    #[serde(default)]
    true_branch: Option<String>,
    #[serde(default)]
    false_branch: Option<String>,
    #[serde(default)]
    default_result: bool,
}

/// Condition node executor.
pub struct ConditionExecutor {
    predicates: BusinessPredicateClient,
    clock: Arc<dyn Clock>,
}

impl ConditionExecutor {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        ConditionExecutor {
            predicates: BusinessPredicateClient::new(gateway),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source, for calendar-dependent predicates in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate the condition: boolean result plus the selected branch id,
    /// if the configuration names one for that direction.
    pub async fn evaluate(
        &self,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<(bool, Option<String>)> {
        let cfg = parse_config(&ctx.config)?;
        let result = self.evaluate_config(ctx, &cfg).await;
        Ok((result, selected_branch(&cfg, result).map(str::to_string)))
    }

    async fn evaluate_config(&self, ctx: &NodeExecutionContext, cfg: &ConditionConfig) -> bool {
        match ConditionType::parse(cfg.condition_type.as_deref()) {
            Some(ConditionType::Expression) => {
                fail_closed("expression condition", self.eval_expression(ctx, cfg))
            }
            Some(ConditionType::Rule) => fail_closed("rule condition", self.eval_rule(ctx, cfg)),
            Some(ConditionType::Comparison) => {
                fail_closed("comparison condition", self.eval_comparison(ctx, cfg))
            }
            Some(ConditionType::Business) => fail_closed(
                "business condition",
                self.eval_business(ctx, cfg).await,
            ),
            Some(ConditionType::Custom) => {
                fail_closed("custom condition", self.eval_custom(ctx, cfg))
            }
            None => {
                warn!(
                    condition_type = cfg.condition_type.as_deref().unwrap_or(""),
                    "unknown condition type, using default result {}", cfg.default_result
                );
                cfg.default_result
            }
        }
    }

    fn eval_expression(&self, ctx: &NodeExecutionContext, cfg: &ConditionConfig) -> NodeResult<bool> {
        let expression = cfg.condition_expression.as_deref().unwrap_or("").trim();
        // An absent expression is a non-fatal false, not an error.
        if expression.is_empty() {
            return Ok(false);
        }
        evaluate_bool(expression, &ctx.scope())
    }

    /// Rule strings have the exact shape `field.operator.value`. Malformed
    /// strings and null field values are `false`, never an error.
    fn eval_rule(&self, ctx: &NodeExecutionContext, cfg: &ConditionConfig) -> NodeResult<bool> {
        let rule = cfg.condition_rule.as_deref().unwrap_or("").trim();
        if rule.is_empty() {
            return Ok(false);
        }

        let parts: Vec<&str> = rule.split('.').collect();
        if parts.len() != 3 {
            warn!(rule, "rule is not of the form field.operator.value");
            return Ok(false);
        }
        let (field, op_tag, expected) = (parts[0], parts[1], parts[2]);

        let Some(op) = CompareOp::parse(op_tag) else {
            warn!(rule, operator = op_tag, "unknown rule operator");
            return Ok(false);
        };

        let data = ctx.execution_snapshot();
        let Some(actual) = lookup_field(&data, field) else {
            debug!(field, "rule field resolved to null");
            return Ok(false);
        };
        if actual.is_null() {
            return Ok(false);
        }

        compare(&actual, op, &Value::String(expected.to_string()))
    }

    fn eval_comparison(&self, ctx: &NodeExecutionContext, cfg: &ConditionConfig) -> NodeResult<bool> {
        let (Some(left), Some(op_tag), Some(right)) = (
            cfg.left_operand.as_deref(),
            cfg.operator.as_deref(),
            cfg.right_operand.as_deref(),
        ) else {
            return Ok(false);
        };

        let Some(op) = CompareOp::parse(op_tag) else {
            warn!(operator = op_tag, "unknown comparison operator");
            return Ok(false);
        };

        let data = ctx.execution_snapshot();
        let left = resolve_operand(&data, left);
        let right = resolve_operand(&data, right);
        compare(&left, op, &right)
    }

    async fn eval_business(
        &self,
        ctx: &NodeExecutionContext,
        cfg: &ConditionConfig,
    ) -> NodeResult<bool> {
        let rule = cfg.condition_rule.as_deref().unwrap_or("");
        let value = cfg.condition_value.as_ref();

        match rule {
            "user_permission" => self.check_user_permission(ctx, value).await,
            "device_status" => self.check_device_status(ctx, value).await,
            "area_access" => self.check_area_access(ctx, value).await,
            "time_range" => match value {
                Some(config) => in_time_range(self.clock.as_ref(), config),
                None => {
                    warn!("time range condition has no value");
                    Ok(false)
                }
            },
            "amount_limit" => check_amount_limit(ctx, value),
            other => {
                warn!(rule = other, "unknown business rule");
                Ok(false)
            }
        }
    }

    async fn check_user_permission(
        &self,
        ctx: &NodeExecutionContext,
        value: Option<&Value>,
    ) -> NodeResult<bool> {
        let permission = value.map(to_text).unwrap_or_default();
        let (Some(user_id), false) = (ctx.user_id, permission.trim().is_empty()) else {
            warn!("user permission check missing user id or permission");
            return Ok(false);
        };
        self.predicates.user_has_permission(user_id, &permission).await
    }

    async fn check_device_status(
        &self,
        ctx: &NodeExecutionContext,
        value: Option<&Value>,
    ) -> NodeResult<bool> {
        let device_id = ctx
            .execution_value("deviceId")
            .map(|v| to_text(&v))
            .unwrap_or_default();
        let expected = value.map(to_text).unwrap_or_default();
        if device_id.trim().is_empty() || expected.is_empty() {
            warn!("device status check missing device id or expected status");
            return Ok(false);
        }
        self.predicates
            .device_status_matches(&device_id, &expected)
            .await
    }

    async fn check_area_access(
        &self,
        ctx: &NodeExecutionContext,
        value: Option<&Value>,
    ) -> NodeResult<bool> {
        let area_id = ctx
            .execution_value("areaId")
            .map(|v| to_text(&v))
            .unwrap_or_default();
        let permission = value.map(to_text).unwrap_or_default();
        let (Some(user_id), false, false) = (
            ctx.user_id,
            area_id.trim().is_empty(),
            permission.is_empty(),
        ) else {
            warn!("area access check missing user id, area id, or permission");
            return Ok(false);
        };
        self.predicates
            .user_has_area_access(user_id, &area_id, &permission)
            .await
    }

    fn eval_custom(&self, ctx: &NodeExecutionContext, cfg: &ConditionConfig) -> NodeResult<bool> {
        let evaluator = cfg.custom_evaluator.as_deref().unwrap_or("").trim();
        if evaluator.is_empty() {
            warn!("custom condition has no evaluator expression");
            return Ok(false);
        }

        let mut scope = ctx.scope();
        if let Some(params) = &cfg.custom_params {
            for (key, value) in params {
                scope.insert(key.clone(), value.clone());
            }
        }
        evaluate_bool(evaluator, &scope)
    }
}

/// `amount` in the execution data must not exceed the configured limit.
fn check_amount_limit(ctx: &NodeExecutionContext, value: Option<&Value>) -> NodeResult<bool> {
    let (Some(amount), Some(limit)) = (ctx.execution_value("amount"), value) else {
        return Ok(false);
    };
    Ok(as_number(&amount)? <= as_number(limit)?)
}

/// Branch id for the computed direction; absent and blank ids are omitted.
fn selected_branch(cfg: &ConditionConfig, result: bool) -> Option<&str> {
    let branch = if result {
        cfg.true_branch.as_deref()
    } else {
        cfg.false_branch.as_deref()
    };
    branch.filter(|b| !b.trim().is_empty())
}

fn parse_config(config: &Value) -> NodeResult<ConditionConfig> {
    if !config.is_object() {
        return Err(NodeError::Config(
            "condition node configuration is empty".into(),
        ));
    }
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::Config(format!("invalid condition configuration: {e}")))
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn execute(&self, ctx: &NodeExecutionContext) -> NodeExecutionResult {
        let begun = Utc::now();
        info!(
            instance_id = %ctx.instance_id,
            node_id = %ctx.node_id,
            "executing condition node {}", ctx.node_name
        );

        let cfg = match parse_config(&ctx.config) {
            Ok(cfg) => cfg,
            Err(e) => return NodeExecutionResult::failure(e.to_string()).started(begun),
        };

        let result = self.evaluate_config(ctx, &cfg).await;
        let resolved_type = ConditionType::parse(cfg.condition_type.as_deref())
            .map(|t| t.as_str().to_string())
            .or_else(|| cfg.condition_type.clone());

        let mut output = Map::new();
        output.insert(
            "conditionType".into(),
            resolved_type.map_or(Value::Null, Value::String),
        );
        output.insert("conditionResult".into(), Value::Bool(result));
        if let Some(branch) = &cfg.true_branch {
            output.insert("trueBranch".into(), Value::String(branch.clone()));
        }
        if let Some(branch) = &cfg.false_branch {
            output.insert("falseBranch".into(), Value::String(branch.clone()));
        }

        if let Some(branch) = selected_branch(&cfg, result) {
            output.insert("selectedBranch".into(), Value::String(branch.to_string()));
            output.insert(
                "branchDirection".into(),
                Value::String(if result { "true" } else { "false" }.into()),
            );
        }

        debug!(
            node_id = %ctx.node_id,
            result,
            "condition node evaluated"
        );
        NodeExecutionResult::success(output).started(begun)
    }

    fn node_type(&self) -> &str {
        "condition"
    }
}
