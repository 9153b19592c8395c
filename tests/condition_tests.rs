mod common;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;

use common::MockGateway;
use opsflow::evaluator::Clock;
use opsflow::{ConditionExecutor, ExecutionStatus, NodeExecutionContext, NodeExecutor};

struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn at(date: (i32, u32, u32), time: (u32, u32)) -> Arc<FixedClock> {
    let now = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .unwrap()
        .and_hms_opt(time.0, time.1, 0)
        .unwrap();
    Arc::new(FixedClock(now))
}

fn ctx(config: serde_json::Value) -> NodeExecutionContext {
    NodeExecutionContext::new("WF-001", "node-1", "condition", config)
}

#[tokio::test]
async fn expression_selects_true_branch() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "expression",
        "conditionExpression": "amount > 1000 && status == \"active\"",
        "trueBranch": "approve",
        "falseBranch": "reject",
    }));
    ctx.insert_execution_data("amount", json!(2500));
    ctx.insert_execution_data("status", json!("active"));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["conditionResult"], json!(true));
    assert_eq!(result.output["selectedBranch"], json!("approve"));
    assert_eq!(result.output["branchDirection"], json!("true"));
}

#[tokio::test]
async fn empty_expression_is_false_not_an_error() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "expression",
        "falseBranch": "reject",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["conditionResult"], json!(false));
    assert_eq!(result.output["selectedBranch"], json!("reject"));
}

#[tokio::test]
async fn rule_compares_field_against_value() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "rule",
        "conditionRule": "amount.greater.1000",
    }));
    ctx.insert_execution_data("amount", json!(2500));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
}

#[tokio::test]
async fn malformed_rule_degrades_to_false() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    for rule in ["amount.greater", "justonefield", "a.b.c.d"] {
        let ctx = ctx(json!({
            "conditionType": "rule",
            "conditionRule": rule,
        }));
        ctx.insert_execution_data("amount", json!(2500));

        let result = executor.execute(&ctx).await;
        assert_eq!(result.status, ExecutionStatus::Success, "rule {rule}");
        assert_eq!(result.output["conditionResult"], json!(false), "rule {rule}");
    }
}

#[tokio::test]
async fn rule_null_field_is_false() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "rule",
        "conditionRule": "missing.equals.x",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(false));
}

#[tokio::test]
async fn comparison_resolves_both_operands() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "comparison",
        "leftOperand": "$total",
        "operator": "greater_equal",
        "rightOperand": "100",
    }));
    ctx.insert_execution_data("total", json!(100));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
}

#[tokio::test]
async fn comparison_in_requires_list_on_the_right() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let list_ctx = ctx(json!({
        "conditionType": "comparison",
        "leftOperand": "$state",
        "operator": "in",
        "rightOperand": "$allowed",
    }));
    list_ctx.insert_execution_data("state", json!("running"));
    list_ctx.insert_execution_data("allowed", json!(["running", "paused"]));

    let result = executor.execute(&list_ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));

    // A scalar right side never matches; there is no ad-hoc string split.
    let scalar_ctx = ctx(json!({
        "conditionType": "comparison",
        "leftOperand": "$state",
        "operator": "in",
        "rightOperand": "running",
    }));
    scalar_ctx.insert_execution_data("state", json!("running"));

    let result = executor.execute(&scalar_ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["conditionResult"], json!(false));
}

#[tokio::test]
async fn business_permission_check_hits_gateway() {
    let gateway = MockGateway::new(|_, path, body| {
        assert_eq!(path, "/api/v1/permission/check");
        assert_eq!(body["userId"], json!(42));
        Ok(json!(true))
    });
    let executor = ConditionExecutor::new(gateway.clone());
    let ctx = NodeExecutionContext::new(
        "WF-001",
        "node-1",
        "condition",
        json!({
            "conditionType": "business",
            "conditionRule": "user_permission",
            "conditionValue": "workflow:approve",
        }),
    )
    .with_user(42);

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn business_gateway_failure_fails_closed() {
    let executor = ConditionExecutor::new(MockGateway::failing("connection refused"));
    let ctx = NodeExecutionContext::new(
        "WF-001",
        "node-1",
        "condition",
        json!({
            "conditionType": "business",
            "conditionRule": "user_permission",
            "conditionValue": "workflow:approve",
            "falseBranch": "reject",
        }),
    )
    .with_user(42);

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["conditionResult"], json!(false));
    assert_eq!(result.output["selectedBranch"], json!("reject"));
}

#[tokio::test]
async fn business_device_status_matches_case_insensitively() {
    let gateway = MockGateway::new(|_, path, _| {
        assert_eq!(path, "/api/v1/device/dev-7/status");
        Ok(json!({ "status": "ONLINE" }))
    });
    let executor = ConditionExecutor::new(gateway);
    let ctx = ctx(json!({
        "conditionType": "business",
        "conditionRule": "device_status",
        "conditionValue": "online",
    }));
    ctx.insert_execution_data("deviceId", json!("dev-7"));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
}

#[tokio::test]
async fn business_amount_limit_is_inclusive() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    for (amount, expected) in [(5000, true), (5001, false)] {
        let ctx = ctx(json!({
            "conditionType": "business",
            "conditionRule": "amount_limit",
            "conditionValue": 5000,
        }));
        ctx.insert_execution_data("amount", json!(amount));

        let result = executor.execute(&ctx).await;
        assert_eq!(result.output["conditionResult"], json!(expected), "amount {amount}");
    }
}

#[tokio::test]
async fn overnight_time_range_wraps_midnight() {
    // 22:00-06:00 window: inside at 23:30 and 02:00, outside at noon.
    for (time, expected) in [((23, 30), true), ((2, 0), true), ((12, 0), false)] {
        let executor =
            ConditionExecutor::new(MockGateway::ok()).with_clock(at((2026, 3, 2), time));
        let ctx = ctx(json!({
            "conditionType": "business",
            "conditionRule": "time_range",
            "conditionValue": { "startTime": "22:00", "endTime": "06:00" },
        }));

        let result = executor.execute(&ctx).await;
        assert_eq!(
            result.output["conditionResult"],
            json!(expected),
            "at {time:?}"
        );
    }
}

#[tokio::test]
async fn workday_only_rejects_weekends() {
    // 2026-03-02 is a Monday, 2026-03-07 a Saturday.
    for (date, expected) in [((2026, 3, 2), true), ((2026, 3, 7), false)] {
        let executor =
            ConditionExecutor::new(MockGateway::ok()).with_clock(at(date, (10, 0)));
        let ctx = ctx(json!({
            "conditionType": "business",
            "conditionRule": "time_range",
            "conditionValue": { "workdayOnly": true },
        }));

        let result = executor.execute(&ctx).await;
        assert_eq!(result.output["conditionResult"], json!(expected), "on {date:?}");
    }
}

#[tokio::test]
async fn custom_condition_merges_params_into_scope() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "custom",
        "customEvaluator": "score >= threshold",
        "customParams": { "threshold": 80 },
    }));
    ctx.insert_execution_data("score", json!(92));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
}

#[tokio::test]
async fn unknown_condition_type_uses_default_result() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "mystery",
        "defaultResult": true,
        "trueBranch": "approve",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["conditionResult"], json!(true));
    assert_eq!(result.output["selectedBranch"], json!("approve"));
}

#[tokio::test]
async fn evaluate_returns_the_boolean_and_branch_pair() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "rule",
        "conditionRule": "amount.greater.1000",
        "trueBranch": "approve",
        "falseBranch": "reject",
    }));
    ctx.insert_execution_data("amount", json!(2500));

    let (result, branch) = executor.evaluate(&ctx).await.unwrap();
    assert!(result);
    assert_eq!(branch.as_deref(), Some("approve"));

    ctx.insert_execution_data("amount", json!(10));
    let (result, branch) = executor.evaluate(&ctx).await.unwrap();
    assert!(!result);
    assert_eq!(branch.as_deref(), Some("reject"));

    let bare_ctx = NodeExecutionContext::new(
        "WF-001",
        "node-1",
        "condition",
        json!({ "conditionType": "expression", "conditionExpression": "true" }),
    );
    let (result, branch) = executor.evaluate(&bare_ctx).await.unwrap();
    assert!(result);
    assert!(branch.is_none());
}

#[tokio::test]
async fn empty_config_is_a_failure() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!(null));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn blank_branch_ids_are_omitted() {
    let executor = ConditionExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({
        "conditionType": "expression",
        "conditionExpression": "true",
        "trueBranch": "  ",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.output["conditionResult"], json!(true));
    assert!(result.output.get("selectedBranch").is_none());
}
