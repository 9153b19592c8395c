mod common;

use std::time::Duration;

use serde_json::{json, Value};

use common::MockGateway;
use opsflow::{ExecutionStatus, NodeExecutionContext, NodeExecutor, NotificationExecutor};

fn ctx(config: Value) -> NodeExecutionContext {
    NodeExecutionContext::new("WF-001", "node-3", "notify requester", config)
}

/// Block until the background queue worker has made `n` gateway calls.
async fn wait_for_calls(gateway: &MockGateway, n: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while gateway.call_count() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("queued notification was never dispatched");
}

#[tokio::test]
async fn async_email_queues_and_returns_immediately() {
    let gateway = MockGateway::ok();
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "email",
        "recipients": ["ops@example.com"],
        "subject": "workflow update",
        "content": "node finished",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["queued"], json!(true));
    assert_eq!(result.output["taskId"], json!("NOTIFY-WF-001-node-3"));

    wait_for_calls(&gateway, 1).await;
    let call = &gateway.calls()[0];
    assert_eq!(call.path, "/api/v1/notification/email/send");
    assert_eq!(call.body["recipients"], json!(["ops@example.com"]));
    assert_eq!(call.body["instanceId"], json!("WF-001"));
}

#[tokio::test]
async fn queue_worker_failure_does_not_surface() {
    let gateway = MockGateway::failing("smtp relay down");
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "email",
        "recipients": ["ops@example.com"],
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    wait_for_calls(&gateway, 1).await;
}

#[tokio::test]
async fn sync_send_embeds_gateway_response() {
    let gateway = MockGateway::new(|_, _, _| Ok(json!({ "messageId": "m-77" })));
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "sms",
        "async": false,
        "phoneNumbers": ["13800000000"],
        "templateCode": "SMS_001",
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["response"], json!({ "messageId": "m-77" }));
    assert_eq!(gateway.paths(), vec!["/api/v1/notification/sms/send"]);
}

#[tokio::test]
async fn sync_gateway_failure_fails_the_node() {
    let executor = NotificationExecutor::new(MockGateway::failing("provider 503"));
    let ctx = ctx(json!({
        "notificationType": "email",
        "async": false,
        "recipients": ["ops@example.com"],
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert!(result.error.as_deref().unwrap_or("").contains("provider 503"));
}

#[tokio::test]
async fn missing_recipients_is_a_config_failure() {
    let gateway = MockGateway::ok();
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({ "notificationType": "email", "subject": "no recipients" }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn webhook_requires_a_url_and_uses_the_execute_path() {
    let executor = NotificationExecutor::new(MockGateway::ok());
    let invalid_ctx = ctx(json!({ "notificationType": "webhook", "webhookUrl": "  " }));

    let result = executor.execute(&invalid_ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);

    let gateway = MockGateway::ok();
    let executor = NotificationExecutor::new(gateway.clone());
    let valid_ctx = ctx(json!({
        "notificationType": "webhook",
        "async": false,
        "webhookUrl": "https://hooks.example.com/x",
    }));

    let result = executor.execute(&valid_ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(gateway.paths(), vec!["/api/v1/notification/webhook/execute"]);
    assert_eq!(gateway.calls()[0].body["method"], json!("POST"));
}

#[tokio::test]
async fn unknown_type_goes_through_the_custom_channel() {
    let gateway = MockGateway::ok();
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "carrier_pigeon",
        "async": false,
        "customParams": { "coop": "north" },
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(gateway.paths(), vec!["/api/v1/notification/custom/execute"]);
}

#[tokio::test]
async fn multi_isolates_channel_failures() {
    let gateway = MockGateway::new(|_, path, _| {
        if path.contains("/sms/") {
            Err(opsflow::NodeError::Gateway("sms provider down".into()))
        } else {
            Ok(json!({}))
        }
    });
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "multi",
        "content": "shared content",
        "notifications": [
            { "notificationType": "email", "recipients": ["ops@example.com"] },
            { "notificationType": "sms", "phoneNumbers": ["13800000000"] },
            { "notificationType": "system", "userIds": ["7"], "message": "done" },
        ],
    }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output["totalCount"], json!(3));
    assert_eq!(result.output["successCount"], json!(2));
    assert_eq!(result.output["failureCount"], json!(1));

    let results = result.output["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1]["type"], json!("sms"));
    assert_eq!(results[1]["status"], json!("FAILURE"));

    // all three sends happened synchronously, before the node returned
    assert_eq!(gateway.call_count(), 3);
}

#[tokio::test]
async fn multi_sub_configs_inherit_base_fields() {
    let gateway = MockGateway::ok();
    let executor = NotificationExecutor::new(gateway.clone());
    let ctx = ctx(json!({
        "notificationType": "multi",
        "subject": "shared subject",
        "notifications": [
            { "notificationType": "email", "recipients": ["a@example.com"] },
        ],
    }));

    executor.execute(&ctx).await;
    assert_eq!(gateway.calls()[0].body["subject"], json!("shared subject"));
}

#[tokio::test]
async fn multi_with_no_entries_is_a_failure() {
    let executor = NotificationExecutor::new(MockGateway::ok());
    let ctx = ctx(json!({ "notificationType": "multi", "notifications": [] }));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);
}

#[tokio::test]
async fn empty_config_is_a_failure() {
    let executor = NotificationExecutor::new(MockGateway::ok());
    let ctx = ctx(json!(null));

    let result = executor.execute(&ctx).await;
    assert_eq!(result.status, ExecutionStatus::Failure);
}
