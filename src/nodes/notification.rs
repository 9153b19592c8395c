//! Notification node executor.
//!
//! Fans a single logical notification out to one of eight channel handlers,
//! each of which builds a channel-specific payload and performs exactly one
//! gateway send. The `multi` type dispatches a list of sub-notifications,
//! isolating failures per channel.
//!
//! With `async = true` (the default) the prepared request is enqueued onto
//! an in-process queue drained by a background worker task and the node
//! returns immediately; worker failures are logged, not surfaced, because
//! the send has already left the node's failure domain.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::context::{NodeExecutionContext, NodeExecutionResult};
use crate::error::{NodeError, NodeResult};
use crate::gateway::{GatewayClient, Method, ServiceTarget};
use crate::nodes::NodeExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotificationType {
    Email,
    Sms,
    Wechat,
    Dingtalk,
    Push,
    System,
    Webhook,
    Multi,
    Custom,
}

impl NotificationType {
    /// Missing type defaults to `email`; unknown tags go through the
    /// custom channel.
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("email") => NotificationType::Email,
            Some("sms") => NotificationType::Sms,
            Some("wechat") => NotificationType::Wechat,
            Some("dingtalk") => NotificationType::Dingtalk,
            Some("push") => NotificationType::Push,
            Some("system") => NotificationType::System,
            Some("webhook") => NotificationType::Webhook,
            Some("multi") => NotificationType::Multi,
            Some(_) => NotificationType::Custom,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
            NotificationType::Wechat => "wechat",
            NotificationType::Dingtalk => "dingtalk",
            NotificationType::Push => "push",
            NotificationType::System => "system",
            NotificationType::Webhook => "webhook",
            NotificationType::Multi => "multi",
            NotificationType::Custom => "custom",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationConfig {
    #[serde(default)]
    notification_type: Option<String>,
    #[serde(default = "default_async", rename = "async")]
    asynchronous: bool,
    #[serde(default)]
    notifications: Option<Vec<Value>>,
}

fn default_async() -> bool {
    true
}

/// A fully prepared, channel-specific gateway request.
struct ChannelRequest {
    path: String,
    operation: &'static str,
    payload: Value,
    summary: Map<String, Value>,
}

struct QueuedNotification {
    task_id: String,
    path: String,
    payload: Value,
}

/// In-process dispatch queue drained by a spawned worker task.
#[derive(Clone)]
struct NotificationQueue {
    tx: mpsc::Sender<QueuedNotification>,
}

impl NotificationQueue {
    fn start(gateway: Arc<dyn GatewayClient>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueuedNotification>(capacity);
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match gateway
                    .call(ServiceTarget::Common, Method::Post, &item.path, item.payload)
                    .await
                {
                    Ok(_) => debug!(task_id = %item.task_id, "queued notification delivered"),
                    Err(e) => {
                        error!(task_id = %item.task_id, "queued notification failed: {e}")
                    }
                }
            }
        });
        NotificationQueue { tx }
    }

    async fn enqueue(&self, item: QueuedNotification) -> NodeResult<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| NodeError::Gateway("notification queue is closed".into()))
    }
}

/// Notification node executor.
pub struct NotificationExecutor {
    gateway: Arc<dyn GatewayClient>,
    queue: NotificationQueue,
}

impl NotificationExecutor {
    const QUEUE_CAPACITY: usize = 256;

    /// Must be called within a Tokio runtime: the dispatch worker is
    /// spawned here.
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        let queue = NotificationQueue::start(gateway.clone(), Self::QUEUE_CAPACITY);
        NotificationExecutor { gateway, queue }
    }

    async fn send(&self, request: &ChannelRequest) -> NodeResult<Value> {
        self.gateway
            .call(
                ServiceTarget::Common,
                Method::Post,
                &request.path,
                request.payload.clone(),
            )
            .await
    }

    async fn single(
        &self,
        ctx: &NodeExecutionContext,
        kind: NotificationType,
        asynchronous: bool,
    ) -> NodeExecutionResult {
        let request = match build_channel_request(kind, &ctx.config, ctx) {
            Ok(request) => request,
            Err(e) => return NodeExecutionResult::failure(e.to_string()),
        };

        if asynchronous {
            let task_id = format!("NOTIFY-{}-{}", ctx.instance_id, ctx.node_id);
            let queued = QueuedNotification {
                task_id: task_id.clone(),
                path: request.path.clone(),
                payload: request.payload.clone(),
            };
            if let Err(e) = self.queue.enqueue(queued).await {
                return NodeExecutionResult::failure(e.to_string());
            }

            let mut output = request.summary;
            output.insert("notificationType".into(), json!(kind.as_str()));
            output.insert("operation".into(), json!(request.operation));
            output.insert("async".into(), json!(true));
            output.insert("queued".into(), json!(true));
            output.insert("taskId".into(), json!(task_id));
            return NodeExecutionResult::success(output);
        }

        match self.send(&request).await {
            Ok(response) => {
                let mut output = request.summary;
                output.insert("notificationType".into(), json!(kind.as_str()));
                output.insert("operation".into(), json!(request.operation));
                output.insert("async".into(), json!(false));
                output.insert("response".into(), response);
                NodeExecutionResult::success(output)
            }
            Err(e) => NodeExecutionResult::failure(format!(
                "{} notification failed: {e}",
                kind.as_str()
            )),
        }
    }

    /// Execute each sub-notification synchronously and in isolation: one
    /// channel failing must not abort the others.
    async fn multi(&self, ctx: &NodeExecutionContext, cfg: &NotificationConfig) -> NodeExecutionResult {
        let Some(notifications) = cfg.notifications.as_ref().filter(|n| !n.is_empty()) else {
            return NodeExecutionResult::failure("multi notification list is empty");
        };

        let base = ctx.config.as_object().cloned().unwrap_or_default();
        let mut results = Vec::new();
        let mut success_count = 0usize;
        let mut failure_count = 0usize;

        for sub in notifications {
            let mut merged = base.clone();
            merged.remove("notifications");
            if let Some(overrides) = sub.as_object() {
                for (key, value) in overrides {
                    merged.insert(key.clone(), value.clone());
                }
            }
            let merged = Value::Object(merged);
            let sub_kind = NotificationType::parse(
                merged.get("notificationType").and_then(Value::as_str),
            );

            let outcome = if sub_kind == NotificationType::Multi {
                Err(NodeError::Config("nested multi notification".into()))
            } else {
                match build_channel_request(sub_kind, &merged, ctx) {
                    Ok(request) => self.send(&request).await,
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(_) => {
                    success_count += 1;
                    results.push(json!({
                        "type": sub_kind.as_str(),
                        "status": "SUCCESS",
                    }));
                }
                Err(e) => {
                    failure_count += 1;
                    results.push(json!({
                        "type": sub_kind.as_str(),
                        "status": "FAILURE",
                        "message": e.to_string(),
                    }));
                }
            }
        }

        let mut output = Map::new();
        output.insert("notificationType".into(), json!("multi"));
        output.insert("totalCount".into(), json!(notifications.len()));
        output.insert("successCount".into(), json!(success_count));
        output.insert("failureCount".into(), json!(failure_count));
        output.insert("results".into(), Value::Array(results));
        NodeExecutionResult::success(output)
    }
}

#[async_trait]
impl NodeExecutor for NotificationExecutor {
    async fn execute(&self, ctx: &NodeExecutionContext) -> NodeExecutionResult {
        let begun = Utc::now();
        info!(
            instance_id = %ctx.instance_id,
            node_id = %ctx.node_id,
            "executing notification node {}", ctx.node_name
        );

        if !ctx.config.is_object() {
            return NodeExecutionResult::failure("notification node configuration is empty")
                .started(begun);
        }
        let cfg: NotificationConfig = match serde_json::from_value(ctx.config.clone()) {
            Ok(cfg) => cfg,
            Err(e) => {
                return NodeExecutionResult::failure(format!(
                    "invalid notification configuration: {e}"
                ))
                .started(begun)
            }
        };

        let kind = NotificationType::parse(cfg.notification_type.as_deref());
        let result = match kind {
            NotificationType::Multi => self.multi(ctx, &cfg).await,
            other => self.single(ctx, other, cfg.asynchronous).await,
        };
        result.started(begun)
    }

    fn node_type(&self) -> &str {
        "notification"
    }
}

fn build_channel_request(
    kind: NotificationType,
    config: &Value,
    ctx: &NodeExecutionContext,
) -> NodeResult<ChannelRequest> {
    match kind {
        NotificationType::Email => email_request(config, ctx),
        NotificationType::Sms => sms_request(config, ctx),
        NotificationType::Wechat => wechat_request(config, ctx),
        NotificationType::Dingtalk => dingtalk_request(config, ctx),
        NotificationType::Push => push_request(config, ctx),
        NotificationType::System => system_request(config, ctx),
        NotificationType::Webhook => webhook_request(config, ctx),
        NotificationType::Custom => custom_request(config, ctx),
        NotificationType::Multi => Err(NodeError::Config(
            "multi notifications are dispatched per sub-config".into(),
        )),
    }
}

/// Context fields every channel payload carries.
fn base_payload(kind: NotificationType, ctx: &NodeExecutionContext) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("notificationType".into(), json!(kind.as_str()));
    payload.insert("instanceId".into(), json!(ctx.instance_id));
    payload.insert("nodeId".into(), json!(ctx.node_id));
    payload.insert(
        "executionData".into(),
        Value::Object(ctx.execution_snapshot()),
    );
    payload
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailChannel {
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    template_code: Option<String>,
    #[serde(default)]
    template_data: Option<Map<String, Value>>,
}

fn email_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: EmailChannel = from_config(config)?;
    if channel.recipients.is_empty() {
        return Err(NodeError::Config("email recipients must not be empty".into()));
    }

    let mut payload = base_payload(NotificationType::Email, ctx);
    payload.insert("recipients".into(), json!(channel.recipients));
    payload.insert("subject".into(), json!(channel.subject));
    payload.insert("content".into(), json!(channel.content));
    payload.insert("templateCode".into(), json!(channel.template_code));
    payload.insert("templateData".into(), json!(channel.template_data));

    let mut summary = Map::new();
    summary.insert("recipients".into(), json!(channel.recipients));
    summary.insert("subject".into(), json!(channel.subject));

    Ok(ChannelRequest {
        path: "/api/v1/notification/email/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmsChannel {
    #[serde(default)]
    phone_numbers: Vec<String>,
    #[serde(default)]
    template_code: Option<String>,
    #[serde(default)]
    template_params: Option<Map<String, Value>>,
}

fn sms_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: SmsChannel = from_config(config)?;
    if channel.phone_numbers.is_empty() {
        return Err(NodeError::Config("sms phone numbers must not be empty".into()));
    }

    let mut payload = base_payload(NotificationType::Sms, ctx);
    payload.insert("phoneNumbers".into(), json!(channel.phone_numbers));
    payload.insert("templateCode".into(), json!(channel.template_code));
    payload.insert("templateParams".into(), json!(channel.template_params));

    let mut summary = Map::new();
    summary.insert("phoneNumbers".into(), json!(channel.phone_numbers));
    summary.insert("templateCode".into(), json!(channel.template_code));

    Ok(ChannelRequest {
        path: "/api/v1/notification/sms/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WechatChannel {
    #[serde(default)]
    tousers: Vec<String>,
    #[serde(default = "default_msgtype")]
    msgtype: String,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    message: Option<Map<String, Value>>,
}

fn default_msgtype() -> String {
    "text".into()
}

fn wechat_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: WechatChannel = from_config(config)?;
    if channel.tousers.is_empty() {
        return Err(NodeError::Config("wechat recipients must not be empty".into()));
    }

    let mut payload = base_payload(NotificationType::Wechat, ctx);
    payload.insert("tousers".into(), json!(channel.tousers));
    payload.insert("msgtype".into(), json!(channel.msgtype));
    payload.insert("agentId".into(), json!(channel.agent_id));
    payload.insert("message".into(), json!(channel.message));

    let mut summary = Map::new();
    summary.insert("tousers".into(), json!(channel.tousers));
    summary.insert("msgtype".into(), json!(channel.msgtype));

    Ok(ChannelRequest {
        path: "/api/v1/notification/wechat/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DingtalkChannel {
    #[serde(default)]
    user_ids: Vec<String>,
    #[serde(default)]
    dept_id_list: Option<String>,
    #[serde(default = "default_msgtype")]
    msgtype: String,
    #[serde(default)]
    message: Option<Map<String, Value>>,
    #[serde(default)]
    agent_id: Option<String>,
}

fn dingtalk_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: DingtalkChannel = from_config(config)?;

    let mut payload = base_payload(NotificationType::Dingtalk, ctx);
    payload.insert("userIds".into(), json!(channel.user_ids));
    payload.insert("deptIdList".into(), json!(channel.dept_id_list));
    payload.insert("msgtype".into(), json!(channel.msgtype));
    payload.insert("message".into(), json!(channel.message));
    payload.insert("agentId".into(), json!(channel.agent_id));

    let mut summary = Map::new();
    summary.insert("userIds".into(), json!(channel.user_ids));
    summary.insert("msgtype".into(), json!(channel.msgtype));

    Ok(ChannelRequest {
        path: "/api/v1/notification/dingtalk/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushChannel {
    #[serde(default)]
    user_ids: Vec<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default = "default_push_type")]
    push_type: String,
    #[serde(default)]
    extra_data: Option<Map<String, Value>>,
}

fn default_push_type() -> String {
    "app".into()
}

fn push_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: PushChannel = from_config(config)?;
    if channel.user_ids.is_empty() {
        return Err(NodeError::Config("push users must not be empty".into()));
    }

    let mut payload = base_payload(NotificationType::Push, ctx);
    payload.insert("userIds".into(), json!(channel.user_ids));
    payload.insert("title".into(), json!(channel.title));
    payload.insert("content".into(), json!(channel.content));
    payload.insert("pushType".into(), json!(channel.push_type));
    payload.insert("extraData".into(), json!(channel.extra_data));

    let mut summary = Map::new();
    summary.insert("userIds".into(), json!(channel.user_ids));
    summary.insert("pushType".into(), json!(channel.push_type));
    summary.insert("title".into(), json!(channel.title));

    Ok(ChannelRequest {
        path: "/api/v1/notification/push/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemChannel {
    #[serde(default)]
    user_ids: Vec<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "default_level")]
    level: String,
    #[serde(default)]
    category: Option<String>,
}

fn default_level() -> String {
    "info".into()
}

fn system_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: SystemChannel = from_config(config)?;

    let mut payload = base_payload(NotificationType::System, ctx);
    payload.insert("userIds".into(), json!(channel.user_ids));
    payload.insert("message".into(), json!(channel.message));
    payload.insert("level".into(), json!(channel.level));
    payload.insert("category".into(), json!(channel.category));

    let mut summary = Map::new();
    summary.insert("userIds".into(), json!(channel.user_ids));
    summary.insert("level".into(), json!(channel.level));

    Ok(ChannelRequest {
        path: "/api/v1/notification/system/send".into(),
        operation: "send",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookChannel {
    #[serde(default)]
    webhook_url: Option<String>,
    #[serde(default = "default_webhook_method")]
    method: String,
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default = "default_webhook_timeout")]
    timeout: u64,
}

fn default_webhook_method() -> String {
    "POST".into()
}

fn default_webhook_timeout() -> u64 {
    30
}

fn webhook_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: WebhookChannel = from_config(config)?;
    let url = channel.webhook_url.as_deref().unwrap_or("").trim().to_string();
    if url.is_empty() {
        return Err(NodeError::Config("webhook url must not be blank".into()));
    }

    let mut payload = base_payload(NotificationType::Webhook, ctx);
    payload.insert("webhookUrl".into(), json!(url));
    payload.insert("method".into(), json!(channel.method));
    payload.insert("headers".into(), json!(channel.headers));
    payload.insert("payload".into(), json!(channel.payload));
    payload.insert("timeout".into(), json!(channel.timeout));

    let mut summary = Map::new();
    summary.insert("webhookUrl".into(), json!(url));
    summary.insert("method".into(), json!(channel.method));

    Ok(ChannelRequest {
        path: "/api/v1/notification/webhook/execute".into(),
        operation: "execute",
        payload: Value::Object(payload),
        summary,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomChannel {
    #[serde(default)]
    custom_type: Option<String>,
    #[serde(default)]
    custom_service: Option<String>,
    #[serde(default)]
    custom_method: Option<String>,
    #[serde(default)]
    custom_params: Option<Map<String, Value>>,
}

fn custom_request(config: &Value, ctx: &NodeExecutionContext) -> NodeResult<ChannelRequest> {
    let channel: CustomChannel = from_config(config)?;

    let mut payload = base_payload(NotificationType::Custom, ctx);
    payload.insert("customType".into(), json!(channel.custom_type));
    payload.insert("customService".into(), json!(channel.custom_service));
    payload.insert("customMethod".into(), json!(channel.custom_method));
    payload.insert("customParams".into(), json!(channel.custom_params));

    let mut summary = Map::new();
    summary.insert("customType".into(), json!(channel.custom_type));
    summary.insert("customService".into(), json!(channel.custom_service));

    Ok(ChannelRequest {
        path: "/api/v1/notification/custom/execute".into(),
        operation: "execute",
        payload: Value::Object(payload),
        summary,
    })
}

fn from_config<T: serde::de::DeserializeOwned>(config: &Value) -> NodeResult<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::Config(format!("invalid notification configuration: {e}")))
}
