//! System node executor.
//!
//! Runs generic side-effecting operations (HTTP call, database operation,
//! file operation, notification relay, integration call, batch operation,
//! custom script) through the gateway. An optional `timeoutSeconds` wraps
//! the whole dispatch; an elapsed deadline yields a TIMEOUT result, which
//! callers treat differently from FAILURE when deciding on retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::context::{NodeExecutionContext, NodeExecutionResult};
use crate::error::{NodeError, NodeResult};
use crate::gateway::{GatewayClient, Method, ServiceTarget};
use crate::nodes::NodeExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SystemType {
    Http,
    Database,
    File,
    Notification,
    Integration,
    Batch,
    Script,
}

impl SystemType {
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("http") => Some(SystemType::Http),
            Some("database") => Some(SystemType::Database),
            Some("file") => Some(SystemType::File),
            Some("notification") => Some(SystemType::Notification),
            Some("integration") => Some(SystemType::Integration),
            Some("batch") => Some(SystemType::Batch),
            Some("script") => Some(SystemType::Script),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SystemType::Http => "http",
            SystemType::Database => "database",
            SystemType::File => "file",
            SystemType::Notification => "notification",
            SystemType::Integration => "integration",
            SystemType::Batch => "batch",
            SystemType::Script => "script",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemConfig {
    #[serde(default)]
    system_type: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,

    // http
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    #[serde(default)]
    body: Option<Value>,

    // database
    #[serde(default)]
    data_source: Option<String>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    params: Option<Value>,

    // file
    #[serde(default)]
    file_operation: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,

    // notification relay
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    recipients: Option<Vec<String>>,
    #[serde(default)]
    message: Option<String>,

    // integration
    #[serde(default)]
    target_system: Option<String>,
    #[serde(default)]
    integration_config: Option<Map<String, Value>>,

    // batch
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    item_operation: Option<String>,

    // script
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    script_language: Option<String>,
    #[serde(default)]
    script_params: Option<Map<String, Value>>,
}

const DEFAULT_BATCH_SIZE: usize = 100;

/// System node executor.
pub struct SystemExecutor {
    gateway: Arc<dyn GatewayClient>,
}

impl SystemExecutor {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        SystemExecutor { gateway }
    }

    async fn dispatch(
        &self,
        kind: SystemType,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        match kind {
            SystemType::Http => self.http_call(cfg, ctx).await,
            SystemType::Database => self.database_operation(cfg, ctx).await,
            SystemType::File => self.file_operation(cfg, ctx).await,
            SystemType::Notification => self.notification_relay(cfg, ctx).await,
            SystemType::Integration => self.integration_call(cfg, ctx).await,
            SystemType::Batch => self.batch_operation(cfg, ctx).await,
            SystemType::Script => self.custom_script(cfg, ctx).await,
        }
    }

    async fn call(&self, path: &str, payload: Value) -> NodeResult<Value> {
        self.gateway
            .call(ServiceTarget::Common, Method::Post, path, payload)
            .await
    }

    async fn http_call(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let url = required(cfg.url.as_deref(), "http url")?;
        let method = cfg.method.as_deref().unwrap_or("GET").to_uppercase();

        let response = self
            .call(
                "/api/v1/system/http/execute",
                json!({
                    "url": url,
                    "method": method,
                    "headers": cfg.headers,
                    "body": cfg.body,
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("http", &[
            ("url", json!(url)),
            ("method", json!(method)),
            ("response", response),
        ]))
    }

    async fn database_operation(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let sql = required(cfg.sql.as_deref(), "database sql")?;
        let operation = cfg.operation.as_deref().unwrap_or("query");

        let response = self
            .call(
                "/api/v1/system/database/execute",
                json!({
                    "dataSource": cfg.data_source,
                    "operation": operation,
                    "sql": sql,
                    "params": cfg.params,
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("database", &[
            ("operation", json!(operation)),
            ("response", response),
        ]))
    }

    async fn file_operation(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let path = required(cfg.path.as_deref(), "file path")?;
        let operation = cfg.file_operation.as_deref().unwrap_or("read");

        let response = self
            .call(
                "/api/v1/system/file/execute",
                json!({
                    "operation": operation,
                    "path": path,
                    "content": cfg.content,
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("file", &[
            ("operation", json!(operation)),
            ("path", json!(path)),
            ("response", response),
        ]))
    }

    async fn notification_relay(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let message = required(cfg.message.as_deref(), "notification message")?;
        let channel = cfg.channel.as_deref().unwrap_or("system");

        let response = self
            .call(
                "/api/v1/system/notification/relay",
                json!({
                    "channel": channel,
                    "recipients": cfg.recipients,
                    "message": message,
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("notification", &[
            ("channel", json!(channel)),
            ("response", response),
        ]))
    }

    async fn integration_call(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let target = required(cfg.target_system.as_deref(), "integration target system")?;

        let response = self
            .call(
                "/api/v1/system/integration/execute",
                json!({
                    "targetSystem": target,
                    "integrationConfig": cfg.integration_config,
                    "executionData": ctx.execution_snapshot(),
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("integration", &[
            ("targetSystem", json!(target)),
            ("response", response),
        ]))
    }

    /// Chunk the item list by `batchSize` and perform one gateway call per
    /// chunk, reporting per-chunk results.
    async fn batch_operation(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let items = cfg
            .items
            .as_ref()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| NodeError::Config("batch items must not be empty".into()))?;
        let batch_size = cfg.batch_size.filter(|n| *n > 0).unwrap_or(DEFAULT_BATCH_SIZE);
        let operation = cfg.item_operation.as_deref().unwrap_or("process");

        let mut chunk_results = Vec::new();
        for (index, chunk) in items.chunks(batch_size).enumerate() {
            let response = self
                .call(
                    "/api/v1/system/batch/execute",
                    json!({
                        "operation": operation,
                        "batchIndex": index,
                        "items": chunk,
                        "instanceId": ctx.instance_id,
                        "nodeId": ctx.node_id,
                    }),
                )
                .await?;
            chunk_results.push(json!({
                "batchIndex": index,
                "itemCount": chunk.len(),
                "response": response,
            }));
        }

        Ok(operation_output("batch", &[
            ("operation", json!(operation)),
            ("totalItems", json!(items.len())),
            ("batchSize", json!(batch_size)),
            ("batchCount", json!(chunk_results.len())),
            ("batchResults", Value::Array(chunk_results)),
        ]))
    }

    async fn custom_script(
        &self,
        cfg: &SystemConfig,
        ctx: &NodeExecutionContext,
    ) -> NodeResult<Map<String, Value>> {
        let script = required(cfg.script.as_deref(), "script")?;
        let language = cfg.script_language.as_deref().unwrap_or("groovy");

        let response = self
            .call(
                "/api/v1/system/script/execute",
                json!({
                    "script": script,
                    "language": language,
                    "params": cfg.script_params,
                    "executionData": ctx.execution_snapshot(),
                    "instanceId": ctx.instance_id,
                    "nodeId": ctx.node_id,
                }),
            )
            .await?;

        Ok(operation_output("script", &[
            ("language", json!(language)),
            ("response", response),
        ]))
    }
}

#[async_trait]
impl NodeExecutor for SystemExecutor {
    async fn execute(&self, ctx: &NodeExecutionContext) -> NodeExecutionResult {
        let begun = Utc::now();
        info!(
            instance_id = %ctx.instance_id,
            node_id = %ctx.node_id,
            "executing system node {}", ctx.node_name
        );

        if !ctx.config.is_object() {
            return NodeExecutionResult::failure("system node configuration is empty")
                .started(begun);
        }
        let cfg: SystemConfig = match serde_json::from_value(ctx.config.clone()) {
            Ok(cfg) => cfg,
            Err(e) => {
                return NodeExecutionResult::failure(format!(
                    "invalid system configuration: {e}"
                ))
                .started(begun)
            }
        };

        let Some(kind) = SystemType::parse(cfg.system_type.as_deref()) else {
            warn!(
                instance_id = %ctx.instance_id,
                node_id = %ctx.node_id,
                "unknown system type {:?}", cfg.system_type
            );
            return NodeExecutionResult::failure(format!(
                "unknown system type: {}",
                cfg.system_type.as_deref().unwrap_or("<missing>")
            ))
            .started(begun);
        };

        let result = match cfg.timeout_seconds {
            Some(seconds) if seconds > 0 => {
                match tokio::time::timeout(
                    Duration::from_secs(seconds),
                    self.dispatch(kind, &cfg, ctx),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return NodeExecutionResult::timeout(format!(
                            "{} operation exceeded {seconds}s",
                            kind.as_str()
                        ))
                        .started(begun)
                    }
                }
            }
            _ => self.dispatch(kind, &cfg, ctx).await,
        };

        match result {
            Ok(output) => NodeExecutionResult::success(output).started(begun),
            Err(e) => NodeExecutionResult::failure(format!(
                "{} operation failed: {e}",
                kind.as_str()
            ))
            .started(begun),
        }
    }

    fn node_type(&self) -> &str {
        "system"
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> NodeResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(NodeError::Config(format!("{what} must not be blank"))),
    }
}

fn operation_output(kind: &str, fields: &[(&str, Value)]) -> Map<String, Value> {
    let mut output = Map::new();
    output.insert("systemType".into(), json!(kind));
    for (key, value) in fields {
        output.insert((*key).into(), value.clone());
    }
    output
}
