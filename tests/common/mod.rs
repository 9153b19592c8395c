//! Shared test fixtures: an in-memory gateway that records calls and
//! answers from a configurable handler.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use opsflow::{GatewayClient, Method, NodeError, NodeResult, ServiceTarget};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub service: ServiceTarget,
    pub method: Method,
    pub path: String,
    pub body: Value,
}

type Handler = dyn Fn(ServiceTarget, &str, &Value) -> NodeResult<Value> + Send + Sync;

pub struct MockGateway {
    calls: Mutex<Vec<RecordedCall>>,
    handler: Box<Handler>,
}

impl MockGateway {
    pub fn new(
        handler: impl Fn(ServiceTarget, &str, &Value) -> NodeResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(MockGateway {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    /// Gateway that answers every call with an empty-object payload.
    pub fn ok() -> Arc<Self> {
        Self::new(|_, _, _| Ok(json!({})))
    }

    /// Gateway whose approval decisions are all positive.
    pub fn approving() -> Arc<Self> {
        Self::new(|_, path, _| {
            if path.contains("/approval/process") {
                Ok(json!({ "approved": true, "status": "approved" }))
            } else {
                Ok(json!({}))
            }
        })
    }

    /// Gateway where every call fails.
    pub fn failing(message: &str) -> Arc<Self> {
        let message = message.to_string();
        Self::new(move |_, _, _| Err(NodeError::Gateway(message.clone())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.path.clone()).collect()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn call(
        &self,
        service: ServiceTarget,
        method: Method,
        path: &str,
        body: Value,
    ) -> NodeResult<Value> {
        self.calls.lock().push(RecordedCall {
            service,
            method,
            path: path.to_string(),
            body: body.clone(),
        });
        (self.handler)(service, path, &body)
    }
}
