use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::gateway::{GatewayClient, Method, ServiceTarget};

/// Base URLs and connection settings for the HTTP gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common_base_url: String,
    pub device_base_url: String,
    pub oa_base_url: String,
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            common_base_url: "http://localhost:8080".into(),
            device_base_url: "http://localhost:8081".into(),
            oa_base_url: "http://localhost:8082".into(),
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
        }
    }
}

/// [`GatewayClient`] over HTTP. Responses are expected in the platform
/// envelope `{code, ok, data, message}`; a non-ok envelope is a gateway
/// error carrying the downstream message.
#[derive(Debug)]
pub struct HttpGatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpGatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        HttpGatewayClient { client, config }
    }

    fn base_url(&self, service: ServiceTarget) -> &str {
        match service {
            ServiceTarget::Common => &self.config.common_base_url,
            ServiceTarget::Device => &self.config.device_base_url,
            ServiceTarget::Oa => &self.config.oa_base_url,
        }
    }
}

impl Default for HttpGatewayClient {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn call(
        &self,
        service: ServiceTarget,
        method: Method,
        path: &str,
        body: Value,
    ) -> NodeResult<Value> {
        let url = format!("{}{}", self.base_url(service).trim_end_matches('/'), path);

        let request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url).json(&body),
        };

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Gateway(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NodeError::Gateway(format!(
                "{url} returned status {status}"
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Gateway(format!("invalid response from {url}: {e}")))?;

        let ok = envelope.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if !ok {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("downstream call not ok");
            return Err(NodeError::Gateway(format!("{url}: {message}")));
        }

        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_route_by_service() {
        let client = HttpGatewayClient::new(GatewayConfig {
            common_base_url: "http://common".into(),
            device_base_url: "http://device/".into(),
            oa_base_url: "http://oa".into(),
            ..GatewayConfig::default()
        });
        assert_eq!(client.base_url(ServiceTarget::Common), "http://common");
        assert_eq!(client.base_url(ServiceTarget::Device), "http://device/");
        assert_eq!(client.base_url(ServiceTarget::Oa), "http://oa");
    }
}
