use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::gateway::{GatewayClient, Method, ServiceTarget};

/// Thin adapters over the external boolean business checks usable inside a
/// condition node. Callers coerce any error from these to `false`.
#[derive(Clone)]
pub struct BusinessPredicateClient {
    gateway: Arc<dyn GatewayClient>,
}

impl BusinessPredicateClient {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        BusinessPredicateClient { gateway }
    }

    /// Whether the user holds the named permission.
    pub async fn user_has_permission(&self, user_id: i64, permission: &str) -> NodeResult<bool> {
        let data = self
            .gateway
            .call(
                ServiceTarget::Common,
                Method::Post,
                "/api/v1/permission/check",
                json!({ "userId": user_id, "permission": permission }),
            )
            .await?;
        as_bool(&data)
    }

    /// Whether the device's reported status matches the expected one,
    /// case-insensitively.
    pub async fn device_status_matches(
        &self,
        device_id: &str,
        expected_status: &str,
    ) -> NodeResult<bool> {
        let data = self
            .gateway
            .call(
                ServiceTarget::Device,
                Method::Get,
                &format!("/api/v1/device/{device_id}/status"),
                Value::Null,
            )
            .await?;
        let actual = data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Gateway("device status response missing status".into()))?;
        Ok(actual.eq_ignore_ascii_case(expected_status))
    }

    /// Whether the user may access the area with the named permission.
    pub async fn user_has_area_access(
        &self,
        user_id: i64,
        area_id: &str,
        permission: &str,
    ) -> NodeResult<bool> {
        let data = self
            .gateway
            .call(
                ServiceTarget::Common,
                Method::Post,
                "/api/v1/area/check-access",
                json!({ "userId": user_id, "areaId": area_id, "permission": permission }),
            )
            .await?;
        as_bool(&data)
    }
}

fn as_bool(data: &Value) -> NodeResult<bool> {
    data.as_bool()
        .ok_or_else(|| NodeError::Gateway(format!("expected boolean response, got {data}")))
}
