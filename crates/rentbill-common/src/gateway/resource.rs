//! Resource control gateway - the compute provider

use crate::{GatewayError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Power state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Running,
    Off,
    Starting,
    Stopping,
    Deleting,
    /// Provider reported a state we do not model
    Other(String),
}

impl ResourceStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "running" => ResourceStatus::Running,
            "off" => ResourceStatus::Off,
            "starting" | "initializing" => ResourceStatus::Starting,
            "stopping" => ResourceStatus::Stopping,
            "deleting" => ResourceStatus::Deleting,
            other => ResourceStatus::Other(other.to_string()),
        }
    }
}

/// Operations invoked on the compute provider.
///
/// Every call can fail on its own; callers bound them with a timeout and
/// never let a failure abort a reconciliation pass.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    async fn get_status(&self, resource_id: i64) -> Result<ResourceStatus, GatewayError>;

    async fn power_on(&self, resource_id: i64) -> Result<(), GatewayError>;

    async fn power_off(&self, resource_id: i64) -> Result<(), GatewayError>;

    /// Delete the resource; an already missing resource counts as deleted
    async fn delete(&self, resource_id: i64) -> Result<(), GatewayError>;

    /// Egress bytes between `start` and `end`; `None` when the provider has no reading
    async fn get_egress_bytes(
        &self,
        resource_id: i64,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Option<u64>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(ResourceStatus::parse("running"), ResourceStatus::Running);
        assert_eq!(ResourceStatus::parse("off"), ResourceStatus::Off);
        assert_eq!(
            ResourceStatus::parse("rebuilding"),
            ResourceStatus::Other("rebuilding".into())
        );
    }
}
