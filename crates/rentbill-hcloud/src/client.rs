//! Hetzner Cloud HTTP client

use crate::metrics::sum_network_out;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use rentbill_common::{
    gateway::{ResourceGateway, ResourceStatus},
    GatewayError, Timestamp,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.hetzner.cloud/v1";

/// Metrics resolution in seconds
const METRICS_STEP_SECS: u32 = 3600;

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ServerBody,
}

#[derive(Debug, Deserialize)]
struct ServerBody {
    status: String,
}

/// Resource gateway over the Hetzner Cloud API
pub struct HcloudGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HcloudGateway {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL, Duration::from_secs(30))
    }

    pub fn with_base_url(token: impl Into<String>, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, GatewayError> {
        if self.token.is_empty() {
            return Err(GatewayError::Permanent("hcloud token is not configured".into()));
        }

        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)
    }

    async fn power_action(&self, resource_id: i64, action: &str) -> Result<(), GatewayError> {
        let path = format!("/servers/{}/actions/{}", resource_id, action);
        let response = self.send(Method::POST, &path, &[]).await?;
        ensure_success(response).await.map(|_| ())
    }
}

/// Transport-level failures are retried on the next pass, except for
/// responses we could not make sense of.
fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_decode() || err.is_builder() {
        GatewayError::Permanent(err.to_string())
    } else {
        GatewayError::Transient(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = format!("hcloud returned {}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Transient(message)
    } else {
        GatewayError::Permanent(message)
    }
}

async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn rfc3339(ts: Timestamp) -> Result<String, GatewayError> {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| GatewayError::Permanent(format!("timestamp {} out of range", ts)))
}

#[async_trait]
impl ResourceGateway for HcloudGateway {
    #[instrument(skip(self))]
    async fn get_status(&self, resource_id: i64) -> Result<ResourceStatus, GatewayError> {
        let path = format!("/servers/{}", resource_id);
        let response = ensure_success(self.send(Method::GET, &path, &[]).await?).await?;
        let envelope: ServerEnvelope = response.json().await.map_err(classify_transport)?;
        Ok(ResourceStatus::parse(&envelope.server.status))
    }

    #[instrument(skip(self))]
    async fn power_on(&self, resource_id: i64) -> Result<(), GatewayError> {
        self.power_action(resource_id, "poweron").await
    }

    #[instrument(skip(self))]
    async fn power_off(&self, resource_id: i64) -> Result<(), GatewayError> {
        self.power_action(resource_id, "poweroff").await
    }

    #[instrument(skip(self))]
    async fn delete(&self, resource_id: i64) -> Result<(), GatewayError> {
        let path = format!("/servers/{}", resource_id);
        let response = self.send(Method::DELETE, &path, &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(resource_id, "Server already gone");
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn get_egress_bytes(
        &self,
        resource_id: i64,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Option<u64>, GatewayError> {
        let path = format!("/servers/{}/metrics", resource_id);
        let query = [
            ("type", "network".to_string()),
            ("start", rfc3339(start)?),
            ("end", rfc3339(end)?),
            ("step", METRICS_STEP_SECS.to_string()),
        ];

        let response = ensure_success(self.send(Method::GET, &path, &query).await?).await?;
        let body: serde_json::Value = response.json().await.map_err(classify_transport)?;
        Ok(sum_network_out(&body))
    }
}
