//! Telegram Bot API delivery

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rentbill_common::{gateway::Notifier, GatewayError};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Sends notifications as Telegram messages to users and operators
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    operator_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: &str, operator_ids: Vec<i64>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            operator_ids,
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), GatewayError> {
        let body = SendMessage {
            chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("telegram request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id, "Telegram message delivered");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let message = format!("telegram returned {}: {}", status, detail.trim());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(GatewayError::Transient(message))
        } else {
            Err(GatewayError::Permanent(message))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_user(&self, user_id: i64, message: &str) -> Result<(), GatewayError> {
        self.send(user_id, message).await
    }

    /// Delivers to every operator; returns the first failure after trying all
    async fn notify_operators(&self, message: &str) -> Result<(), GatewayError> {
        let mut first_err = None;
        for &operator in &self.operator_ids {
            if let Err(e) = self.send(operator, message).await {
                warn!(operator, error = %e, "Operator notification failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
