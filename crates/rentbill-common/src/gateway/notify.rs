//! Notification sink

use crate::GatewayError;
use async_trait::async_trait;

/// Best-effort delivery of messages to order owners and operators
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: i64, message: &str) -> Result<(), GatewayError>;

    /// Fan out to every operator
    async fn notify_operators(&self, message: &str) -> Result<(), GatewayError>;
}
