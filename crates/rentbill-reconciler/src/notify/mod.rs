//! Notification delivery and message texts
//!
//! - [`messages`]: renders user and operator texts for each transition
//! - [`TelegramNotifier`]: Bot API `sendMessage`
//! - [`LogNotifier`]: writes notifications to the log only

pub mod messages;
mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use rentbill_common::{gateway::Notifier, GatewayError};
use tracing::info;

/// Notifier used when no delivery channel is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(&self, user_id: i64, message: &str) -> Result<(), GatewayError> {
        info!(user_id, message, "User notification");
        Ok(())
    }

    async fn notify_operators(&self, message: &str) -> Result<(), GatewayError> {
        info!(message, "Operator notification");
        Ok(())
    }
}
