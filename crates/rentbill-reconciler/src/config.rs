//! Reconciler configuration
//!
//! Layered, lowest to highest priority: built-in defaults, an optional
//! `rentbill.toml` in the working directory, then `RENTBILL__*`
//! environment variables (`RENTBILL__SCHEDULER__INTERVAL_SECS=60`).
//! A `.env` file is loaded into the environment first.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconciler service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub scheduler: SchedulerSettings,
    pub storage: StorageSettings,
    pub hcloud: HcloudSettings,
    pub telegram: TelegramSettings,
}

impl ReconcilerConfig {
    /// Load configuration from `.env`, `rentbill.toml` and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("rentbill").required(false))
            .add_source(
                config::Environment::with_prefix("RENTBILL")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("telegram.operator_ids")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        settings
            .try_deserialize()
            .context("Invalid reconciler configuration")
    }
}

/// Timing of the reconciliation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between passes
    pub interval_secs: u64,
    /// Sleep after a failed pass
    pub error_backoff_secs: u64,
    /// Upper bound for a single provider call
    pub call_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_backoff_secs: 60,
            call_timeout_secs: 30,
        }
    }
}

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Which ledger backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Redis,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub redis_url: String,
    /// Key prefix for every Redis key
    pub key_prefix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "rentbill".to_string(),
        }
    }
}

/// Hetzner Cloud API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HcloudSettings {
    pub token: String,
    pub base_url: String,
}

impl Default for HcloudSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: rentbill_hcloud::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Telegram notification channel; notifications are only logged without a token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub operator_ids: Vec<i64>,
    pub api_base: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            operator_ids: Vec::new(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}
