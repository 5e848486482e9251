//! Margin policy loaded from the settings store
//!
//! The admin panel owns the write path; this module only reads. Each
//! field falls back to its default when absent or unparsable, so a bad
//! setting never blocks pricing.

use rentbill_common::gateway::SettingsStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings keys
pub const KEY_EXCHANGE_RATE: &str = "pricing_exchange_rate";
pub const KEY_MARGIN_MODE: &str = "pricing_margin_mode";
pub const KEY_FLAT_PCT: &str = "pricing_margin_flat_pct";
pub const KEY_LOW_PCT: &str = "pricing_margin_low_pct";
pub const KEY_HIGH_PCT: &str = "pricing_margin_high_pct";
pub const KEY_THRESHOLD: &str = "pricing_margin_threshold";

/// How the margin percentage is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    /// Same percentage for every plan
    Flat,
    /// `low_pct` up to the monthly threshold, `high_pct` above it
    Tiered,
}

impl MarginMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "flat" => Some(MarginMode::Flat),
            "tiered" => Some(MarginMode::Tiered),
            _ => None,
        }
    }
}

/// Process-wide pricing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Retail minor units per wholesale currency unit
    pub exchange_rate: Decimal,
    pub mode: MarginMode,
    pub flat_pct: Decimal,
    pub low_pct: Decimal,
    pub high_pct: Decimal,
    /// Monthly wholesale price separating the low and high tiers
    pub threshold: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            exchange_rate: dec!(160000),
            mode: MarginMode::Tiered,
            flat_pct: dec!(15),
            low_pct: dec!(15),
            high_pct: dec!(8),
            threshold: dec!(10),
        }
    }
}

impl PricingPolicy {
    /// Read the current policy; never fails
    pub async fn load(settings: &dyn SettingsStore) -> Self {
        let defaults = Self::default();

        let mode = match read(settings, KEY_MARGIN_MODE).await {
            Some(raw) => MarginMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown margin mode, using default");
                defaults.mode
            }),
            None => defaults.mode,
        };

        let policy = Self {
            exchange_rate: read_decimal(settings, KEY_EXCHANGE_RATE, defaults.exchange_rate).await,
            mode,
            flat_pct: read_decimal(settings, KEY_FLAT_PCT, defaults.flat_pct).await,
            low_pct: read_decimal(settings, KEY_LOW_PCT, defaults.low_pct).await,
            high_pct: read_decimal(settings, KEY_HIGH_PCT, defaults.high_pct).await,
            threshold: read_decimal(settings, KEY_THRESHOLD, defaults.threshold).await,
        };
        debug!(?policy, "Loaded pricing policy");
        policy
    }
}

async fn read(settings: &dyn SettingsStore, key: &str) -> Option<String> {
    match settings.get_setting(key).await {
        Ok(value) => value.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to read pricing setting");
            None
        }
    }
}

async fn read_decimal(settings: &dyn SettingsStore, key: &str, default: Decimal) -> Decimal {
    match read(settings, key).await {
        Some(raw) => raw.trim().parse::<Decimal>().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparsable pricing setting, using default");
            default
        }),
        None => default,
    }
}
