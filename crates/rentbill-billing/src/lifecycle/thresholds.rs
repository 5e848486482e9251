//! Wallet thresholds for hourly orders
//!
//! Read from the settings store at the start of every reconciliation pass
//! and passed down explicitly; nothing is cached between passes.

use rentbill_common::gateway::SettingsStore;
use rentbill_common::{RentbillError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const KEY_MIN_WALLET_TO_START_HOURLY: &str = "hourly_min_wallet_to_start";
pub const KEY_WARN_BALANCE: &str = "hourly_warn_balance";
pub const KEY_CUTOFF_BALANCE: &str = "hourly_cutoff_balance";
pub const KEY_WARN_INTERVAL_SECS: &str = "hourly_warn_interval_secs";
pub const KEY_DELETE_GRACE_SECS: &str = "hourly_delete_grace_secs";

/// Balance levels and intervals driving hourly orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingThresholds {
    /// Balance required to buy a new hourly order
    pub min_wallet_to_start_hourly: i64,
    /// At or below this balance the owner is warned (and resume is refused)
    pub warn_balance: i64,
    /// At or below this balance the order is suspended
    pub cutoff_balance: i64,
    /// Minimum seconds between two low-balance warnings
    pub warn_interval_secs: i64,
    /// Seconds between balance suspension and deletion
    pub delete_grace_secs: i64,
}

impl Default for BillingThresholds {
    fn default() -> Self {
        Self {
            min_wallet_to_start_hourly: 100_000,
            warn_balance: 20_000,
            cutoff_balance: 5_000,
            warn_interval_secs: 3600,
            delete_grace_secs: 24 * 3600,
        }
    }
}

impl BillingThresholds {
    /// Read thresholds, keeping the default for any absent or bad value
    pub async fn load(settings: &dyn SettingsStore) -> Self {
        let d = Self::default();
        Self {
            min_wallet_to_start_hourly: read_i64(
                settings,
                KEY_MIN_WALLET_TO_START_HOURLY,
                d.min_wallet_to_start_hourly,
            )
            .await,
            warn_balance: read_i64(settings, KEY_WARN_BALANCE, d.warn_balance).await,
            cutoff_balance: read_i64(settings, KEY_CUTOFF_BALANCE, d.cutoff_balance).await,
            warn_interval_secs: read_i64(settings, KEY_WARN_INTERVAL_SECS, d.warn_interval_secs)
                .await,
            delete_grace_secs: read_i64(settings, KEY_DELETE_GRACE_SECS, d.delete_grace_secs)
                .await,
        }
    }
}

async fn read_i64(settings: &dyn SettingsStore, key: &str, default: i64) -> i64 {
    match settings.get_setting(key).await {
        Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparsable threshold setting, using default");
            default
        }),
        Ok(None) => default,
        Err(e) => {
            warn!(key, error = %e, "Failed to read threshold setting");
            default
        }
    }
}

/// Purchase-time gate for new hourly orders
pub fn ensure_can_start_hourly(balance: i64, thresholds: &BillingThresholds) -> Result<()> {
    if balance < thresholds.min_wallet_to_start_hourly {
        return Err(RentbillError::InsufficientFunds {
            required: thresholds.min_wallet_to_start_hourly,
            available: balance,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapSettings(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl SettingsStore for MapSettings {
        async fn get_setting(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.get(key).map(|v| v.to_string()))
        }
    }

    #[test]
    fn test_start_gate() {
        let th = BillingThresholds::default();
        assert!(ensure_can_start_hourly(100_000, &th).is_ok());
        assert!(matches!(
            ensure_can_start_hourly(99_999, &th),
            Err(RentbillError::InsufficientFunds {
                required: 100_000,
                available: 99_999
            })
        ));
    }

    #[tokio::test]
    async fn test_load_with_overrides() {
        let settings = MapSettings(HashMap::from([
            (KEY_WARN_BALANCE, "30000"),
            (KEY_CUTOFF_BALANCE, "lots"),
        ]));
        let th = BillingThresholds::load(&settings).await;
        assert_eq!(th.warn_balance, 30_000);
        assert_eq!(th.cutoff_balance, 5_000);
        assert_eq!(th.delete_grace_secs, 86_400);
    }
}
