//! Egress traffic readings

use rentbill_common::{Timestamp, BYTES_PER_GB};
use serde::{Deserialize, Serialize};

/// Provider reading of cumulative egress since purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficReading {
    /// Not provider-backed, call failed, or the provider had no data
    #[default]
    Unknown,
    Bytes(u64),
}

impl TrafficReading {
    pub fn from_option(bytes: Option<u64>) -> Self {
        bytes.map_or(TrafficReading::Unknown, TrafficReading::Bytes)
    }

    pub fn gigabytes(&self) -> Option<f64> {
        match self {
            TrafficReading::Unknown => None,
            TrafficReading::Bytes(b) => Some(*b as f64 / BYTES_PER_GB),
        }
    }
}

/// New usage figure to persist on the order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficUsage {
    pub used_gb: f64,
    pub ts: Timestamp,
}

impl TrafficUsage {
    /// Whether `limit_gb` (0 = unlimited) has been reached
    pub fn exceeds(&self, limit_gb: i64) -> bool {
        limit_gb > 0 && self.used_gb >= limit_gb as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gigabytes() {
        let reading = TrafficReading::Bytes(3 * 1024 * 1024 * 1024);
        assert_eq!(reading.gigabytes(), Some(3.0));
        assert_eq!(TrafficReading::from_option(None).gigabytes(), None);
    }

    #[test]
    fn test_exceeds() {
        let usage = TrafficUsage {
            used_gb: 101.0,
            ts: 0,
        };
        assert!(usage.exceeds(100));
        assert!(!usage.exceeds(0));
        assert!(!usage.exceeds(200));
    }
}
