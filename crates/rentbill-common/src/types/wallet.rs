//! Wallet - prepaid balance in minor currency units
//!
//! Balances move only through signed deltas, never by writing a cached
//! value back. The version counter lets stores detect concurrent writers.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wallet operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Balance overflow")]
    Overflow,
}

/// Prepaid wallet of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,

    /// Balance in minor units
    pub balance: i64,

    /// Incremented on every mutation
    pub version: u64,

    /// Timestamp of last modification (unix seconds)
    pub updated_at: Timestamp,
}

impl Wallet {
    /// Create an empty wallet
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            balance: 0,
            version: 0,
            updated_at: crate::now_ts(),
        }
    }

    /// Create a wallet with an initial balance
    pub fn with_balance(user_id: i64, balance: i64) -> Self {
        let mut wallet = Self::new(user_id);
        wallet.balance = balance;
        wallet
    }

    /// Apply a signed delta, returning the new balance.
    ///
    /// The result may go negative; callers check coverage first.
    pub fn apply_delta(&mut self, delta: i64) -> Result<i64, WalletError> {
        self.balance = self
            .balance
            .checked_add(delta)
            .ok_or(WalletError::Overflow)?;
        self.version += 1;
        self.updated_at = crate::now_ts();
        Ok(self.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_delta() {
        let mut wallet = Wallet::with_balance(42, 100);
        assert_eq!(wallet.apply_delta(-30).unwrap(), 70);
        assert_eq!(wallet.apply_delta(50).unwrap(), 120);
        assert_eq!(wallet.apply_delta(-200).unwrap(), -80);
    }

    #[test]
    fn test_overflow_leaves_balance() {
        let mut wallet = Wallet::with_balance(42, 1);
        assert_eq!(wallet.apply_delta(i64::MAX), Err(WalletError::Overflow));
        assert_eq!(wallet.balance, 1);
        assert_eq!(wallet.version, 0);
    }

    #[test]
    fn test_version_increment() {
        let mut wallet = Wallet::new(42);

        wallet.apply_delta(10).unwrap();
        wallet.apply_delta(-5).unwrap();
        assert_eq!(wallet.version, 2);
    }
}
