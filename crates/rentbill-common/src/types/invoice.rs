//! Invoices - immutable audit records of balance changes

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// How a balance change was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceMethod {
    Wallet,
    Card,
}

/// Settlement status; only receipt-based flows move it after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Rejected,
}

/// Invoice to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub user_id: i64,
    /// Signed amount; debits are negative
    pub amount: i64,
    pub method: InvoiceMethod,
    pub description: String,
    pub status: InvoiceStatus,
    pub order_id: Option<i64>,
}

impl NewInvoice {
    /// Paid wallet debit linked to an order
    pub fn wallet_debit(
        user_id: i64,
        order_id: i64,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount: -amount.abs(),
            method: InvoiceMethod::Wallet,
            description: description.into(),
            status: InvoiceStatus::Paid,
            order_id: Some(order_id),
        }
    }
}

/// Recorded invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub method: InvoiceMethod,
    pub description: String,
    pub status: InvoiceStatus,
    pub created_at: Timestamp,
    pub order_id: Option<i64>,
}

impl Invoice {
    pub fn from_new(id: i64, created_at: Timestamp, new: NewInvoice) -> Self {
        Self {
            id,
            user_id: new.user_id,
            amount: new.amount,
            method: new.method,
            description: new.description,
            status: new.status,
            created_at,
            order_id: new.order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_debit_is_negative() {
        let invoice = NewInvoice::wallet_debit(7, 3, 1000, "Hourly charge order#3 (2h)");
        assert_eq!(invoice.amount, -1000);
        assert_eq!(invoice.order_id, Some(3));
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let recorded = Invoice::from_new(1, 100, invoice);
        assert_eq!(recorded.amount, -1000);
        assert_eq!(recorded.created_at, 100);
    }
}
