use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ParseEnumError, payments::PaymentStatus};

/// Kind of balance change recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Usage,
    Refund,
    Bonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Usage => "usage",
            TransactionKind::Refund => "refund",
            TransactionKind::Bonus => "bonus",
        }
    }

    /// Whether amounts of this kind add to the balance.
    pub fn is_credit(&self) -> bool {
        match self {
            TransactionKind::Purchase | TransactionKind::Refund | TransactionKind::Bonus => true,
            TransactionKind::Usage => false,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionKind::Purchase),
            "usage" => Ok(TransactionKind::Usage),
            "refund" => Ok(TransactionKind::Refund),
            "bonus" => Ok(TransactionKind::Bonus),
            other => Err(ParseEnumError::new("transaction kind", other)),
        }
    }
}

/// Immutable record of a single balance change.
///
/// `balance_after == balance_before + amount` holds for every row written by
/// the ledger store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i32,
    pub account_id: i32,
    pub kind: TransactionKind,
    /// Signed amount: positive for credits, negative for usage
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub package_id: Option<i32>,
    pub render_job_id: Option<i32>,
    pub price_in_cents: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}

impl LedgerTransaction {
    pub fn is_consistent(&self) -> bool {
        self.balance_before + self.amount == self.balance_after
    }
}

/// Rebuild a balance from the initial grant and a creation-ordered log.
pub fn replay_balance<'a>(
    initial_balance: i64,
    transactions: impl IntoIterator<Item = &'a LedgerTransaction>,
) -> i64 {
    transactions
        .into_iter()
        .fold(initial_balance, |balance, tx| balance + tx.amount)
}
