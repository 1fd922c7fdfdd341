//! Payment transaction types.
//!
//! A [`PaymentTransaction`] is created as `pending` when a checkout session is
//! opened with the payment processor and moves exactly once to `completed` or
//! `failed` when the processor's webhook is reconciled.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

pub const METADATA_ACCOUNT_ID: &str = "account_id";
pub const METADATA_PACKAGE_ID: &str = "package_id";
pub const METADATA_TOKEN_AMOUNT: &str = "token_amount";
pub const METADATA_COUPON_CODE: &str = "coupon_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            PaymentStatus::Pending => false,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded => true,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ParseEnumError::new("payment status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i32,
    pub account_id: i32,
    /// Checkout session id assigned by the payment processor (unique)
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    /// Charged amount in minor currency units, after discount
    pub amount: i64,
    pub currency: String,
    pub package_id: Option<i32>,
    pub token_amount: i64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
    pub discount_amount: i64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Data embedded in a checkout session and read back by the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub account_id: i32,
    pub package_id: i32,
    pub token_amount: i64,
    pub coupon_code: Option<String>,
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(METADATA_ACCOUNT_ID.to_string(), self.account_id.to_string());
        map.insert(METADATA_PACKAGE_ID.to_string(), self.package_id.to_string());
        map.insert(
            METADATA_TOKEN_AMOUNT.to_string(),
            self.token_amount.to_string(),
        );
        map.insert(
            METADATA_COUPON_CODE.to_string(),
            self.coupon_code.clone().unwrap_or_default(),
        );
        map
    }

    /// Parse metadata back out of a session. Returns `None` when the account
    /// or token amount is missing, unparsable or zero.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let account_id = map.get(METADATA_ACCOUNT_ID)?.parse::<i32>().ok()?;
        let token_amount = map.get(METADATA_TOKEN_AMOUNT)?.parse::<i64>().ok()?;
        if account_id <= 0 || token_amount <= 0 {
            return None;
        }
        let package_id = map
            .get(METADATA_PACKAGE_ID)
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or_default();
        let coupon_code = map
            .get(METADATA_COUPON_CODE)
            .filter(|code| !code.is_empty())
            .cloned();
        Some(Self {
            account_id,
            package_id,
            token_amount,
            coupon_code,
        })
    }
}
