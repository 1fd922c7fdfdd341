//! Domain types shared by the archrender service and CLI.
//!
//! Everything in this crate is plain data plus the pure business rules that
//! operate on it (coupon eligibility, discount math, render status
//! transitions). Persistence and I/O live in `archrender-core`.

pub mod accounts;
pub mod coupons;
pub mod ledger;
pub mod packages;
pub mod payments;
pub mod renders;

pub use accounts::{Account, Role, is_admin};
pub use coupons::{Coupon, CouponRejection, CouponSpec, DiscountType};
pub use ledger::{LedgerTransaction, TransactionKind};
pub use packages::{TokenPackage, TokenPackageSpec};
pub use payments::{CheckoutMetadata, PaymentStatus, PaymentTransaction};
pub use renders::{
    AdjustmentError, OutputFormat, RenderAdjustments, RenderJob, RenderOutcome, RenderStatus,
    SceneType,
};

/// Returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Current time as unix milliseconds, the timestamp unit used across the crate.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
