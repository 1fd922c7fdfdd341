//! Discount coupons and the rules that decide whether they apply.
//!
//! [`Coupon::validate`] and [`Coupon::compute_discount`] are pure: they take
//! the coupon row and the current time and never touch storage. Usage counts
//! are incremented by the payment reconciler once a discounted payment
//! completes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the price
    Percentage,
    /// `discount_value` is an amount in minor currency units
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    /// Discount for `price_in_cents`, always within `0..=price_in_cents`.
    pub fn discount_for(&self, price_in_cents: i64, value: i64) -> i64 {
        let price = price_in_cents.max(0);
        let raw = match self {
            DiscountType::Percentage => price.saturating_mul(value) / 100,
            DiscountType::Fixed => value,
        };
        raw.clamp(0, price)
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(ParseEnumError::new("discount type", other)),
        }
    }
}

/// Why a coupon cannot be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("coupon does not exist")]
    NotFound,
    #[error("coupon is inactive")]
    Inactive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon has reached its usage limit")]
    Exhausted,
}

impl CouponRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "not_found",
            CouponRejection::Inactive => "inactive",
            CouponRejection::Expired => "expired",
            CouponRejection::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i32,
    /// Normalized (uppercase) code, unique
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// `None` means unlimited
    pub max_uses: Option<i64>,
    pub used_count: i64,
    /// Unix millis; `None` means the coupon never expires
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl Coupon {
    /// Eligibility check. Rules run in order: active flag, expiry, usage limit.
    pub fn validate(&self, now_millis: i64) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if let Some(expires_at) = self.expires_at {
            if now_millis > expires_at {
                return Err(CouponRejection::Expired);
            }
        }
        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Err(CouponRejection::Exhausted);
            }
        }
        Ok(())
    }

    pub fn compute_discount(&self, price_in_cents: i64) -> i64 {
        self.discount_type
            .discount_for(price_in_cents, self.discount_value)
    }
}

/// Codes are matched case-insensitively; storage keeps them uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Coupon definition as written in a catalog YAML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponSpec {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<i64>,
    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        Coupon {
            id: 1,
            code: "TEST".to_string(),
            discount_type,
            discount_value: value,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            is_active: true,
            created_at: 0,
        }
    }

    #[test]
    fn test_percentage_discount() {
        assert_eq!(
            coupon(DiscountType::Percentage, 15).compute_discount(10_000),
            1_500
        );
        assert_eq!(coupon(DiscountType::Percentage, 10).compute_discount(9_000), 900);
        // floor
        assert_eq!(coupon(DiscountType::Percentage, 15).compute_discount(999), 149);
    }

    #[test]
    fn test_fixed_discount_is_capped_at_price() {
        assert_eq!(
            coupon(DiscountType::Fixed, 50_000).compute_discount(10_000),
            10_000
        );
        assert_eq!(coupon(DiscountType::Fixed, 5_000).compute_discount(9_000), 5_000);
    }

    #[test]
    fn test_validate_rule_order() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.is_active = false;
        c.expires_at = Some(0);
        c.max_uses = Some(0);
        assert_eq!(c.validate(10), Err(CouponRejection::Inactive));

        c.is_active = true;
        assert_eq!(c.validate(10), Err(CouponRejection::Expired));

        c.expires_at = None;
        assert_eq!(c.validate(10), Err(CouponRejection::Exhausted));

        c.max_uses = None;
        assert_eq!(c.validate(10), Ok(()));
    }

    #[test]
    fn test_expiry_boundary() {
        let mut c = coupon(DiscountType::Fixed, 100);
        c.expires_at = Some(1_000);
        assert_eq!(c.validate(1_000), Ok(()));
        assert_eq!(c.validate(1_001), Err(CouponRejection::Expired));
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon(DiscountType::Fixed, 100);
        c.max_uses = Some(2);
        c.used_count = 1;
        assert_eq!(c.validate(0), Ok(()));
        c.used_count = 2;
        assert_eq!(c.validate(0), Err(CouponRejection::Exhausted));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  bemVindo10 "), "BEMVINDO10");
    }

    #[test]
    fn test_parse_coupon_spec() {
        let yaml = r#"
code: DESCONTO50
discount_type: fixed
discount_value: 5000
max_uses: 50
expires_at: 2025-12-31T00:00:00Z
"#;
        let spec: CouponSpec = serde_yml::from_str(yaml).unwrap();
        assert_eq!(spec.discount_type, DiscountType::Fixed);
        assert_eq!(spec.max_uses, Some(50));
        assert!(spec.active);
        assert!(spec.expires_at.is_some());
    }
}
