//! Payment session manager: prices a token package, opens an external
//! checkout session and records the pending payment it will reconcile.

pub mod stripe;

use std::{collections::HashMap, sync::Arc};

use archrender_types::{
    Account, CheckoutMetadata, Coupon, CouponRejection, DiscountType, TokenPackage, now_millis,
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    db::{DbManager, NewPaymentTransaction},
    error::{ServiceError, ServiceResult},
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment processor is not configured")]
    NotConfigured,
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),
    #[error("Payment processor error: {0}")]
    Processor(String),
    #[error("Checkout session {0} has no redirect URL")]
    MissingUrl(String),
}

/// Everything the processor needs to open a hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub product_name: String,
    pub product_description: String,
    /// Charged amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub client_reference_id: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub payment_intent_id: Option<String>,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub checkout_url: String,
    pub amount: i64,
    pub discount_amount: i64,
    pub currency: String,
}

/// Answer to a coupon validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponCheck {
    pub code: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<i64>,
    /// Present when a package was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_price: Option<i64>,
}

#[derive(Clone)]
pub struct PaymentSessionManager {
    db: Arc<DbManager>,
    gateway: Arc<dyn CheckoutGateway>,
    config: Arc<AppConfig>,
}

impl PaymentSessionManager {
    pub fn new(db: Arc<DbManager>, gateway: Arc<dyn CheckoutGateway>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            gateway,
            config,
        }
    }

    pub fn list_packages(&self) -> ServiceResult<Vec<TokenPackage>> {
        Ok(self.db.list_active_packages()?)
    }

    fn active_package(&self, package_id: i32) -> ServiceResult<TokenPackage> {
        self.db
            .find_package(package_id)?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Token package {}", package_id)))
    }

    /// A coupon that may be applied right now, if any.
    fn applicable_coupon(&self, code: &str) -> ServiceResult<Result<Coupon, CouponRejection>> {
        let Some(coupon) = self.db.find_coupon(code)? else {
            return Ok(Err(CouponRejection::NotFound));
        };
        Ok(coupon.validate(now_millis()).map(|_| coupon))
    }

    pub fn validate_coupon(&self, code: &str, package_id: Option<i32>) -> ServiceResult<CouponCheck> {
        let code = archrender_types::coupons::normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::InvalidInput("Coupon code is required".to_string()));
        }
        let package = package_id.map(|id| self.active_package(id)).transpose()?;

        match self.applicable_coupon(&code)? {
            Ok(coupon) => {
                let discount_amount = package
                    .as_ref()
                    .map(|p| coupon.compute_discount(p.price_in_cents));
                let final_price = package
                    .as_ref()
                    .zip(discount_amount)
                    .map(|(p, d)| (p.price_in_cents - d).max(0));
                Ok(CouponCheck {
                    code: coupon.code,
                    valid: true,
                    reason: None,
                    discount_type: Some(coupon.discount_type),
                    discount_value: Some(coupon.discount_value),
                    discount_amount,
                    final_price,
                })
            }
            Err(rejection) => Ok(CouponCheck {
                code,
                valid: false,
                reason: Some(rejection.as_str()),
                discount_type: None,
                discount_value: None,
                discount_amount: None,
                final_price: None,
            }),
        }
    }

    /// Opens a checkout session for `package_id`. An unusable coupon is
    /// dropped and the full price is charged.
    pub async fn create_checkout(
        &self,
        account: &Account,
        package_id: i32,
        coupon_code: Option<&str>,
    ) -> ServiceResult<CheckoutRedirect> {
        let package = self.active_package(package_id)?;

        let requested_code = coupon_code.map(str::trim).filter(|c| !c.is_empty());
        let (applied_code, discount_amount) = match requested_code {
            Some(code) => match self.applicable_coupon(code)? {
                Ok(coupon) => {
                    let discount = coupon.compute_discount(package.price_in_cents);
                    (Some(coupon.code), discount)
                }
                Err(rejection) => {
                    warn!(
                        account_id = account.id,
                        "Ignoring coupon {} at checkout: {}", code, rejection
                    );
                    (None, 0)
                }
            },
            None => (None, 0),
        };
        let amount = (package.price_in_cents - discount_amount).max(0);

        let metadata = CheckoutMetadata {
            account_id: account.id,
            package_id: package.id,
            token_amount: package.token_amount,
            coupon_code: applied_code.clone(),
        };
        let request = CheckoutSessionRequest {
            product_name: package.name.clone(),
            product_description: format!(
                "{} tokens for architectural rendering",
                package.token_amount
            ),
            amount,
            currency: self.config.currency.clone(),
            success_url: self.config.checkout_success_url(),
            cancel_url: self.config.checkout_cancel_url(),
            customer_email: account.email.clone(),
            client_reference_id: account.id.to_string(),
            metadata: metadata.to_map(),
        };

        let session = self.gateway.create_session(&request).await.map_err(|e| {
            ServiceError::Internal(format!("Checkout session creation failed: {}", e))
        })?;

        self.db
            .insert_payment_transaction(&NewPaymentTransaction::pending(
                account.id,
                session.id.clone(),
                session.payment_intent_id.clone(),
                amount,
                &self.config.currency,
                package.id,
                package.token_amount,
                applied_code,
                discount_amount,
            ))?;

        info!(
            account_id = account.id,
            "Checkout session {} opened for package {} ({} {})",
            session.id,
            package.id,
            amount,
            self.config.currency
        );
        Ok(CheckoutRedirect {
            session_id: session.id,
            checkout_url: session.url,
            amount,
            discount_amount,
            currency: self.config.currency.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{path::PathBuf, sync::Mutex};

    use archrender_types::{
        CouponSpec, PaymentStatus, TokenPackageSpec, payments::METADATA_COUPON_CODE,
    };
    use url::Url;

    use super::*;
    use crate::db::test_support::{account_with_balance, temp_db};

    /// Records requests and hands out sequential session ids.
    #[derive(Default)]
    pub(crate) struct RecordingGateway {
        pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    }

    #[async_trait]
    impl CheckoutGateway for RecordingGateway {
        async fn create_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession, GatewayError> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            let id = format!("cs_test_{}", requests.len());
            Ok(CheckoutSession {
                url: format!("https://checkout.test/{}", id),
                id,
                payment_intent_id: None,
            })
        }
    }

    pub(crate) fn test_config() -> AppConfig {
        AppConfig::new(
            "unused",
            Url::parse("https://render.test").unwrap(),
            PathBuf::from("/tmp"),
        )
    }

    pub(crate) fn seed_catalog(db: &DbManager) -> i32 {
        let basic = db
            .upsert_package(&TokenPackageSpec {
                name: "Basic".to_string(),
                token_amount: 10,
                price_in_cents: 9000,
                price_per_token: Some(900),
                display_order: 2,
                active: true,
            })
            .unwrap();
        for (code, discount_type, value, max_uses, active) in [
            ("WELCOME10", DiscountType::Percentage, 10, None, true),
            ("RETIRED", DiscountType::Fixed, 5000, None, false),
            ("ONCE", DiscountType::Fixed, 1000, Some(0), true),
        ] {
            db.upsert_coupon(&CouponSpec {
                code: code.to_string(),
                discount_type,
                discount_value: value,
                max_uses,
                expires_at: None,
                active,
            })
            .unwrap();
        }
        basic
    }

    fn manager(db: Arc<DbManager>, gateway: Arc<RecordingGateway>) -> PaymentSessionManager {
        PaymentSessionManager::new(db, gateway, Arc::new(test_config()))
    }

    #[tokio::test]
    async fn test_checkout_with_percentage_coupon() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let package_id = seed_catalog(&db);
        let account = account_with_balance(&db, "alice", 3);
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(db.clone(), gateway.clone());

        let redirect = manager
            .create_checkout(&account, package_id, Some("welcome10"))
            .await
            .unwrap();
        assert_eq!(redirect.amount, 8100);
        assert_eq!(redirect.discount_amount, 900);
        assert_eq!(redirect.checkout_url, "https://checkout.test/cs_test_1");

        let payment = db.find_payment_by_session("cs_test_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 8100);
        assert_eq!(payment.discount_amount, 900);
        assert_eq!(payment.token_amount, 10);
        assert_eq!(payment.coupon_code.as_deref(), Some("WELCOME10"));
        assert_eq!(payment.currency, "brl");

        let requests = gateway.requests.lock().unwrap();
        let metadata = CheckoutMetadata::from_map(&requests[0].metadata).unwrap();
        assert_eq!(metadata.account_id, account.id);
        assert_eq!(metadata.package_id, package_id);
        assert_eq!(metadata.token_amount, 10);
        assert_eq!(metadata.coupon_code.as_deref(), Some("WELCOME10"));
        assert_eq!(
            requests[0].success_url,
            "https://render.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    /// Unusable coupons do not block checkout; the full price is charged.
    #[tokio::test]
    async fn test_invalid_coupon_is_ignored_at_checkout() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let package_id = seed_catalog(&db);
        let account = account_with_balance(&db, "bob", 3);
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(db.clone(), gateway.clone());

        for code in ["RETIRED", "ONCE", "NOSUCHCODE"] {
            let redirect = manager
                .create_checkout(&account, package_id, Some(code))
                .await
                .unwrap();
            assert_eq!(redirect.amount, 9000, "{}", code);
            assert_eq!(redirect.discount_amount, 0);
            let payment = db
                .find_payment_by_session(&redirect.session_id)
                .unwrap()
                .unwrap();
            assert!(payment.coupon_code.is_none());
        }
        let requests = gateway.requests.lock().unwrap();
        assert!(requests
            .iter()
            .all(|r| r.metadata.get(METADATA_COUPON_CODE).map(String::as_str) == Some("")));
    }

    #[tokio::test]
    async fn test_checkout_unknown_or_inactive_package() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        seed_catalog(&db);
        let retired = db
            .upsert_package(&TokenPackageSpec {
                name: "Retired".to_string(),
                token_amount: 1,
                price_in_cents: 100,
                price_per_token: None,
                display_order: 9,
                active: false,
            })
            .unwrap();
        let account = account_with_balance(&db, "carol", 3);
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(db.clone(), gateway.clone());

        for package_id in [retired, 4242] {
            let err = manager
                .create_checkout(&account, package_id, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }
        assert!(gateway.requests.lock().unwrap().is_empty());
        assert!(db.list_payments(account.id).unwrap().is_empty());
    }

    #[test]
    fn test_validate_coupon() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let package_id = seed_catalog(&db);
        let manager = manager(db, Arc::new(RecordingGateway::default()));

        let check = manager.validate_coupon("welcome10", Some(package_id)).unwrap();
        assert!(check.valid);
        assert_eq!(check.code, "WELCOME10");
        assert_eq!(check.discount_type, Some(DiscountType::Percentage));
        assert_eq!(check.discount_amount, Some(900));
        assert_eq!(check.final_price, Some(8100));

        let check = manager.validate_coupon("retired", None).unwrap();
        assert!(!check.valid);
        assert_eq!(check.reason, Some("inactive"));

        let check = manager.validate_coupon("once", None).unwrap();
        assert_eq!(check.reason, Some("exhausted"));

        let check = manager.validate_coupon("missing", None).unwrap();
        assert_eq!(check.reason, Some("not_found"));

        assert!(matches!(
            manager.validate_coupon("  ", None),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
