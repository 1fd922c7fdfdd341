use archrender_types::{LedgerTransaction, PaymentTransaction, TokenPackage};
use axum::{Extension, Json};
use serde::Deserialize;

use super::{AppState, CurrentAccount, ListResponse};
use crate::{
    checkout::{CheckoutRedirect, CouponCheck},
    error::ServiceResult,
};

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    #[serde(default)]
    pub package_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub package_id: i32,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// GET /api/tokens/packages - public
pub async fn list_packages(
    Extension(state): Extension<AppState>,
) -> ServiceResult<Json<ListResponse<TokenPackage>>> {
    let packages = state.payments.list_packages()?;
    Ok(Json(ListResponse::new("/api/tokens/packages", packages)))
}

/// GET /api/tokens/transactions
pub async fn list_transactions(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ServiceResult<Json<ListResponse<LedgerTransaction>>> {
    let transactions = state.db.list_ledger_transactions(account.id)?;
    Ok(Json(ListResponse::new("/api/tokens/transactions", transactions)))
}

/// POST /api/coupons/validate
pub async fn validate_coupon(
    Extension(state): Extension<AppState>,
    CurrentAccount(_account): CurrentAccount,
    Json(request): Json<ValidateCouponRequest>,
) -> ServiceResult<Json<CouponCheck>> {
    Ok(Json(
        state
            .payments
            .validate_coupon(&request.code, request.package_id)?,
    ))
}

/// POST /api/checkout
pub async fn create_checkout(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<CreateCheckoutRequest>,
) -> ServiceResult<Json<CheckoutRedirect>> {
    let redirect = state
        .payments
        .create_checkout(&account, request.package_id, request.coupon_code.as_deref())
        .await?;
    Ok(Json(redirect))
}

/// GET /api/payments
pub async fn list_payments(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ServiceResult<Json<ListResponse<PaymentTransaction>>> {
    let payments = state.db.list_payments(account.id)?;
    Ok(Json(ListResponse::new("/api/payments", payments)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::tests::{get_as, json_body, post_json_as, test_app};

    #[tokio::test]
    async fn test_checkout_then_list_payments() {
        let app = test_app();
        let response = app
            .send(post_json_as(
                "/api/checkout",
                "alice",
                json!({"package_id": app.package_id, "coupon_code": "welcome10"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let redirect = json_body(response).await;
        assert_eq!(redirect["amount"], 8100);
        assert_eq!(redirect["discount_amount"], 900);
        assert_eq!(redirect["currency"], "brl");
        assert!(
            redirect["checkout_url"]
                .as_str()
                .unwrap()
                .starts_with("https://checkout.test/")
        );

        let payments = json_body(app.send(get_as("/api/payments", "alice")).await).await;
        assert_eq!(payments["data"][0]["status"], "pending");
        assert_eq!(payments["data"][0]["session_id"], redirect["session_id"]);
        assert_eq!(payments["data"][0]["coupon_code"], "WELCOME10");
    }

    #[tokio::test]
    async fn test_checkout_for_unknown_package_is_404() {
        let app = test_app();
        let response = app
            .send(post_json_as(
                "/api/checkout",
                "alice",
                json!({"package_id": 4242}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_coupon() {
        let app = test_app();
        let body = json_body(
            app.send(post_json_as(
                "/api/coupons/validate",
                "alice",
                json!({"code": " welcome10 ", "package_id": app.package_id}),
            ))
            .await,
        )
        .await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["code"], "WELCOME10");
        assert_eq!(body["discount_type"], "percentage");
        assert_eq!(body["final_price"], 8100);

        let body = json_body(
            app.send(post_json_as(
                "/api/coupons/validate",
                "alice",
                json!({"code": "retired"}),
            ))
            .await,
        )
        .await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["reason"], "inactive");
    }

    #[tokio::test]
    async fn test_transactions_start_empty() {
        let app = test_app();
        let body = json_body(app.send(get_as("/api/tokens/transactions", "alice")).await).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }
}
