use axum::{Extension, Json, body::Bytes, http::HeaderMap};
use serde::Serialize;

use super::AppState;
use crate::{error::ServiceResult, webhook::WebhookOutcome};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

/// POST /api/webhooks/stripe
///
/// The body is taken raw: the signature covers the exact bytes sent.
pub async fn stripe_webhook(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<Json<WebhookAck>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.webhooks.handle_event(&body, signature)?;
    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;

    use super::*;
    use crate::{
        api::tests::{get_as, json_body, post_json_as, test_app},
        webhook::{
            CHECKOUT_SESSION_COMPLETED,
            tests::{event_payload, signed},
        },
    };

    fn webhook_request(payload: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(STRIPE_SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(payload)).unwrap()
    }

    #[tokio::test]
    async fn test_checkout_then_webhook_credits_once() {
        let app = test_app();
        let me = json_body(app.send(get_as("/api/me", "alice")).await).await;
        let account_id = me["id"].as_i64().unwrap() as i32;

        let redirect = json_body(
            app.send(post_json_as(
                "/api/checkout",
                "alice",
                json!({"package_id": app.package_id, "coupon_code": "WELCOME10"}),
            ))
            .await,
        )
        .await;
        let session_id = redirect["session_id"].as_str().unwrap().to_string();

        let payload = event_payload(CHECKOUT_SESSION_COMPLETED, &session_id, account_id, true);
        for expected in ["credited", "already_processed"] {
            let response = app
                .send(webhook_request(payload.clone(), Some(signed(&payload))))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let ack = json_body(response).await;
            assert_eq!(ack["received"], true);
            assert_eq!(ack["outcome"], expected);
        }

        let me = json_body(app.send(get_as("/api/me", "alice")).await).await;
        assert_eq!(me["token_balance"], 13);
        let coupon = app.state.db.find_coupon("WELCOME10").unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
    }

    #[tokio::test]
    async fn test_bad_signature_is_400() {
        let app = test_app();
        let payload = event_payload(CHECKOUT_SESSION_COMPLETED, "cs_x", 1, true);

        let response = app
            .send(webhook_request(payload.clone(), Some("t=1,v1=deadbeef".to_string())))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["type"], "invalid_signature");

        let response = app.send(webhook_request(payload, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
