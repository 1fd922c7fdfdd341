//! Webhook reconciler: turns signed processor events into payment status
//! transitions and token credits.
//!
//! Redelivery is expected. A payment is credited by the single transition
//! out of `pending`, so replaying an event that already completed (or
//! failed) a payment changes nothing.

pub mod signature;

use std::{collections::HashMap, sync::Arc};

use archrender_types::{CheckoutMetadata, PaymentStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    db::{DbManager, PaymentCompletion, models::PaymentCredit},
    error::{ServiceError, ServiceResult},
};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED: &str =
    "checkout.session.async_payment_succeeded";
pub const CHECKOUT_SESSION_ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook secret is not configured")]
    NotConfigured,
    #[error("Missing Stripe-Signature header")]
    MissingSignature,
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),
    #[error("Signature timestamp {timestamp} is outside the {tolerance_secs}s tolerance")]
    OutsideTolerance { timestamp: i64, tolerance_secs: i64 },
    #[error("Signature does not match payload")]
    SignatureMismatch,
    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl From<WebhookError> for ServiceError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidPayload(_) => ServiceError::InvalidInput(e.to_string()),
            other => ServiceError::InvalidSignature(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// The fields of a checkout session object the reconciler reads
#[derive(Debug, Clone, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Either an id or an expanded payment intent
    #[serde(default)]
    pub payment_intent: Option<Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

impl SessionObject {
    fn payment_intent_id(&self) -> Option<&str> {
        match self.payment_intent.as_ref()? {
            Value::String(id) => Some(id),
            Value::Object(intent) => intent.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Credited {
        account_id: i32,
        tokens: i64,
        new_balance: i64,
    },
    AlreadyProcessed {
        status: PaymentStatus,
    },
    /// The event referenced a session this service never created
    UnknownSession,
    /// The payment was marked failed
    Failed,
    /// Acknowledged without any state change
    Ignored,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    db: Arc<DbManager>,
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookReconciler {
    pub fn new(db: Arc<DbManager>, secret: Option<String>, tolerance_secs: i64) -> Self {
        Self {
            db,
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs,
        }
    }

    /// Verify, decode and apply one event. Only authentication or payload
    /// problems are errors; every recognized or ignorable event resolves to
    /// an outcome the endpoint acknowledges.
    pub fn handle_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> ServiceResult<WebhookOutcome> {
        let secret = self.secret.as_deref().ok_or(WebhookError::NotConfigured)?;
        let header = signature_header.ok_or(WebhookError::MissingSignature)?;
        signature::verify_signature(
            payload,
            header,
            secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(WebhookError::from)?;
        debug!("Received webhook event {} ({})", event.id, event.kind);

        let outcome = match event.kind.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session = parse_session(&event)?;
                if session.is_paid() {
                    self.process_successful_payment(&session)?
                } else {
                    info!(
                        "Session {} completed with payment status {:?}; awaiting async confirmation",
                        session.id, session.payment_status
                    );
                    WebhookOutcome::Ignored
                }
            }
            CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED => {
                self.process_successful_payment(&parse_session(&event)?)?
            }
            CHECKOUT_SESSION_ASYNC_PAYMENT_FAILED => {
                self.process_failed_payment(&parse_session(&event)?)?
            }
            other => {
                debug!("Ignoring webhook event type {}", other);
                WebhookOutcome::Ignored
            }
        };
        Ok(outcome)
    }

    pub fn process_successful_payment(
        &self,
        session: &SessionObject,
    ) -> ServiceResult<WebhookOutcome> {
        let Some(payment) = self.db.find_payment_by_session(&session.id)? else {
            warn!("No payment transaction for checkout session {}", session.id);
            return Ok(WebhookOutcome::UnknownSession);
        };
        if payment.status.is_terminal() {
            info!(
                "Payment {} already {}, not crediting again",
                session.id, payment.status
            );
            return Ok(WebhookOutcome::AlreadyProcessed {
                status: payment.status,
            });
        }

        let Some(metadata) = CheckoutMetadata::from_map(&session.metadata) else {
            error!(
                "Checkout session {} carries no usable account/token metadata",
                session.id
            );
            self.mark_failed(&session.id);
            return Ok(WebhookOutcome::Failed);
        };
        if metadata.account_id != payment.account_id {
            warn!(
                "Session {} metadata names account {}, payment belongs to {}",
                session.id, metadata.account_id, payment.account_id
            );
        }

        let credit = PaymentCredit {
            account_id: metadata.account_id,
            token_amount: metadata.token_amount,
            package_id: payment.package_id,
            price_in_cents: payment.amount,
            payment_intent_id: session.payment_intent_id(),
            payment_method: session.payment_method_types.first().map(String::as_str),
            coupon_code: payment.coupon_code.as_deref(),
            description: None,
        };

        match self.db.complete_payment(&session.id, &credit) {
            Ok(PaymentCompletion::Credited { new_balance }) => Ok(WebhookOutcome::Credited {
                account_id: credit.account_id,
                tokens: credit.token_amount,
                new_balance,
            }),
            Ok(PaymentCompletion::NotPending(status)) => {
                Ok(WebhookOutcome::AlreadyProcessed { status })
            }
            Ok(PaymentCompletion::UnknownSession) => Ok(WebhookOutcome::UnknownSession),
            Err(e) => {
                error!(
                    "Crediting {} tokens for session {} failed: {}",
                    credit.token_amount, session.id, e
                );
                self.mark_failed(&session.id);
                Ok(WebhookOutcome::Failed)
            }
        }
    }

    fn process_failed_payment(&self, session: &SessionObject) -> ServiceResult<WebhookOutcome> {
        if self.db.fail_payment(&session.id)? {
            info!("Payment {} failed", session.id);
            Ok(WebhookOutcome::Failed)
        } else {
            debug!(
                "Failure for session {} ignored: unknown or already settled",
                session.id
            );
            Ok(WebhookOutcome::Ignored)
        }
    }

    fn mark_failed(&self, session_id: &str) {
        if let Err(e) = self.db.fail_payment(session_id) {
            error!("Unable to mark payment {} as failed: {}", session_id, e);
        }
    }
}

fn parse_session(event: &WebhookEvent) -> ServiceResult<SessionObject> {
    Ok(serde_json::from_value(event.data.object.clone()).map_err(WebhookError::from)?)
}
