use std::str::FromStr;

use async_trait::async_trait;
use ::stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentMethodTypes,
    Currency,
};
use tracing::debug;

use super::{CheckoutGateway, CheckoutSession, CheckoutSessionRequest, GatewayError};

/// [`CheckoutGateway`] backed by Stripe Checkout
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    client: Option<Client>,
}

impl StripeCheckoutGateway {
    /// Without a secret key every session request fails with
    /// [`GatewayError::NotConfigured`].
    pub fn new(secret_key: Option<&str>) -> Self {
        Self {
            client: secret_key.filter(|k| !k.is_empty()).map(Client::new),
        }
    }

    pub fn is_test_mode(secret_key: &str) -> bool {
        secret_key.starts_with("sk_test_") || secret_key.starts_with("rk_test_")
    }
}

#[async_trait]
impl CheckoutGateway for StripeCheckoutGateway {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let client = self.client.as_ref().ok_or(GatewayError::NotConfigured)?;
        let currency = Currency::from_str(&request.currency)
            .map_err(|_| GatewayError::InvalidRequest(format!("currency {}", request.currency)))?;

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.client_reference_id = Some(&request.client_reference_id);
        params.customer_email = request.customer_email.as_deref();
        params.metadata = Some(request.metadata.clone());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: Some(request.product_description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        debug!(
            "Creating Stripe checkout session for {} {}",
            request.amount, request.currency
        );
        let session = StripeCheckoutSession::create(client, params)
            .await
            .map_err(|e| GatewayError::Processor(e.to_string()))?;

        let id = session.id.to_string();
        let url = session.url.ok_or_else(|| GatewayError::MissingUrl(id.clone()))?;
        Ok(CheckoutSession {
            url,
            payment_intent_id: session.payment_intent.map(|pi| pi.id().to_string()),
            id,
        })
    }
}
