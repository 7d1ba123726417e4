//! Payment gateway client.
//!
//! The gateway confirms card charges outside this system's control. A
//! decline happens before any backend state has been mutated, so it is
//! always safe to retry. There is deliberately no client-imposed timeout on
//! the confirmation call: once dispatched it runs to completion or failure,
//! and navigating away does not abort it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::CheckoutConfig;
use crate::types::{BillingDetails, CardDetails};

/// Errors from the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway declined the charge. Surfaced verbatim.
    #[error("declined: {0}")]
    Declined(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected response shape from the gateway.
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

/// A confirmed charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// The gateway's payment intent ID, echoed to the completion endpoint.
    pub intent_id: String,
}

/// The payment gateway contract.
///
/// Implemented by [`CardGatewayClient`] for production and by in-memory
/// fakes in tests.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Confirm a charge against a payment intent's client secret.
    async fn confirm_payment(
        &self,
        client_secret: &str,
        card: &CardDetails,
        billing: &BillingDetails,
    ) -> Result<PaymentConfirmation, GatewayError>;
}

impl<G: PaymentGateway> PaymentGateway for Arc<G> {
    async fn confirm_payment(
        &self,
        client_secret: &str,
        card: &CardDetails,
        billing: &BillingDetails,
    ) -> Result<PaymentConfirmation, GatewayError> {
        (**self).confirm_payment(client_secret, card, billing).await
    }
}

/// REST client for the card gateway's confirmation endpoint.
#[derive(Clone)]
pub struct CardGatewayClient {
    inner: Arc<CardGatewayClientInner>,
}

struct CardGatewayClientInner {
    http: reqwest::Client,
    base_url: String,
    publishable_key: String,
}

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    client_secret: &'a str,
    card: &'a CardDetails,
    billing_details: &'a BillingDetails,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    id: String,
    status: String,
    #[serde(default)]
    error: Option<ConfirmError>,
}

#[derive(Debug, Deserialize)]
struct ConfirmError {
    message: String,
}

impl CardGatewayClient {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CheckoutConfig) -> Result<Self, GatewayError> {
        // No .timeout() here - the confirmation call has no client ceiling.
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            inner: Arc::new(CardGatewayClientInner {
                http,
                base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
                publishable_key: config.gateway_publishable_key.clone(),
            }),
        })
    }
}

impl PaymentGateway for CardGatewayClient {
    #[instrument(skip_all)]
    async fn confirm_payment(
        &self,
        client_secret: &str,
        card: &CardDetails,
        billing: &BillingDetails,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let response = self
            .inner
            .http
            .post(format!(
                "{}/v1/payment_intents/confirm",
                self.inner.base_url
            ))
            .bearer_auth(&self.inner.publishable_key)
            .json(&ConfirmRequest {
                client_secret,
                card,
                billing_details: billing,
            })
            .send()
            .await?;

        let status = response.status();
        let body: ConfirmResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(GatewayError::Declined(error.message));
        }

        match body.status.as_str() {
            "succeeded" => Ok(PaymentConfirmation { intent_id: body.id }),
            other if status.is_success() => Err(GatewayError::Declined(format!(
                "charge not completed (status {other})"
            ))),
            other => Err(GatewayError::Protocol(format!(
                "HTTP {status}, intent status {other}"
            ))),
        }
    }
}
