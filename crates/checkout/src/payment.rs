//! Cart-to-order conversion protocol.
//!
//! Drives the payment submission sequence: persist guest contact info,
//! create a payment intent, confirm the charge with the gateway, then call
//! the backend completion endpoint - the sole atomicity boundary, where the
//! cart becomes an immutable order and the surcharge is added.
//!
//! Submission is single-flight: a one-permit semaphore guards the whole
//! protocol, so a double-tap cannot create two intents or two orders. The
//! losing call reports [`SubmitOutcome::AlreadyInFlight`] without touching
//! the network.
//!
//! A gateway decline happens before any backend mutation and is always safe
//! to resubmit. A failure *after* the charge but before completion leaves a
//! charged-but-unconverted state; there is no automatic reconciliation, the
//! customer resubmits and the backend deduplicates by intent ID.

use std::sync::{Mutex, PoisonError};

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::api::{CartApi, PaymentGateway};
use crate::checkout::{CheckoutForm, CheckoutSession, CheckoutStep};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, classify_api_error, classify_gateway_error};
use crate::session::{Identity, SessionContext};
use crate::sync::CartSync;
use crate::types::{
    BillingDetails, CardDetails, CompletePaymentRequest, Order, PaymentIntentRequest,
};

/// Result of a submission attempt.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The cart was converted; the order snapshot is final.
    Completed(Order),
    /// Another submission already holds the permit; nothing was sent.
    AlreadyInFlight,
}

/// Single-flight orchestrator for the conversion protocol.
pub struct OrderConversion<G: PaymentGateway> {
    gateway: G,
    currency: String,
    /// One permit: at most one conversion attempt in flight per session.
    in_flight: Semaphore,
}

impl<G: PaymentGateway> OrderConversion<G> {
    #[must_use]
    pub fn new(gateway: G, config: &CheckoutConfig) -> Self {
        Self {
            gateway,
            currency: config.currency.clone(),
            in_flight: Semaphore::new(1),
        }
    }

    /// Run the conversion protocol end to end.
    ///
    /// On success the checkout session moves to `Confirmed` and every cached
    /// cart entry is dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`CheckoutError::SessionFinished`] when the session has
    /// already produced an order, a validation error when the session is not
    /// at the review step or the cart is empty, [`CheckoutError::GatewayDeclined`]
    /// on a decline (resubmittable), or a classified backend error.
    #[instrument(skip_all)]
    pub async fn submit<C: CartApi>(
        &self,
        sync: &CartSync<C>,
        session: &Mutex<CheckoutSession>,
        card: &CardDetails,
    ) -> Result<SubmitOutcome, CheckoutError> {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            warn!("submission already in flight; ignoring duplicate");
            return Ok(SubmitOutcome::AlreadyInFlight);
        };

        // Gate on the session state and snapshot the form under the lock;
        // the lock is never held across an await.
        let form = {
            let session = session.lock().unwrap_or_else(PoisonError::into_inner);
            if session.is_finished() {
                return Err(CheckoutError::SessionFinished);
            }
            if session.step() != CheckoutStep::ReviewTip {
                return Err(CheckoutError::Validation(
                    "Review the order before submitting payment.".to_string(),
                ));
            }
            session.form.clone()
        };

        let ctx = sync.context();
        let cart = sync.get_cart().await?;
        if cart.items.is_empty() {
            return Err(CheckoutError::Validation("Your cart is empty.".to_string()));
        }

        // Guests persist contact info onto the cart first. Idempotent, so a
        // resubmit after a decline repeats it harmlessly.
        if !ctx.is_authenticated() {
            sync.set_customer_info(form.guest_contact()).await?;
        }

        let billing = billing_details(&ctx, &form);

        // The intent amount is the grand total *excluding* the surcharge;
        // the backend adds the surcharge atomically at completion.
        let intent = sync
            .api()
            .create_payment_intent(
                &ctx,
                &PaymentIntentRequest {
                    amount: cart.totals.grand_total,
                    tip: form.tip,
                    currency: self.currency.clone(),
                    customer_email: billing.email.clone(),
                    customer_name: billing.name.clone(),
                },
            )
            .await
            .map_err(classify_api_error)?;

        let confirmation = self
            .gateway
            .confirm_payment(&intent.client_secret, card, &billing)
            .await
            .map_err(classify_gateway_error)?;

        let order = sync
            .api()
            .complete_payment(
                &ctx,
                &CompletePaymentRequest {
                    payment_intent_id: confirmation.intent_id,
                    tip: form.tip,
                },
            )
            .await
            .map_err(classify_api_error)?;

        info!(order_number = %order.order_number, "cart converted to order");
        sync.finalize_order();
        session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .complete(order.clone());

        Ok(SubmitOutcome::Completed(order))
    }
}

/// Billing details from the authenticated profile, or from the guest form.
fn billing_details(ctx: &SessionContext, form: &CheckoutForm) -> BillingDetails {
    match ctx.identity() {
        Identity::Authenticated {
            name, email, phone, ..
        } => BillingDetails {
            name: name.clone(),
            email: email.clone(),
            phone: phone.clone(),
        },
        Identity::Guest { .. } => {
            let contact = form.guest_contact();
            BillingDetails {
                name: format!("{} {}", contact.guest_first_name, contact.guest_last_name),
                email: contact.guest_email,
                phone: Some(contact.guest_phone),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_billing_details_from_guest_form() {
        let ctx = SessionContext::guest();
        let form = CheckoutForm {
            first_name: " Ada ".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "5550101234".to_string(),
            ..CheckoutForm::default()
        };
        let billing = billing_details(&ctx, &form);
        assert_eq!(billing.name, "Ada Lovelace");
        assert_eq!(billing.email, "ada@example.com");
        assert_eq!(billing.phone.as_deref(), Some("5550101234"));
    }

    #[test]
    fn test_billing_details_from_profile_ignores_form() {
        let ctx = SessionContext::authenticated(
            "Grace Hopper",
            "grace@example.com",
            None,
            SecretString::from("at_test"),
        );
        let form = CheckoutForm {
            first_name: "Ada".to_string(),
            ..CheckoutForm::default()
        };
        let billing = billing_details(&ctx, &form);
        assert_eq!(billing.name, "Grace Hopper");
        assert_eq!(billing.email, "grace@example.com");
    }
}
