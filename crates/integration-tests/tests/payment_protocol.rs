//! Integration tests for the cart-to-order conversion protocol.
//!
//! Exercises the single-flight guard, the decline/retry path, and the
//! charged-but-unconverted failure mode against in-memory fakes.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use tableside_checkout::api::ApiError;
use tableside_checkout::types::NewCartItem;
use tableside_checkout::{
    CartSync, CheckoutConfig, CheckoutError, CheckoutSession, CheckoutStep, OrderConversion,
    SessionContext, SubmitOutcome,
};
use tableside_core::ProductId;
use tableside_integration_tests::{MockCartService, MockGateway, cart_ready_for_checkout, test_card};

struct Harness {
    api: Arc<MockCartService>,
    gateway: Arc<MockGateway>,
    sync: CartSync<Arc<MockCartService>>,
    session: Mutex<CheckoutSession>,
    conversion: OrderConversion<Arc<MockGateway>>,
}

/// A guest session walked to the review step over a checkout-ready cart.
async fn harness() -> Harness {
    tableside_integration_tests::init_tracing();
    let api = Arc::new(MockCartService::with_cart(cart_ready_for_checkout()));
    let gateway = Arc::new(MockGateway::new());
    let sync = CartSync::new(Arc::clone(&api), SessionContext::guest());
    let conversion = OrderConversion::new(Arc::clone(&gateway), &CheckoutConfig::for_tests());

    let cart = sync.get_cart().await.unwrap();
    let ctx = sync.context();
    let mut session = CheckoutSession::new();
    session.form.first_name = "Ada".to_string();
    session.form.last_name = "Lovelace".to_string();
    session.form.email = "ada@example.com".to_string();
    session.form.phone = "5550101234".to_string();
    session.form.tip = Decimal::new(200, 2);
    session.advance(&cart, ctx.identity()).unwrap();
    session.advance(&cart, ctx.identity()).unwrap();
    assert_eq!(session.step(), CheckoutStep::ReviewTip);

    Harness {
        api,
        gateway,
        sync,
        session: Mutex::new(session),
        conversion,
    }
}

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_successful_submission_converts_cart() {
    let h = harness().await;

    let outcome = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap();

    let SubmitOutcome::Completed(order) = outcome else {
        panic!("expected completion");
    };
    assert!(order.order_number.starts_with("TS-"));
    assert_eq!(order.customer_name, "Ada Lovelace");
    assert_eq!(order.customer_email, "ada@example.com");
    // Tip was carried through completion.
    assert_eq!(order.totals.grand_total, Decimal::new(2700, 2));

    let session = h.session.lock().unwrap();
    assert_eq!(session.step(), CheckoutStep::Confirmed);
    assert!(session.is_finished());
    assert_eq!(session.order().map(|o| o.id), Some(order.id));

    let calls = h.api.calls();
    assert_eq!(calls.create_payment_intent, 1);
    assert_eq!(calls.complete_payment, 1);
    assert_eq!(h.gateway.confirmations(), 1);
    // Guest contact was persisted before the intent was created.
    assert!(calls.set_customer_info >= 1);
    // The server-side cart was destroyed by conversion.
    assert!(h.api.server_cart().items.is_empty());
}

#[tokio::test]
async fn test_finished_session_blocks_cart_until_reset() {
    let h = harness().await;
    h.conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap();

    let item = NewCartItem {
        product_id: ProductId::new(10),
        quantity: 1,
        notes: None,
        selected_modifiers: vec![],
    };
    let err = h.sync.add_item(item.clone()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::SessionFinished));

    // A resubmission is refused too.
    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::SessionFinished));

    h.sync.reset_after_order();
    let update = h.sync.add_item(item).await.unwrap();
    assert_eq!(update.cart.totals.item_count, 1);
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test]
async fn test_double_submission_creates_exactly_one_order() {
    let h = harness().await;

    let card_a = test_card();
    let card_b = test_card();
    let (first, second) = tokio::join!(
        h.conversion.submit(&h.sync, &h.session, &card_a),
        h.conversion.submit(&h.sync, &h.session, &card_b),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Completed(_)))
        .count();
    let dropped = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::AlreadyInFlight))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(dropped, 1);

    let calls = h.api.calls();
    assert_eq!(calls.create_payment_intent, 1);
    assert_eq!(calls.complete_payment, 1);
    assert_eq!(h.gateway.confirmations(), 1);
}

// =============================================================================
// Decline And Retry
// =============================================================================

#[tokio::test]
async fn test_decline_leaves_session_open_for_resubmission() {
    let h = harness().await;
    h.gateway.decline_next("card_declined");

    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::GatewayDeclined(_)));
    assert_eq!(err.to_string(), "Payment declined: card_declined");

    // Nothing was completed; the session is still at review.
    assert_eq!(h.api.calls().complete_payment, 0);
    assert_eq!(h.session.lock().unwrap().step(), CheckoutStep::ReviewTip);
    assert!(!h.sync.is_checkout_completed());

    // The resubmission runs the whole protocol again and succeeds.
    let outcome = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Completed(_)));
    assert_eq!(h.api.calls().create_payment_intent, 2);
    assert_eq!(h.api.calls().complete_payment, 1);
}

#[tokio::test]
async fn test_completion_failure_leaves_session_unconfirmed() {
    let h = harness().await;
    h.api
        .fail_next_completion(ApiError::Server("internal error".to_string()));

    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Api(ApiError::Server(_))));

    // The charge went through but the cart was not converted; no automatic
    // reconciliation happens.
    assert_eq!(h.gateway.confirmations(), 1);
    assert_eq!(h.api.calls().complete_payment, 1);
    assert!(!h.session.lock().unwrap().is_finished());
    assert!(!h.sync.is_checkout_completed());
}

#[tokio::test]
async fn test_intent_failure_never_reaches_gateway() {
    let h = harness().await;
    h.api
        .fail_next_intent(ApiError::Business("Cart total changed".to_string()));

    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::BusinessRule(_)));
    assert_eq!(h.gateway.confirmations(), 0);
    assert_eq!(h.api.calls().complete_payment, 0);
}

// =============================================================================
// Preconditions
// =============================================================================

#[tokio::test]
async fn test_submission_requires_review_step() {
    let h = harness().await;
    // Walk back to the customer-info step.
    h.session.lock().unwrap().back();

    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
    assert_eq!(h.api.calls().create_payment_intent, 0);
}

#[tokio::test]
async fn test_submission_rejects_empty_cart() {
    let h = harness().await;
    h.sync.clear().await.unwrap();

    let err = h
        .conversion
        .submit(&h.sync, &h.session, &test_card())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
    assert_eq!(h.api.calls().create_payment_intent, 0);
}
