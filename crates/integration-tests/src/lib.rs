//! Integration tests for the Tableside checkout engine.
//!
//! The engine's collaborators sit behind the [`CartApi`] and
//! [`PaymentGateway`] traits, so these tests drive the real orchestration
//! code against in-memory fakes: [`MockCartService`] plays the backend cart
//! service (including its failure modes), [`MockGateway`] plays the card
//! gateway. Every fake method contains an await point so concurrent calls
//! interleave the way real network calls do.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod server;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;

use tableside_checkout::api::{
    ApiError, CartApi, GatewayError, PaymentConfirmation, PaymentGateway,
};
use tableside_checkout::session::{GuestSession, SessionContext};
use tableside_checkout::types::{
    Cart, CartItem, CompletePaymentRequest, GuestContact, NewCartItem, Order, PaymentIntent,
    PaymentIntentRequest, PaymentStatus,
};
use tableside_core::{CartItemId, ProductId, StoreLocationId};

/// Install a test log subscriber once per process; respects `RUST_LOG`.
pub fn init_tracing() {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Fixtures
// =============================================================================

/// A cart line with no modifiers.
#[must_use]
pub fn cart_item(id: i64, product_id: i64, name: &str, quantity: u32, price: Decimal) -> CartItem {
    CartItem {
        id: CartItemId::new(id),
        product_id: ProductId::new(product_id),
        name: name.to_string(),
        quantity,
        price_at_sale: price,
        notes: None,
        selected_modifiers: vec![],
    }
}

/// A cart holding the given lines, with totals recomputed the way the
/// backend would.
#[must_use]
pub fn cart_with_items(items: Vec<CartItem>) -> Cart {
    let mut cart = Cart {
        id: Some(tableside_core::CartId::new(1)),
        items,
        ..Cart::empty()
    };
    recompute_totals(&mut cart);
    cart
}

/// A non-empty cart with a location selected, ready for checkout.
#[must_use]
pub fn cart_ready_for_checkout() -> Cart {
    let mut cart = cart_with_items(vec![cart_item(1, 10, "Pad Thai", 2, Decimal::new(1250, 2))]);
    cart.store_location_id = Some(StoreLocationId::new(7));
    cart.totals.has_location = true;
    cart
}

fn recompute_totals(cart: &mut Cart) {
    let subtotal: Decimal = cart
        .items
        .iter()
        .map(|item| item.price_at_sale * Decimal::from(item.quantity))
        .sum();
    cart.totals.subtotal = subtotal;
    cart.totals.grand_total = subtotal;
    cart.totals.item_count = cart.items.iter().map(|item| item.quantity).sum();
}

// =============================================================================
// Mock Cart Service
// =============================================================================

/// Per-endpoint call counts, for asserting protocol invariants.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calls {
    pub fetch_cart: u32,
    pub add_item: u32,
    pub init_guest_session: u32,
    pub set_customer_info: u32,
    pub create_payment_intent: u32,
    pub complete_payment: u32,
}

#[derive(Default)]
struct ServiceState {
    cart: Cart,
    /// When set, cart calls without a bearer token fail with 401.
    require_session: bool,
    /// When set, cart calls fail with 401 even with a token.
    reject_all_sessions: bool,
    /// Scripted failures consumed (front first) by cart mutation calls.
    fail_next_mutation: VecDeque<ApiError>,
    fail_next_intent: Option<ApiError>,
    fail_next_completion: Option<ApiError>,
    calls: Calls,
    next_item_id: i64,
    next_intent: u32,
}

/// In-memory stand-in for the backend cart service.
pub struct MockCartService {
    state: Mutex<ServiceState>,
}

impl Default for MockCartService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCartService {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cart(Cart::empty())
    }

    #[must_use]
    pub fn with_cart(cart: Cart) -> Self {
        let next_item_id = cart
            .items
            .iter()
            .map(|item| i64::from(item.id) + 1)
            .max()
            .unwrap_or(1);
        Self {
            state: Mutex::new(ServiceState {
                cart,
                next_item_id,
                ..ServiceState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Require a guest session token (or account) on every cart call.
    pub fn require_session(&self) {
        self.lock().require_session = true;
    }

    /// Reject every cart call with 401, even after a bootstrap.
    pub fn reject_all_sessions(&self) {
        let mut state = self.lock();
        state.require_session = true;
        state.reject_all_sessions = true;
    }

    /// Script a failure for the next cart mutation call.
    pub fn fail_next_mutation(&self, err: ApiError) {
        self.lock().fail_next_mutation.push_back(err);
    }

    /// Script a failure for the next payment intent creation.
    pub fn fail_next_intent(&self, err: ApiError) {
        self.lock().fail_next_intent = Some(err);
    }

    /// Script a failure for the next completion call.
    pub fn fail_next_completion(&self, err: ApiError) {
        self.lock().fail_next_completion = Some(err);
    }

    #[must_use]
    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    /// The service's current view of the cart.
    #[must_use]
    pub fn server_cart(&self) -> Cart {
        self.lock().cart.clone()
    }

    fn check_session(state: &ServiceState, ctx: &SessionContext) -> Result<(), ApiError> {
        if state.reject_all_sessions {
            return Err(ApiError::Unauthorized("session rejected".to_string()));
        }
        if state.require_session && ctx.bearer_token().is_none() {
            return Err(ApiError::Unauthorized("no session".to_string()));
        }
        Ok(())
    }

    fn begin_mutation(
        &self,
        ctx: &SessionContext,
    ) -> Result<std::sync::MutexGuard<'_, ServiceState>, ApiError> {
        let mut state = self.lock();
        Self::check_session(&state, ctx)?;
        if let Some(err) = state.fail_next_mutation.pop_front() {
            return Err(err);
        }
        Ok(state)
    }
}

impl CartApi for MockCartService {
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.fetch_cart += 1;
        Self::check_session(&state, ctx)?;
        Ok(state.cart.clone())
    }

    async fn add_item(&self, ctx: &SessionContext, item: &NewCartItem) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        self.lock().calls.add_item += 1;
        let mut state = self.begin_mutation(ctx)?;
        let id = state.next_item_id;
        state.next_item_id += 1;
        let line = cart_item(
            id,
            item.product_id.into(),
            "Test Item",
            item.quantity,
            Decimal::new(500, 2),
        );
        state.cart.id.get_or_insert(tableside_core::CartId::new(1));
        state.cart.items.push(line);
        recompute_totals(&mut state.cart);
        Ok(state.cart.clone())
    }

    async fn update_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.begin_mutation(ctx)?;
        let Some(line) = state.cart.items.iter_mut().find(|line| line.id == item_id) else {
            return Err(ApiError::NotFound(format!("cart line {item_id}")));
        };
        line.quantity = quantity;
        recompute_totals(&mut state.cart);
        Ok(state.cart.clone())
    }

    async fn remove_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
    ) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.begin_mutation(ctx)?;
        state.cart.items.retain(|line| line.id != item_id);
        recompute_totals(&mut state.cart);
        Ok(state.cart.clone())
    }

    async fn clear_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.begin_mutation(ctx)?;
        state.cart.items.clear();
        recompute_totals(&mut state.cart);
        Ok(state.cart.clone())
    }

    async fn set_location(
        &self,
        ctx: &SessionContext,
        location_id: StoreLocationId,
    ) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.begin_mutation(ctx)?;
        state.cart.store_location_id = Some(location_id);
        state.cart.totals.has_location = true;
        Ok(state.cart.clone())
    }

    async fn set_customer_info(
        &self,
        ctx: &SessionContext,
        contact: &GuestContact,
    ) -> Result<Cart, ApiError> {
        tokio::task::yield_now().await;
        self.lock().calls.set_customer_info += 1;
        let mut state = self.begin_mutation(ctx)?;
        state.cart.guest_contact = Some(contact.clone());
        Ok(state.cart.clone())
    }

    async fn init_guest_session(&self) -> Result<GuestSession, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.init_guest_session += 1;
        Ok(GuestSession {
            session_token: "guest_tok_1".to_string(),
        })
    }

    async fn create_payment_intent(
        &self,
        ctx: &SessionContext,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.create_payment_intent += 1;
        Self::check_session(&state, ctx)?;
        if let Some(err) = state.fail_next_intent.take() {
            return Err(err);
        }
        state.next_intent += 1;
        let n = state.next_intent;
        Ok(PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: format!("cs_{n}"),
            amount: request.amount,
        })
    }

    async fn complete_payment(
        &self,
        ctx: &SessionContext,
        request: &CompletePaymentRequest,
    ) -> Result<Order, ApiError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.complete_payment += 1;
        Self::check_session(&state, ctx)?;
        if let Some(err) = state.fail_next_completion.take() {
            return Err(err);
        }

        let (name, email, phone) = state.cart.guest_contact.as_ref().map_or_else(
            || ("Account Customer".to_string(), "account@example.com".to_string(), None),
            |c| {
                (
                    format!("{} {}", c.guest_first_name, c.guest_last_name),
                    c.guest_email.clone(),
                    Some(c.guest_phone.clone()),
                )
            },
        );

        let mut totals = state.cart.totals.clone();
        totals.grand_total += request.tip;
        let order = Order {
            id: tableside_core::OrderId::new(1001),
            order_number: format!("TS-{}", 1000 + i64::from(state.calls.complete_payment)),
            items: state.cart.items.clone(),
            totals,
            customer_name: name,
            customer_email: email,
            customer_phone: phone,
            payment_status: PaymentStatus::Paid,
            placed_at: Utc::now(),
        };

        // The cart is destroyed by conversion.
        state.cart = Cart::empty();
        Ok(order)
    }
}

// =============================================================================
// Mock Payment Gateway
// =============================================================================

/// In-memory stand-in for the card gateway.
#[derive(Default)]
pub struct MockGateway {
    decline_next: Mutex<VecDeque<String>>,
    confirmations: AtomicU32,
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a decline for the next confirmation attempt.
    pub fn decline_next(&self, message: &str) {
        self.decline_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message.to_string());
    }

    /// Number of successfully confirmed charges.
    #[must_use]
    pub fn confirmations(&self) -> u32 {
        self.confirmations.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockGateway {
    async fn confirm_payment(
        &self,
        _client_secret: &str,
        _card: &tableside_checkout::types::CardDetails,
        _billing: &tableside_checkout::types::BillingDetails,
    ) -> Result<PaymentConfirmation, GatewayError> {
        tokio::task::yield_now().await;
        let declined = self
            .decline_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(message) = declined {
            return Err(GatewayError::Declined(message));
        }
        let n = self.confirmations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentConfirmation {
            intent_id: format!("pi_confirmed_{n}"),
        })
    }
}

/// A test card that always passes gateway-side validation.
#[must_use]
pub fn test_card() -> tableside_checkout::types::CardDetails {
    tableside_checkout::types::CardDetails {
        number: "4242424242424242".to_string(),
        exp_month: 12,
        exp_year: 2030,
        cvc: "123".to_string(),
    }
}
