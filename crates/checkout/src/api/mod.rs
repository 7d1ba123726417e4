//! Remote cart service and payment gateway clients.
//!
//! # Architecture
//!
//! - The backend cart service is the source of truth - no local persistence,
//!   direct REST/JSON calls via `reqwest`
//! - Every call takes an explicit [`SessionContext`]; there is no ambient
//!   identity
//! - Both collaborators sit behind traits ([`CartApi`], [`PaymentGateway`])
//!   so the orchestration invariants can be exercised against in-memory
//!   fakes
//!
//! # Retry discipline
//!
//! A 403 on an unsafe request triggers exactly one anti-forgery token
//! refresh + retry. A 401 on any call (other than the session refresh
//! itself) triggers exactly one session refresh + retry before surfacing
//! [`ApiError::LoggedOut`]. Nothing else retries automatically.

mod gateway;
mod rest;

pub use gateway::{CardGatewayClient, GatewayError, PaymentConfirmation, PaymentGateway};
pub use rest::RestCartClient;

use thiserror::Error;

use tableside_core::{CartItemId, StoreLocationId};

use crate::session::{GuestSession, SessionContext};
use crate::types::{
    Cart, CompletePaymentRequest, GuestContact, NewCartItem, Order, PaymentIntent,
    PaymentIntentRequest,
};

/// Errors from the remote cart service transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, malformed response).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found (404 on anything other than the cart itself).
    #[error("Not found: {0}")]
    NotFound(String),

    /// 401 that survived the one-shot session refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403 that survived the one-shot anti-forgery token refresh.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Backend-reported business-rule failure (4xx with a message body).
    #[error("{0}")]
    Business(String),

    /// Backend fault (5xx).
    #[error("Server error: {0}")]
    Server(String),

    /// The session refresh itself failed; the caller must sign the user out.
    #[error("Session refresh failed")]
    LoggedOut,
}

/// The remote cart service contract.
///
/// Implemented by [`RestCartClient`] for production and by in-memory fakes
/// in tests. All methods are plain `async fn`; the engine runs on a single
/// task, so no `Send` bound is required.
#[allow(async_fn_in_trait)]
pub trait CartApi {
    /// Fetch the current cart. A 404 is treated as "no cart" and yields the
    /// empty cart shape, not an error.
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError>;

    /// Add an item with its modifier selection snapshot.
    async fn add_item(&self, ctx: &SessionContext, item: &NewCartItem) -> Result<Cart, ApiError>;

    /// Change the quantity of an existing cart line.
    async fn update_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, ApiError>;

    /// Remove a cart line.
    async fn remove_item(&self, ctx: &SessionContext, item_id: CartItemId)
    -> Result<Cart, ApiError>;

    /// Remove every cart line.
    async fn clear_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError>;

    /// Select the store location; the backend recomputes tax fields.
    async fn set_location(
        &self,
        ctx: &SessionContext,
        location_id: StoreLocationId,
    ) -> Result<Cart, ApiError>;

    /// Store guest contact fields on the cart. Idempotent.
    async fn set_customer_info(
        &self,
        ctx: &SessionContext,
        contact: &GuestContact,
    ) -> Result<Cart, ApiError>;

    /// Bootstrap an anonymous server-side session.
    async fn init_guest_session(&self) -> Result<GuestSession, ApiError>;

    /// Create a payment intent scoped to the cart and identity.
    async fn create_payment_intent(
        &self,
        ctx: &SessionContext,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError>;

    /// Complete the payment - the sole atomicity boundary. The cart is
    /// converted into an immutable order in one backend transaction.
    async fn complete_payment(
        &self,
        ctx: &SessionContext,
        request: &CompletePaymentRequest,
    ) -> Result<Order, ApiError>;
}

// Delegation so callers can share one client between the engine and other
// holders (e.g. tests keeping a handle on a fake).
impl<C: CartApi> CartApi for std::sync::Arc<C> {
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        (**self).fetch_cart(ctx).await
    }

    async fn add_item(&self, ctx: &SessionContext, item: &NewCartItem) -> Result<Cart, ApiError> {
        (**self).add_item(ctx, item).await
    }

    async fn update_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, ApiError> {
        (**self).update_item(ctx, item_id, quantity).await
    }

    async fn remove_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
    ) -> Result<Cart, ApiError> {
        (**self).remove_item(ctx, item_id).await
    }

    async fn clear_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        (**self).clear_cart(ctx).await
    }

    async fn set_location(
        &self,
        ctx: &SessionContext,
        location_id: StoreLocationId,
    ) -> Result<Cart, ApiError> {
        (**self).set_location(ctx, location_id).await
    }

    async fn set_customer_info(
        &self,
        ctx: &SessionContext,
        contact: &GuestContact,
    ) -> Result<Cart, ApiError> {
        (**self).set_customer_info(ctx, contact).await
    }

    async fn init_guest_session(&self) -> Result<GuestSession, ApiError> {
        (**self).init_guest_session().await
    }

    async fn create_payment_intent(
        &self,
        ctx: &SessionContext,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        (**self).create_payment_intent(ctx, request).await
    }

    async fn complete_payment(
        &self,
        ctx: &SessionContext,
        request: &CompletePaymentRequest,
    ) -> Result<Order, ApiError> {
        (**self).complete_payment(ctx, request).await
    }
}
