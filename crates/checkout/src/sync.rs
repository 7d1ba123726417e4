//! Cart synchronization component.
//!
//! Wraps the [`CartStore`] with mutation operations that apply optimistic
//! transforms and reconcile with the remote cart service. Every mutation
//! follows the same algorithm:
//!
//! 1. cancel any in-flight cached read,
//! 2. snapshot the cached cart for rollback,
//! 3. apply an optimistic transform where the server effect is safe to
//!    predict,
//! 4. issue the authoritative request,
//! 5. on settlement (success or error) invalidate and refetch so the client
//!    converges to server truth; on error also restore the snapshot,
//! 6. on success, report a local success notice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;
use tracing::{instrument, warn};

use tableside_core::{CartItemId, StoreLocationId};

use crate::api::{ApiError, CartApi};
use crate::error::{CheckoutError, classify_api_error};
use crate::session::SessionContext;
use crate::store::{CartStore, OptimisticMutation};
use crate::types::{Cart, GuestContact, MAX_ITEM_QUANTITY, NewCartItem};

/// Local success notice for a settled mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartNotice {
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
    CartCleared,
    LocationSet,
    CustomerInfoSaved,
}

impl CartNotice {
    /// User-facing message for the notice.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ItemAdded => "Added to cart.",
            Self::ItemUpdated => "Cart updated.",
            Self::ItemRemoved => "Removed from cart.",
            Self::CartCleared => "Cart cleared.",
            Self::LocationSet => "Pickup location saved.",
            Self::CustomerInfoSaved => "Contact info saved.",
        }
    }
}

/// A settled mutation: the converged cart plus its success notice.
#[derive(Debug, Clone)]
pub struct CartUpdate {
    pub cart: Arc<Cart>,
    pub notice: CartNotice,
}

/// Cart synchronization component.
///
/// Owns the session's cache slot and the explicit [`SessionContext`]. All
/// call sites funnel through the invalidate-on-settle rule, so the client
/// is eventually consistent with the server within one additional round
/// trip after any mutation, regardless of failure.
pub struct CartSync<C: CartApi> {
    api: C,
    store: CartStore,
    ctx: Mutex<SessionContext>,
    /// Set once the cart has been converted; suppresses implicit cart
    /// creation until explicitly cleared.
    checkout_completed: AtomicBool,
}

impl<C: CartApi> CartSync<C> {
    pub fn new(api: C, ctx: SessionContext) -> Self {
        Self {
            api,
            store: CartStore::new(),
            ctx: Mutex::new(ctx),
            checkout_completed: AtomicBool::new(false),
        }
    }

    /// The current session context (identity may evolve via bootstrap).
    #[must_use]
    pub fn context(&self) -> SessionContext {
        self.ctx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_context(&self, ctx: SessionContext) {
        *self.ctx.lock().unwrap_or_else(PoisonError::into_inner) = ctx;
    }

    /// The local cache layer (read-only access for orchestrators).
    #[must_use]
    pub const fn store(&self) -> &CartStore {
        &self.store
    }

    pub(crate) const fn api(&self) -> &C {
        &self.api
    }

    #[must_use]
    pub fn is_checkout_completed(&self) -> bool {
        self.checkout_completed.load(Ordering::Acquire)
    }

    /// Mark the cart converted and drop every cached cart entry. Called by
    /// the conversion protocol on completion.
    pub(crate) fn finalize_order(&self) {
        self.checkout_completed.store(true, Ordering::Release);
        self.store.invalidate_all();
    }

    /// Explicitly clear the converted flag so a new cart may begin.
    pub fn reset_after_order(&self) {
        self.checkout_completed.store(false, Ordering::Release);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The current cart, from cache when fresh, else refetched.
    ///
    /// # Errors
    ///
    /// Returns a classified error when the refetch fails and no snapshot is
    /// cached.
    #[instrument(skip(self))]
    pub async fn get_cart(&self) -> Result<Arc<Cart>, CheckoutError> {
        let ctx = self.context();
        if !self.store.needs_refetch(ctx.key())
            && let Some(snapshot) = self.store.snapshot(ctx.key())
        {
            return Ok(snapshot);
        }

        let ticket = self.store.begin_read(ctx.key());
        let cart = self
            .api
            .fetch_cart(&ctx)
            .await
            .map_err(classify_api_error)?;

        // A cancelled ticket means a newer write landed while this read was
        // in flight; the optimistic snapshot wins.
        Ok(self
            .store
            .complete_read(&ticket, cart)
            .or_else(|| self.store.snapshot(ctx.key()))
            .unwrap_or_else(|| Arc::new(Cart::empty())))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add an item with its modifier selection snapshot.
    ///
    /// Price and tax recomputation on add is not safely predictable, so no
    /// optimistic transform is applied; the settle-refetch converges.
    ///
    /// # Errors
    ///
    /// Fails with [`CheckoutError::SessionFinished`] after conversion until
    /// [`Self::reset_after_order`], with a validation error on a bad
    /// quantity, or with a classified backend error.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add_item(&self, item: NewCartItem) -> Result<CartUpdate, CheckoutError> {
        if self.is_checkout_completed() {
            return Err(CheckoutError::SessionFinished);
        }
        validate_quantity(item.quantity)?;

        let mut ctx = self.context();
        self.store.cancel_reads(ctx.key());
        let rollback = self.store.snapshot(ctx.key());

        let mut result = self.api.add_item(&ctx, &item).await;

        // Guest bootstrap: initialize a session exactly once and retry the
        // original call exactly once; a second failure propagates unmodified.
        if is_identity_error(&result) && !ctx.has_server_session() {
            let guest = self
                .api
                .init_guest_session()
                .await
                .map_err(classify_api_error)?;
            ctx.attach_guest_token(SecretString::from(guest.session_token));
            self.replace_context(ctx.clone());
            result = self.api.add_item(&ctx, &item).await;
        }

        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::ItemAdded,
        })
    }

    /// Change the quantity of an existing cart line.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a bad quantity or a classified backend
    /// error; optimistic state is rolled back on failure.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn update_item(
        &self,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartUpdate, CheckoutError> {
        validate_quantity(quantity)?;

        let mutation = OptimisticMutation::predicted(move |cart: &Cart| {
            let mut next = cart.clone();
            let mut delta_count = 0i64;
            for item in &mut next.items {
                if item.id == item_id {
                    delta_count = i64::from(quantity) - i64::from(item.quantity);
                    let price_delta =
                        item.price_at_sale * rust_decimal::Decimal::from(delta_count);
                    next.totals.subtotal += price_delta;
                    item.quantity = quantity;
                }
            }
            next.totals.item_count = add_signed(next.totals.item_count, delta_count);
            // Tax and grand total converge on the settle-refetch.
            next
        });

        let (ctx, rollback) = self.begin_mutation(&mutation);
        let result = self.api.update_item(&ctx, item_id, quantity).await;
        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::ItemUpdated,
        })
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns a classified backend error; optimistic state is rolled back
    /// on failure.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<CartUpdate, CheckoutError> {
        let mutation = OptimisticMutation::predicted(move |cart: &Cart| {
            let mut next = cart.clone();
            if let Some(removed) = next.items.iter().find(|item| item.id == item_id) {
                next.totals.item_count = next.totals.item_count.saturating_sub(removed.quantity);
                next.totals.subtotal -=
                    removed.price_at_sale * rust_decimal::Decimal::from(removed.quantity);
            }
            next.items.retain(|item| item.id != item_id);
            next
        });

        let (ctx, rollback) = self.begin_mutation(&mutation);
        let result = self.api.remove_item(&ctx, item_id).await;
        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::ItemRemoved,
        })
    }

    /// Remove every cart line.
    ///
    /// # Errors
    ///
    /// Returns a classified backend error; optimistic state is rolled back
    /// on failure.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartUpdate, CheckoutError> {
        let mutation = OptimisticMutation::predicted(|cart: &Cart| {
            let mut next = cart.clone();
            next.items.clear();
            next.totals.subtotal = rust_decimal::Decimal::ZERO;
            next.totals.discount_total = rust_decimal::Decimal::ZERO;
            next.totals.tax_total = rust_decimal::Decimal::ZERO;
            next.totals.grand_total = rust_decimal::Decimal::ZERO;
            next.totals.item_count = 0;
            next
        });

        let (ctx, rollback) = self.begin_mutation(&mutation);
        let result = self.api.clear_cart(&ctx).await;
        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::CartCleared,
        })
    }

    /// Select the store location. Tax recomputation is not predictable, so
    /// this relies on the settle-refetch.
    ///
    /// # Errors
    ///
    /// Returns a classified backend error.
    #[instrument(skip(self), fields(location_id = %location_id))]
    pub async fn set_location(
        &self,
        location_id: StoreLocationId,
    ) -> Result<CartUpdate, CheckoutError> {
        let mutation = OptimisticMutation::refetch_only();
        let (ctx, rollback) = self.begin_mutation(&mutation);
        let result = self.api.set_location(&ctx, location_id).await;
        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::LocationSet,
        })
    }

    /// Store guest contact fields on the cart. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a classified backend error; optimistic state is rolled back
    /// on failure.
    #[instrument(skip(self, contact))]
    pub async fn set_customer_info(
        &self,
        contact: GuestContact,
    ) -> Result<CartUpdate, CheckoutError> {
        let predicted_contact = contact.clone();
        let mutation = OptimisticMutation::predicted(move |cart: &Cart| {
            let mut next = cart.clone();
            next.guest_contact = Some(predicted_contact.clone());
            next
        });

        let (ctx, rollback) = self.begin_mutation(&mutation);
        let result = self.api.set_customer_info(&ctx, &contact).await;
        let cart = self.settle(&ctx, rollback, result).await?;
        Ok(CartUpdate {
            cart,
            notice: CartNotice::CustomerInfoSaved,
        })
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Steps 1-3 of the mutation algorithm: cancel reads, snapshot, apply
    /// the optimistic transform when one exists.
    fn begin_mutation(
        &self,
        mutation: &OptimisticMutation,
    ) -> (SessionContext, Option<Arc<Cart>>) {
        let ctx = self.context();
        self.store.cancel_reads(ctx.key());
        let rollback = self.store.snapshot(ctx.key());
        if let Some(current) = rollback.as_deref()
            && let Some(predicted) = mutation.predict(current)
        {
            self.store.apply(ctx.key(), predicted);
        }
        (ctx, rollback)
    }

    /// Steps 5-6: converge to server truth on either outcome; restore the
    /// snapshot and classify the failure on error.
    async fn settle(
        &self,
        ctx: &SessionContext,
        rollback: Option<Arc<Cart>>,
        result: Result<Cart, ApiError>,
    ) -> Result<Arc<Cart>, CheckoutError> {
        match result {
            Ok(cart) => {
                let applied = self.store.apply(ctx.key(), cart);
                let converged = self.refresh(ctx).await;
                Ok(converged.unwrap_or(applied))
            }
            Err(err) => {
                if let Some(previous) = rollback {
                    self.store.apply(ctx.key(), (*previous).clone());
                } else {
                    self.store.invalidate(ctx.key());
                }
                // Best-effort re-sync; the rollback snapshot stands if the
                // refetch also fails.
                let _ = self.refresh(ctx).await;
                Err(classify_api_error(err))
            }
        }
    }

    /// Invalidate and refetch the cached cart, converging to server truth.
    async fn refresh(&self, ctx: &SessionContext) -> Option<Arc<Cart>> {
        self.store.invalidate(ctx.key());
        let ticket = self.store.begin_read(ctx.key());
        match self.api.fetch_cart(ctx).await {
            Ok(cart) => self.store.complete_read(&ticket, cart),
            Err(err) => {
                warn!(error = %err, "settle-refetch failed; keeping local snapshot");
                None
            }
        }
    }
}

fn add_signed(count: u32, delta: i64) -> u32 {
    u32::try_from(i64::from(count) + delta).unwrap_or(0)
}

fn is_identity_error(result: &Result<Cart, ApiError>) -> bool {
    matches!(
        result,
        Err(ApiError::Unauthorized(_) | ApiError::Forbidden(_) | ApiError::LoggedOut)
    )
}

fn validate_quantity(quantity: u32) -> Result<(), CheckoutError> {
    if quantity == 0 {
        return Err(CheckoutError::Validation(
            "Quantity must be at least 1.".to_string(),
        ));
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(CheckoutError::Validation(format!(
            "Quantity is limited to {MAX_ITEM_QUANTITY} per item."
        )));
    }
    Ok(())
}
