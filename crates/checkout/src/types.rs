//! Domain types for the cart and checkout API.
//!
//! These types mirror the JSON shapes exchanged with the remote cart
//! service. Money amounts cross the wire as strings and are parsed into
//! [`rust_decimal::Decimal`] to preserve precision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tableside_core::{
    CartId, CartItemId, ModifierOptionId, ModifierSetId, OrderId, ProductId, StoreLocationId,
    Totals,
};

// =============================================================================
// Cart Types
// =============================================================================

/// The mutable pre-order staging aggregate.
///
/// Owned by exactly one identity (guest session or authenticated account);
/// logically destroyed the instant it is converted into an [`Order`]. A new
/// empty cart begins implicitly on the next item addition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Cart ID, null until the first item is added.
    pub id: Option<CartId>,
    /// Ordered cart lines.
    pub items: Vec<CartItem>,
    /// Server-computed totals. Never recomputed locally.
    pub totals: Totals,
    /// Selected store location, null until checkout step 0 completes.
    pub store_location_id: Option<StoreLocationId>,
    /// Guest contact fields, null for authenticated carts until stored.
    #[serde(default)]
    pub guest_contact: Option<GuestContact>,
    /// Set once the cart has been converted into an order.
    #[serde(default)]
    pub checkout_completed: bool,
}

impl Cart {
    /// The empty cart shape returned when no cart exists (e.g. a 404 from
    /// the cart endpoint).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            totals: Totals::zero(),
            store_location_id: None,
            guest_contact: None,
            checkout_completed: false,
        }
    }

    /// Look up a cart line by its ID.
    #[must_use]
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

/// A single cart line.
///
/// `price_at_sale` and `selected_modifiers` are snapshots taken when the
/// item was added; they are never recomputed if the catalog changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Cart line ID.
    pub id: CartItemId,
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Product display name at time of add.
    pub name: String,
    /// Quantity, positive. The UI soft-caps this at [`MAX_ITEM_QUANTITY`].
    pub quantity: u32,
    /// Unit price snapshot including modifier deltas. Immutable once set.
    #[serde(with = "rust_decimal::serde::str")]
    pub price_at_sale: Decimal,
    /// Free-text customer note.
    #[serde(default)]
    pub notes: Option<String>,
    /// Immutable snapshot of the chosen modifier options.
    #[serde(default)]
    pub selected_modifiers: Vec<ModifierSelection>,
}

/// Soft cap on per-line quantity enforced client-side.
pub const MAX_ITEM_QUANTITY: u32 = 10;

/// Snapshot of one chosen modifier option on a cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierSelection {
    /// The chosen option.
    pub option_id: ModifierOptionId,
    /// Option display name at time of add.
    pub name: String,
    /// Price delta snapshot at time of add.
    #[serde(with = "rust_decimal::serde::str")]
    pub price_delta: Decimal,
    /// How many of this option were chosen.
    pub quantity: u32,
}

/// Payload for adding an item to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub selected_modifiers: Vec<SelectedModifierInput>,
}

/// One chosen modifier option in an add-item payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedModifierInput {
    pub option_id: ModifierOptionId,
    pub quantity: u32,
}

/// Guest contact fields stored on the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_email: String,
    pub guest_phone: String,
}

// =============================================================================
// Modifier Types
// =============================================================================

/// How many options may be chosen from a modifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionType {
    /// Exactly one option (radio-button style). Forces `max_selections` to 1.
    Single,
    /// Any number of options up to `max_selections`.
    Multiple,
}

/// A named group of add-on choices attached to a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub id: ModifierSetId,
    pub name: String,
    pub selection_type: SelectionType,
    /// Minimum number of selections required.
    pub min_selections: u32,
    /// Maximum selections; `None` means unlimited. Single-select sets are
    /// always capped at 1 regardless of this field.
    pub max_selections: Option<u32>,
    /// Options in display order.
    pub options: Vec<ModifierOption>,
    /// When set, this set is only offered once the referenced option
    /// (belonging to a *different* set) has been chosen.
    #[serde(default)]
    pub triggered_by_option: Option<ModifierOptionId>,
}

/// A single choice within a modifier set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierOption {
    pub id: ModifierOptionId,
    pub name: String,
    /// Signed price adjustment applied when this option is chosen.
    #[serde(with = "rust_decimal::serde::str")]
    pub price_delta: Decimal,
    /// When true, the option is visible on exactly one product.
    #[serde(default)]
    pub product_specific: bool,
    pub display_order: i32,
}

// =============================================================================
// Payment Types
// =============================================================================

/// External payment gateway handle authorizing a charge prior to
/// confirmation.
///
/// `amount` is the backend-reported grand total *excluding* the surcharge,
/// which the backend adds atomically at completion to avoid client/server
/// rounding skew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Request body for creating a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub tip: Decimal,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
}

/// Request body for the backend completion endpoint - the sole atomicity
/// boundary of the conversion protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePaymentRequest {
    pub payment_intent_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub tip: Decimal,
}

/// Gateway-collected card details.
///
/// Implements `Debug` manually to redact the number and CVC.
#[derive(Clone, Serialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &"[REDACTED]")
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvc", &"[REDACTED]")
            .finish()
    }
}

/// Billing details sent with a gateway confirmation, drawn from the
/// authenticated profile or the guest checkout form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

// =============================================================================
// Order Types
// =============================================================================

/// Payment status carried on the finalized order snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Refunded,
    PartiallyRefunded,
}

/// The immutable post-payment result of cart conversion.
///
/// Produced only by a successful completion call and carried directly to the
/// confirmation view - never refetched by ID, since the cart/order boundary
/// has already moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-facing order number.
    pub order_number: String,
    /// Snapshot of the converted cart lines.
    pub items: Vec<CartItem>,
    /// Final totals including the surcharge added at completion.
    pub totals: Totals,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub payment_status: PaymentStatus,
    pub placed_at: DateTime<Utc>,
}

/// Envelope for the completion endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEnvelope {
    pub order: Order,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cart_shape() {
        let cart = Cart::empty();
        assert!(cart.id.is_none());
        assert!(cart.items.is_empty());
        assert_eq!(cart.totals.item_count, 0);
        assert!(!cart.totals.has_location);
        assert!(!cart.checkout_completed);
    }

    #[test]
    fn test_cart_deserializes_wire_shape() {
        let json = serde_json::json!({
            "id": null,
            "items": [],
            "totals": {
                "subtotal": "0.00",
                "discount_total": "0.00",
                "tax_total": "0.00",
                "grand_total": "0.00",
                "item_count": 0,
                "has_location": false
            },
            "store_location_id": null
        });
        let cart: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(cart, Cart::empty());
    }

    #[test]
    fn test_cart_item_lookup() {
        let item = CartItem {
            id: CartItemId::new(5),
            product_id: ProductId::new(1),
            name: "Pad Thai".to_string(),
            quantity: 2,
            price_at_sale: Decimal::new(1250, 2),
            notes: None,
            selected_modifiers: vec![],
        };
        let cart = Cart {
            items: vec![item.clone()],
            ..Cart::empty()
        };
        assert_eq!(cart.item(CartItemId::new(5)), Some(&item));
        assert!(cart.item(CartItemId::new(6)).is_none());
    }

    #[test]
    fn test_card_details_debug_redacts_secrets() {
        let card = CardDetails {
            number: "4242424242424242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
        };
        let debug_output = format!("{card:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("4242"));
        assert!(!debug_output.contains("123"));
    }

    #[test]
    fn test_selection_type_wire_format() {
        let json = serde_json::to_string(&SelectionType::Single).unwrap();
        assert_eq!(json, "\"SINGLE\"");
        let back: SelectionType = serde_json::from_str("\"MULTIPLE\"").unwrap();
        assert_eq!(back, SelectionType::Multiple);
    }
}
