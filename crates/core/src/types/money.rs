//! Money arithmetic for cart totals.
//!
//! All amounts are [`rust_decimal::Decimal`] values in the currency's standard
//! unit (dollars, not cents) and cross the wire as strings to preserve
//! precision. The backend is the authoritative source for every figure in
//! [`Totals`]; the client only ever computes the *display preview* in
//! [`TotalsPreview`], which the backend figure overrides at reconciliation.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Server-computed cart totals.
///
/// Mirrors the shape returned by the cart endpoints. Never recomputed
/// locally - optimistic cart transforms carry the previous totals forward
/// and rely on the settle-refetch for the corrected figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of item price-at-sale snapshots (including modifier deltas).
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    /// Total discount applied by the backend.
    #[serde(with = "rust_decimal::serde::str")]
    pub discount_total: Decimal,
    /// Tax computed by the backend for the selected location.
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_total: Decimal,
    /// Grand total, excluding the surcharge added at payment completion.
    #[serde(with = "rust_decimal::serde::str")]
    pub grand_total: Decimal,
    /// Total item quantity across all cart lines.
    pub item_count: u32,
    /// Whether a store location has been selected (gates checkout step 0).
    pub has_location: bool,
}

impl Totals {
    /// The zeroed totals of the empty cart shape.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            grand_total: Decimal::ZERO,
            item_count: 0,
            has_location: false,
        }
    }
}

impl Default for Totals {
    fn default() -> Self {
        Self::zero()
    }
}

/// Display-only preview of the surcharge-inclusive total.
///
/// The surcharge is deliberately excluded from the gateway-facing payment
/// amount and added atomically by the backend at completion. This preview
/// exists so the review step can show the customer what will actually be
/// charged. Components are rounded individually, so they may not sum to the
/// displayed total by up to $0.01 - accepted, not a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsPreview {
    /// Surcharge on the subtotal, rounded to cents.
    pub surcharge: Decimal,
    /// Tax on the surcharge-inclusive amount, rounded to cents.
    pub tax: Decimal,
    /// Surcharge-inclusive amount plus unrounded tax, rounded to cents.
    pub grand_total: Decimal,
}

impl TotalsPreview {
    /// Compute the preview for a subtotal at the given rates.
    ///
    /// Rates are fractional (3.5% is `0.035`). The surcharge is rounded to
    /// cents before tax applies; tax enters the grand total unrounded.
    #[must_use]
    pub fn compute(subtotal: Decimal, surcharge_rate: Decimal, tax_rate: Decimal) -> Self {
        let surcharge = round_cents(subtotal * surcharge_rate);
        let taxable = subtotal + surcharge;
        let tax_raw = taxable * tax_rate;
        Self {
            surcharge,
            tax: round_cents(tax_raw),
            grand_total: round_cents(taxable + tax_raw),
        }
    }
}

/// Round a money amount to cents, midpoints away from zero.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
