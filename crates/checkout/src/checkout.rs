//! Checkout step state machine.
//!
//! Sequences location selection, customer info, and review/payment, gated
//! by per-step validation. The terminal `Confirmed` step is entered only as
//! a side effect of the conversion protocol succeeding - never by direct
//! user action.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use tableside_core::money::round_cents;

use crate::error::CheckoutError;
use crate::session::Identity;
use crate::types::{Cart, GuestContact, Order};

/// Minimum digits required in a phone number after stripping formatting.
const MIN_PHONE_DIGITS: usize = 10;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

/// The checkout wizard's steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckoutStep {
    Location,
    CustomerInfo,
    ReviewTip,
    /// Terminal. Entered only via conversion success.
    Confirmed,
}

impl CheckoutStep {
    /// Zero-based step index.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Location => 0,
            Self::CustomerInfo => 1,
            Self::ReviewTip => 2,
            Self::Confirmed => 3,
        }
    }

    const fn previous(self) -> Self {
        match self {
            Self::Location | Self::CustomerInfo => Self::Location,
            Self::ReviewTip => Self::CustomerInfo,
            Self::Confirmed => Self::ReviewTip,
        }
    }
}

/// Form fields that can carry a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    FirstName,
    LastName,
    Email,
    Phone,
}

impl FormField {
    /// Stable key for UI error rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }
}

/// The checkout form's field values.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub notes: String,
    pub tip: Decimal,
}

impl CheckoutForm {
    /// The guest contact payload persisted onto the cart at submission.
    #[must_use]
    pub fn guest_contact(&self) -> GuestContact {
        GuestContact {
            guest_first_name: self.first_name.trim().to_string(),
            guest_last_name: self.last_name.trim().to_string(),
            guest_email: self.email.trim().to_string(),
            guest_phone: self.phone.trim().to_string(),
        }
    }
}

/// Ephemeral checkout wizard state. Never persisted server-side.
///
/// One session drives one order; after `Confirmed` a fresh session must be
/// created for the next order.
#[derive(Debug, Default)]
pub struct CheckoutSession {
    step: CheckoutStep,
    /// Current form field values; the UI writes these directly.
    pub form: CheckoutForm,
    errors: HashMap<FormField, String>,
    surcharge_preview: Option<Decimal>,
    order: Option<Order>,
}

impl Default for CheckoutStep {
    fn default() -> Self {
        Self::Location
    }
}

impl CheckoutSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    /// Field-keyed validation errors from the last blocked transition.
    #[must_use]
    pub const fn errors(&self) -> &HashMap<FormField, String> {
        &self.errors
    }

    /// The finalized order, present once the session is confirmed.
    #[must_use]
    pub const fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// Last-known surcharge preview figure for the review step.
    #[must_use]
    pub const fn surcharge_preview(&self) -> Option<Decimal> {
        self.surcharge_preview
    }

    /// Recompute the surcharge preview from the cart's subtotal.
    ///
    /// Display-only; the backend adds the authoritative surcharge at
    /// completion.
    pub fn update_surcharge_preview(&mut self, cart: &Cart, surcharge_rate: Decimal) {
        self.surcharge_preview = Some(round_cents(cart.totals.subtotal * surcharge_rate));
    }

    /// Attempt to advance one step.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the current step's gate fails; for
    /// the customer-info step the per-field details land in [`Self::errors`].
    /// `ReviewTip` cannot be advanced directly - only the conversion
    /// protocol moves a session to `Confirmed`.
    pub fn advance(
        &mut self,
        cart: &Cart,
        identity: &Identity,
    ) -> Result<CheckoutStep, CheckoutError> {
        match self.step {
            CheckoutStep::Location => {
                if !cart.totals.has_location {
                    return Err(CheckoutError::Validation(
                        "Please choose a pickup location first.".to_string(),
                    ));
                }
                self.errors.clear();
                self.step = CheckoutStep::CustomerInfo;
            }
            CheckoutStep::CustomerInfo => {
                // An authenticated identity already resolves contact info.
                if !matches!(identity, Identity::Authenticated { .. }) {
                    let errors = validate_guest_form(&self.form);
                    if !errors.is_empty() {
                        self.errors = errors;
                        return Err(CheckoutError::Validation(
                            "Please correct the highlighted fields.".to_string(),
                        ));
                    }
                }
                self.errors.clear();
                self.step = CheckoutStep::ReviewTip;
            }
            CheckoutStep::ReviewTip => {
                return Err(CheckoutError::Validation(
                    "Submit payment to place the order.".to_string(),
                ));
            }
            CheckoutStep::Confirmed => return Err(CheckoutError::SessionFinished),
        }
        Ok(self.step)
    }

    /// Step backward once, clearing current errors. Always allowed; the
    /// floor is step 0.
    pub fn back(&mut self) -> CheckoutStep {
        self.errors.clear();
        self.step = self.step.previous();
        self.step
    }

    /// Finalize the session with the order snapshot from the completion
    /// endpoint. Called only by the conversion protocol.
    pub(crate) fn complete(&mut self, order: Order) {
        self.order = Some(order);
        self.errors.clear();
        self.step = CheckoutStep::Confirmed;
    }

    /// Whether this session has already produced an order.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.order.is_some()
    }
}

/// Validate the guest checkout form, returning field-keyed errors.
#[must_use]
pub fn validate_guest_form(form: &CheckoutForm) -> HashMap<FormField, String> {
    let mut errors = HashMap::new();

    if form.first_name.trim().is_empty() {
        errors.insert(FormField::FirstName, "First name is required.".to_string());
    }
    if form.last_name.trim().is_empty() {
        errors.insert(FormField::LastName, "Last name is required.".to_string());
    }
    if !EMAIL_PATTERN.is_match(form.email.trim()) {
        errors.insert(
            FormField::Email,
            "Please enter a valid email address.".to_string(),
        );
    }
    let digits = form.phone.chars().filter(char::is_ascii_digit).count();
    if digits < MIN_PHONE_DIGITS {
        errors.insert(
            FormField::Phone,
            "Please enter a valid phone number.".to_string(),
        );
    }

    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn guest() -> Identity {
        Identity::Guest {
            session_token: None,
        }
    }

    fn valid_form() -> CheckoutForm {
        CheckoutForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "(555) 010-1234".to_string(),
            notes: String::new(),
            tip: Decimal::ZERO,
        }
    }

    fn cart_with_location() -> Cart {
        let mut cart = Cart::empty();
        cart.totals.has_location = true;
        cart
    }

    #[test]
    fn test_location_step_requires_location() {
        let mut session = CheckoutSession::new();
        let err = session.advance(&Cart::empty(), &guest());
        assert!(err.is_err());
        assert_eq!(session.step(), CheckoutStep::Location);

        let step = session.advance(&cart_with_location(), &guest()).unwrap();
        assert_eq!(step, CheckoutStep::CustomerInfo);
    }

    #[test]
    fn test_guest_validation_blocks_and_keys_errors() {
        let mut session = CheckoutSession::new();
        session.advance(&cart_with_location(), &guest()).unwrap();

        session.form = CheckoutForm {
            email: "not-an-email".to_string(),
            phone: "123".to_string(),
            ..CheckoutForm::default()
        };
        assert!(session.advance(&cart_with_location(), &guest()).is_err());
        assert_eq!(session.step(), CheckoutStep::CustomerInfo);
        assert!(session.errors().contains_key(&FormField::FirstName));
        assert!(session.errors().contains_key(&FormField::LastName));
        assert!(session.errors().contains_key(&FormField::Email));
        assert!(session.errors().contains_key(&FormField::Phone));
    }

    #[test]
    fn test_guest_with_valid_form_advances() {
        let mut session = CheckoutSession::new();
        session.advance(&cart_with_location(), &guest()).unwrap();
        session.form = valid_form();
        let step = session.advance(&cart_with_location(), &guest()).unwrap();
        assert_eq!(step, CheckoutStep::ReviewTip);
        assert!(session.errors().is_empty());
    }

    #[test]
    fn test_authenticated_skips_contact_validation() {
        let identity = Identity::Authenticated {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            access_token: SecretString::from("at_test"),
        };
        let mut session = CheckoutSession::new();
        session.advance(&cart_with_location(), &identity).unwrap();
        // Empty form, but the identity resolves contact info.
        let step = session.advance(&cart_with_location(), &identity).unwrap();
        assert_eq!(step, CheckoutStep::ReviewTip);
    }

    #[test]
    fn test_review_step_cannot_advance_directly() {
        let mut session = CheckoutSession::new();
        session.advance(&cart_with_location(), &guest()).unwrap();
        session.form = valid_form();
        session.advance(&cart_with_location(), &guest()).unwrap();

        assert!(session.advance(&cart_with_location(), &guest()).is_err());
        assert_eq!(session.step(), CheckoutStep::ReviewTip);
    }

    #[test]
    fn test_back_clears_errors_and_floors_at_zero() {
        let mut session = CheckoutSession::new();
        session.advance(&cart_with_location(), &guest()).unwrap();
        // Fail validation to populate errors.
        let _ = session.advance(&cart_with_location(), &guest());
        assert!(!session.errors().is_empty());

        assert_eq!(session.back(), CheckoutStep::Location);
        assert!(session.errors().is_empty());
        // Already at the floor.
        assert_eq!(session.back(), CheckoutStep::Location);
    }

    #[test]
    fn test_phone_strips_formatting() {
        let mut form = valid_form();
        form.phone = "+1 (555) 010-1234".to_string();
        assert!(validate_guest_form(&form).is_empty());

        form.phone = "555-0101".to_string(); // only 7 digits
        assert!(validate_guest_form(&form).contains_key(&FormField::Phone));
    }

    #[test]
    fn test_email_pattern() {
        for good in ["a@b.co", "user.name+tag@domain.co.uk"] {
            let mut form = valid_form();
            form.email = good.to_string();
            assert!(validate_guest_form(&form).is_empty(), "{good} should pass");
        }
        for bad in ["", "no-at", "a b@c.d", "a@b", "@b.c"] {
            let mut form = valid_form();
            form.email = bad.to_string();
            assert!(
                validate_guest_form(&form).contains_key(&FormField::Email),
                "{bad} should fail"
            );
        }
    }
}
