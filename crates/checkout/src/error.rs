//! Checkout error taxonomy.
//!
//! Classifies failures into the categories the UI reacts to differently:
//! local validation, stock/business rules, identity, gateway declines, and
//! network faults. Transport-level errors live in [`crate::api::ApiError`];
//! this module maps them into user-facing categories.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::api::{ApiError, GatewayError};

/// User-facing checkout failure.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Local validation failure - never reaches the network.
    #[error("{0}")]
    Validation(String),

    /// Backend-reported stock shortage, rewritten with the exact available
    /// quantity when the backend supplies one.
    #[error("{}", stock_user_message(.available, .message))]
    Stock {
        /// Quantity still available, when the backend named one.
        available: Option<u32>,
        /// The backend's original message.
        message: String,
    },

    /// Backend-reported business-rule failure, surfaced verbatim.
    #[error("{0}")]
    BusinessRule(String),

    /// Identity failure that survived the bounded refresh-and-retry.
    #[error("Your session has expired. Please sign in again.")]
    Identity,

    /// Session refresh failed - the caller must treat this as a logout.
    #[error("You have been signed out.")]
    LoggedOut,

    /// Gateway-level decline. No backend state has been mutated, so
    /// resubmitting is always safe.
    #[error("Payment declined: {0}")]
    GatewayDeclined(String),

    /// Network or timeout fault; optimistic cart state has been rolled back.
    #[error("Something went wrong. Please check your connection and try again.")]
    Network(#[source] ApiError),

    /// The checkout session has already produced an order.
    #[error("This order has already been placed.")]
    SessionFinished,

    /// Any other transport failure.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Matches backend stock messages like "Only 2 items available".
static STOCK_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"(?i)only\s+(\d+)\s+items?\s+available").unwrap()
});

fn stock_user_message(available: &Option<u32>, original: &str) -> String {
    match *available {
        Some(1) => "Sorry, only 1 item is available in stock.".to_string(),
        Some(n) => format!("Sorry, only {n} items are available in stock."),
        None => original.to_string(),
    }
}

/// Extract the available quantity from a backend stock message, if present.
#[must_use]
pub fn parse_available_quantity(message: &str) -> Option<u32> {
    STOCK_QUANTITY
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether a backend message describes an inventory shortage.
#[must_use]
pub fn is_stock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("available") && (lower.contains("stock") || lower.contains("only"))
        || lower.contains("insufficient")
        || lower.contains("out of stock")
}

/// Map a transport error into the checkout taxonomy.
pub(crate) fn classify_api_error(err: ApiError) -> CheckoutError {
    match err {
        ApiError::Business(message) => {
            if is_stock_message(&message) {
                CheckoutError::Stock {
                    available: parse_available_quantity(&message),
                    message,
                }
            } else {
                CheckoutError::BusinessRule(message)
            }
        }
        ApiError::Unauthorized(_) | ApiError::Forbidden(_) => CheckoutError::Identity,
        ApiError::LoggedOut => CheckoutError::LoggedOut,
        ApiError::Http(e) if e.is_timeout() || e.is_connect() => {
            CheckoutError::Network(ApiError::Http(e))
        }
        other => CheckoutError::Api(other),
    }
}

/// Map a gateway error into the checkout taxonomy.
pub(crate) fn classify_gateway_error(err: GatewayError) -> CheckoutError {
    match err {
        GatewayError::Declined(message) => CheckoutError::GatewayDeclined(message),
        GatewayError::Http(e) => CheckoutError::Network(ApiError::Http(e)),
        GatewayError::Protocol(message) => CheckoutError::BusinessRule(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_available_quantity() {
        assert_eq!(parse_available_quantity("Only 2 items available"), Some(2));
        assert_eq!(
            parse_available_quantity("Insufficient stock: only 1 item available"),
            Some(1)
        );
        assert_eq!(parse_available_quantity("Out of stock"), None);
    }

    #[test]
    fn test_stock_message_rewrite() {
        let err = CheckoutError::Stock {
            available: Some(2),
            message: "Only 2 items available".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Sorry, only 2 items are available in stock."
        );
    }

    #[test]
    fn test_stock_message_singular() {
        let err = CheckoutError::Stock {
            available: Some(1),
            message: "Only 1 item available".to_string(),
        };
        assert_eq!(err.to_string(), "Sorry, only 1 item is available in stock.");
    }

    #[test]
    fn test_stock_message_without_quantity_passes_through() {
        let err = CheckoutError::Stock {
            available: None,
            message: "Out of stock".to_string(),
        };
        assert_eq!(err.to_string(), "Out of stock");
    }

    #[test]
    fn test_classify_business_stock() {
        let err = classify_api_error(ApiError::Business("Only 3 items available".to_string()));
        assert!(matches!(
            err,
            CheckoutError::Stock {
                available: Some(3),
                ..
            }
        ));
    }

    #[test]
    fn test_classify_identity() {
        let err = classify_api_error(ApiError::Unauthorized("session expired".to_string()));
        assert!(matches!(err, CheckoutError::Identity));
    }

    #[test]
    fn test_classify_gateway_decline() {
        let err = classify_gateway_error(GatewayError::Declined("card_declined".to_string()));
        assert_eq!(err.to_string(), "Payment declined: card_declined");
    }
}
