//! Tableside checkout orchestration engine.
//!
//! Drives a customer session from cart building through payment to a placed
//! order against the remote cart service. The server owns cart state; this
//! crate maintains an optimistic local mirror, sequences the checkout steps,
//! and runs the exactly-once cart-to-order conversion protocol.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod checkout;
pub mod config;
pub mod error;
pub mod modifiers;
pub mod payment;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

pub use api::{ApiError, CardGatewayClient, CartApi, PaymentGateway, RestCartClient};
pub use checkout::{CheckoutForm, CheckoutSession, CheckoutStep, FormField};
pub use config::CheckoutConfig;
pub use error::CheckoutError;
pub use payment::{OrderConversion, SubmitOutcome};
pub use session::{Identity, SessionContext, SessionKey};
pub use sync::{CartNotice, CartSync, CartUpdate};
