//! Core types for Tableside.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;

pub use id::*;
pub use money::{Totals, TotalsPreview};
