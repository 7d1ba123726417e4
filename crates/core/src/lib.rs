//! Tableside Core - Shared types library.
//!
//! This crate provides common types used across all Tableside components:
//! - `checkout` - Cart-to-order checkout orchestration engine
//! - `integration-tests` - Cross-component test harness
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and money arithmetic

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
