//! Core types and trait definitions for the street-outreach coordination
//! service.
//!
//! This crate is deliberately free of HTTP and database dependencies. State
//! machines, validation rules, and report aggregation live here as pure
//! functions so every backend enforces them identically.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod availability;
pub mod beneficiary;
pub mod encounter;
pub mod error;
pub mod geo;
pub mod member;
pub mod referral;
pub mod report;
pub mod session;
pub mod store;
pub mod taxonomy;
pub mod zone;

pub use error::{Classify, Error, ErrorKind, Result};
