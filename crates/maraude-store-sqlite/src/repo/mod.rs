//! Synchronous row-level access, one module per aggregate.
//!
//! Every function takes a plain [`rusqlite::Connection`] so it can run either
//! directly or inside a [`rusqlite::Transaction`] (which derefs to one). The
//! async [`crate::SqliteStore`] composes these into units of work.

pub mod beneficiary;
pub mod encounter;
pub mod referral;
pub mod session;
pub mod taxonomy;
pub mod zone;
