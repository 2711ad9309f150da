//! SQLite backend for the outreach store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Because every call is executed
//! in order on that single connection, each mutation's read-check-write
//! sequence runs inside one transaction with no interleaving writer.

mod encode;
mod repo;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
