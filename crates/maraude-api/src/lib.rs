//! JSON REST API for street-outreach coordination.
//!
//! Exposes an axum [`Router`] backed by any
//! [`maraude_core::store::OutreachStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! Errors are answered as `{"error": "...", "kind": "..."}` with a status
//! derived from [`maraude_core::ErrorKind`]; see [`error::status_for`].
//! Malformed bodies, query strings and path segments get the same shape
//! through the wrappers in [`extract`].
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", maraude_api::api_router(store.clone()))
//! ```

pub mod beneficiaries;
pub mod encounters;
pub mod error;
pub mod extract;
pub mod maraudes;
pub mod referrals;
pub mod structures;
pub mod taxonomy;
pub mod zones;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use maraude_core::store::{DEFAULT_PAGE_LIMIT, OutreachStore, PageRequest};

pub use error::ApiError;

use crate::taxonomy::{Actions, Needs};

/// Page request from optional `?page` and `?limit` query values.
pub(crate) fn page_request(page: Option<u32>, limit: Option<u32>) -> PageRequest {
  PageRequest::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_LIMIT))
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: OutreachStore + 'static,
{
  Router::new()
    // Beneficiaries
    .route(
      "/beneficiaries",
      get(beneficiaries::list::<S>).post(beneficiaries::create::<S>),
    )
    .route("/beneficiaries/nearby", get(beneficiaries::nearby::<S>))
    .route(
      "/beneficiaries/{id}",
      get(beneficiaries::get_one::<S>).patch(beneficiaries::update::<S>),
    )
    .route("/beneficiaries/{id}/history", get(beneficiaries::history::<S>))
    .route("/beneficiaries/{id}/anonymize", post(beneficiaries::anonymize::<S>))
    .route("/beneficiaries/{id}/export", get(beneficiaries::export::<S>))
    // Outreach sessions
    .route("/maraudes", get(maraudes::list::<S>).post(maraudes::create::<S>))
    .route("/maraudes/{id}", get(maraudes::get_one::<S>))
    .route("/maraudes/{id}/start", patch(maraudes::start::<S>))
    .route("/maraudes/{id}/end", patch(maraudes::end::<S>))
    .route("/maraudes/{id}/cancel", patch(maraudes::cancel::<S>))
    .route("/maraudes/{id}/join", post(maraudes::join::<S>))
    .route("/maraudes/{id}/leave", delete(maraudes::leave::<S>))
    .route("/maraudes/{id}/report", post(maraudes::recompile::<S>))
    // Encounters
    .route("/encounters", post(encounters::create::<S>))
    .route("/encounters/quick", post(encounters::quick::<S>))
    .route(
      "/encounters/{id}",
      get(encounters::get_one::<S>).patch(encounters::update::<S>),
    )
    .route("/encounters/{id}/needs", post(encounters::add_needs::<S>))
    .route("/encounters/{id}/actions", post(encounters::add_actions::<S>))
    // Taxonomies
    .route(
      "/need-categories",
      get(taxonomy::list::<S, Needs>).post(taxonomy::create::<S, Needs>),
    )
    .route(
      "/need-categories/{code}",
      patch(taxonomy::update::<S, Needs>).delete(taxonomy::delete::<S, Needs>),
    )
    .route(
      "/action-categories",
      get(taxonomy::list::<S, Actions>).post(taxonomy::create::<S, Actions>),
    )
    .route(
      "/action-categories/{code}",
      patch(taxonomy::update::<S, Actions>).delete(taxonomy::delete::<S, Actions>),
    )
    // Referrals
    .route("/referrals", get(referrals::list::<S>).post(referrals::create::<S>))
    .route("/referrals/pending", get(referrals::pending::<S>))
    .route("/referrals/follow-up", get(referrals::follow_up::<S>))
    .route(
      "/referrals/{id}",
      get(referrals::get_one::<S>).patch(referrals::update::<S>),
    )
    // Referral structures
    .route(
      "/referral-structures",
      get(structures::list::<S>).post(structures::create::<S>),
    )
    .route("/referral-structures/nearby", get(structures::nearby::<S>))
    // Zones
    .route("/zones", get(zones::list::<S>).post(zones::create::<S>))
    .route("/zones/{id}", get(zones::get_one::<S>))
    .route("/zones/{id}/beneficiaries", get(zones::beneficiaries::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
