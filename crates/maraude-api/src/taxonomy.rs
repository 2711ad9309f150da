//! Handlers for the need and action taxonomies.
//!
//! Both `/need-categories` and `/action-categories` are served by the same
//! handlers; the taxonomy is picked by the [`Taxonomy`] marker type.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/need-categories` | All need categories |
//! | `POST`   | `/need-categories` | Body: [`NewCategory`]; 409 on duplicate code |
//! | `PATCH`  | `/need-categories/{code}` | Body: [`CategoryPatch`] |
//! | `DELETE` | `/need-categories/{code}` | 409 while referenced or parent of another |
//!
//! `/action-categories` mirrors the table above.

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  store::OutreachStore,
  taxonomy::{CategoryPatch, NewCategory, TaxonomyCode, TaxonomyKind},
};

use crate::{error::ApiError, extract::{Json, Path}};

/// Binds a handler to one taxonomy at routing time.
pub trait Taxonomy: Send + Sync + 'static {
  const KIND: TaxonomyKind;
}

pub struct Needs;
pub struct Actions;

impl Taxonomy for Needs {
  const KIND: TaxonomyKind = TaxonomyKind::Need;
}

impl Taxonomy for Actions {
  const KIND: TaxonomyKind = TaxonomyKind::Action;
}

/// `GET /{kind}-categories`
pub async fn list<S: OutreachStore, T: Taxonomy>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<TaxonomyCode>>, ApiError> {
  let categories = store.list_categories(T::KIND).await.map_err(ApiError::store)?;
  Ok(Json(categories))
}

/// `POST /{kind}-categories`
pub async fn create<S: OutreachStore, T: Taxonomy>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewCategory>,
) -> Result<impl IntoResponse, ApiError> {
  let category = store.create_category(T::KIND, body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(category)))
}

/// `PATCH /{kind}-categories/{code}`
pub async fn update<S: OutreachStore, T: Taxonomy>(
  State(store): State<Arc<S>>,
  Path(code): Path<String>,
  Json(patch): Json<CategoryPatch>,
) -> Result<Json<TaxonomyCode>, ApiError> {
  let category = store
    .update_category(T::KIND, code, patch)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(category))
}

/// `DELETE /{kind}-categories/{code}`
pub async fn delete<S: OutreachStore, T: Taxonomy>(
  State(store): State<Arc<S>>,
  Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
  store.delete_category(T::KIND, code).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
