//! Handlers for `/zones` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/zones` | All zones |
//! | `POST` | `/zones` | Body: [`NewZone`]; returns 201 |
//! | `GET`  | `/zones/{id}` | 404 if not found |
//! | `GET`  | `/zones/{id}/beneficiaries` | Beneficiaries within the zone radius |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  beneficiary::Beneficiary,
  geo::{Nearby, resolve_radius},
  store::OutreachStore,
  zone::{NewZone, OutreachZone},
};
use uuid::Uuid;

use crate::{error::ApiError, extract::{Json, Path}};

/// `GET /zones`
pub async fn list<S: OutreachStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<OutreachZone>>, ApiError> {
  let zones = store.list_zones().await.map_err(ApiError::store)?;
  Ok(Json(zones))
}

/// `POST /zones`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewZone>,
) -> Result<impl IntoResponse, ApiError> {
  let zone = store.create_zone(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(zone)))
}

async fn require_zone<S: OutreachStore>(store: &S, id: Uuid) -> Result<OutreachZone, ApiError> {
  store
    .get_zone(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("zone {id} not found")))
}

/// `GET /zones/{id}`
pub async fn get_one<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<OutreachZone>, ApiError> {
  Ok(Json(require_zone(store.as_ref(), id).await?))
}

/// `GET /zones/{id}/beneficiaries`
pub async fn beneficiaries<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Nearby<Beneficiary>>>, ApiError> {
  let zone = require_zone(store.as_ref(), id).await?;
  let center = zone
    .center
    .ok_or_else(|| ApiError::invalid_state(format!("zone {id} has no centre")))?;
  let radius_km = resolve_radius(zone.radius_km)?;
  let hits = store
    .find_nearby_beneficiaries(center, radius_km)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(hits))
}
