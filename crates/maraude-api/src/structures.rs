//! Handlers for `/referral-structures` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/referral-structures` | Optional `?type=CHU\|SANTE\|...` |
//! | `POST` | `/referral-structures` | Body: [`NewStructure`]; returns 201 |
//! | `GET`  | `/referral-structures/nearby` | `?lat&lng[&radiusKm]` |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  geo::Nearby,
  referral::{NewStructure, ReferralStructure, StructureType},
  store::OutreachStore,
};
use serde::Deserialize;

use crate::{beneficiaries::NearbyParams, error::ApiError, extract::{Json, Query}};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(rename = "type")]
  pub structure_type: Option<StructureType>,
}

/// `GET /referral-structures[?type=<type>]`
pub async fn list<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReferralStructure>>, ApiError> {
  let structures = store
    .list_structures(params.structure_type)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(structures))
}

/// `POST /referral-structures`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewStructure>,
) -> Result<impl IntoResponse, ApiError> {
  let structure = store.create_structure(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(structure)))
}

/// `GET /referral-structures/nearby?lat&lng[&radiusKm]`
pub async fn nearby<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<Nearby<ReferralStructure>>>, ApiError> {
  let (center, radius_km) = params.resolve()?;
  let hits = store
    .find_nearby_structures(center, radius_km)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(hits))
}
