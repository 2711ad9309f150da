//! Handlers for `/beneficiaries` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/beneficiaries` | `?q`, `?consent`, `?page`, `?limit` |
//! | `POST`  | `/beneficiaries` | Body: [`NewBeneficiary`]; returns 201 |
//! | `GET`   | `/beneficiaries/nearby` | `?lat&lng[&radiusKm]` |
//! | `GET`   | `/beneficiaries/{id}` | 404 if not found |
//! | `PATCH` | `/beneficiaries/{id}` | Body: [`BeneficiaryPatch`] |
//! | `GET`   | `/beneficiaries/{id}/history` | Encounter and referral summaries |
//! | `POST`  | `/beneficiaries/{id}/anonymize` | Idempotent |
//! | `GET`   | `/beneficiaries/{id}/export` | 403 once consent is withdrawn |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  beneficiary::{Beneficiary, BeneficiaryPatch, ConsentStatus, NewBeneficiary},
  geo::{GeoPoint, Nearby, resolve_radius},
  store::{BeneficiaryExport, BeneficiaryHistory, BeneficiaryQuery, OutreachStore, Page},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, extract::{Json, Path, Query}, page_request};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Case-insensitive nickname search.
  pub q:       Option<String>,
  pub consent: Option<ConsentStatus>,
  pub page:    Option<u32>,
  pub limit:   Option<u32>,
}

/// `GET /beneficiaries`
pub async fn list<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Beneficiary>>, ApiError> {
  let query = BeneficiaryQuery {
    text:    params.q.filter(|q| !q.trim().is_empty()),
    consent: params.consent,
    page:    page_request(params.page, params.limit),
  };
  let page = store.list_beneficiaries(query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /beneficiaries`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewBeneficiary>,
) -> Result<impl IntoResponse, ApiError> {
  let beneficiary = store.register_beneficiary(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(beneficiary)))
}

// ─── Get / update ─────────────────────────────────────────────────────────────

/// `GET /beneficiaries/{id}`
pub async fn get_one<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Beneficiary>, ApiError> {
  let beneficiary = store
    .get_beneficiary(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("beneficiary {id} not found")))?;
  Ok(Json(beneficiary))
}

/// `PATCH /beneficiaries/{id}`
pub async fn update<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<BeneficiaryPatch>,
) -> Result<Json<Beneficiary>, ApiError> {
  let beneficiary = store.update_beneficiary(id, patch).await.map_err(ApiError::store)?;
  Ok(Json(beneficiary))
}

// ─── Consent & data rights ────────────────────────────────────────────────────

/// `POST /beneficiaries/{id}/anonymize`
pub async fn anonymize<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Beneficiary>, ApiError> {
  let beneficiary = store.anonymize_beneficiary(id).await.map_err(ApiError::store)?;
  Ok(Json(beneficiary))
}

/// `GET /beneficiaries/{id}/export`
pub async fn export<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<BeneficiaryExport>, ApiError> {
  let export = store.export_beneficiary(id).await.map_err(ApiError::store)?;
  Ok(Json(export))
}

/// `GET /beneficiaries/{id}/history`
pub async fn history<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<BeneficiaryHistory>, ApiError> {
  let history = store.beneficiary_history(id).await.map_err(ApiError::store)?;
  Ok(Json(history))
}

// ─── Nearby ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
  pub lat:       f64,
  pub lng:       f64,
  pub radius_km: Option<f64>,
}

impl NearbyParams {
  pub fn resolve(&self) -> Result<(GeoPoint, f64), ApiError> {
    Ok((GeoPoint::new(self.lat, self.lng)?, resolve_radius(self.radius_km)?))
  }
}

/// `GET /beneficiaries/nearby?lat&lng[&radiusKm]`
pub async fn nearby<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<Nearby<Beneficiary>>>, ApiError> {
  let (center, radius_km) = params.resolve()?;
  let hits = store
    .find_nearby_beneficiaries(center, radius_km)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(hits))
}
