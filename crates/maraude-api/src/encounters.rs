//! Handlers for `/encounters` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/encounters` | Existing beneficiary or anonymous |
//! | `POST`  | `/encounters/quick` | May create the beneficiary inline |
//! | `GET`   | `/encounters/{id}` | 404 if not found |
//! | `PATCH` | `/encounters/{id}` | Body: [`EncounterPatch`] |
//! | `POST`  | `/encounters/{id}/needs` | Body: `{"codes":[...],"editor":{...}}` |
//! | `POST`  | `/encounters/{id}/actions` | Same shape as `needs` |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  encounter::{Encounter, EncounterPatch, QuickEncounter},
  member::Member,
  store::OutreachStore,
  taxonomy::TaxonomyKind,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, extract::{Json, Path}};

// ─── Record ───────────────────────────────────────────────────────────────────

/// `POST /encounters`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<QuickEncounter>,
) -> Result<impl IntoResponse, ApiError> {
  if body.new_beneficiary_nickname.is_some() {
    return Err(ApiError::BadRequest(
      "newBeneficiaryNickname is only accepted by /encounters/quick".into(),
    ));
  }
  let encounter = store
    .record_encounter(body.into_new_encounter()?)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(encounter)))
}

/// `POST /encounters/quick`
pub async fn quick<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<QuickEncounter>,
) -> Result<impl IntoResponse, ApiError> {
  let encounter = store
    .record_encounter(body.into_new_encounter()?)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(encounter)))
}

// ─── Get / correct ────────────────────────────────────────────────────────────

/// `GET /encounters/{id}`
pub async fn get_one<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Encounter>, ApiError> {
  let encounter = store
    .get_encounter(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("encounter {id} not found")))?;
  Ok(Json(encounter))
}

/// `PATCH /encounters/{id}`
pub async fn update<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<EncounterPatch>,
) -> Result<Json<Encounter>, ApiError> {
  let encounter = store.update_encounter(id, patch).await.map_err(ApiError::store)?;
  Ok(Json(encounter))
}

// ─── Tagging ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TagBody {
  pub codes:  Vec<String>,
  #[serde(default)]
  pub editor: Option<Member>,
}

async fn tag<S: OutreachStore>(
  store: &S,
  id: Uuid,
  kind: TaxonomyKind,
  body: TagBody,
) -> Result<Json<Encounter>, ApiError> {
  if body.codes.is_empty() {
    return Err(ApiError::BadRequest("codes must not be empty".into()));
  }
  let encounter = store
    .tag_encounter(id, kind, body.codes, body.editor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(encounter))
}

/// `POST /encounters/{id}/needs`
pub async fn add_needs<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TagBody>,
) -> Result<Json<Encounter>, ApiError> {
  tag(store.as_ref(), id, TaxonomyKind::Need, body).await
}

/// `POST /encounters/{id}/actions`
pub async fn add_actions<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TagBody>,
) -> Result<Json<Encounter>, ApiError> {
  tag(store.as_ref(), id, TaxonomyKind::Action, body).await
}
