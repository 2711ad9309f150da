//! Handlers for `/referrals` endpoints.
//!
//! Every referral returned carries its effective status: a non-terminal
//! referral whose appointment is past reads as `EXPIRED`.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/referrals` | `?status`, `?beneficiaryId`, `?page`, `?limit` |
//! | `POST`  | `/referrals` | Body: [`NewReferral`]; returns 201 |
//! | `GET`   | `/referrals/pending` | Effective status `PROPOSED` |
//! | `GET`   | `/referrals/follow-up` | Follow-up due on or before `?asOf` (default now) |
//! | `GET`   | `/referrals/{id}` | 404 if not found |
//! | `PATCH` | `/referrals/{id}` | Body: [`ReferralUpdate`]; 409 on stale `expectedStatus` |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use maraude_core::{
  referral::{NewReferral, Referral, ReferralStatus, ReferralUpdate},
  store::{OutreachStore, Page, ReferralQuery},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, extract::{Json, Path, Query}, page_request};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub status:         Option<ReferralStatus>,
  pub beneficiary_id: Option<Uuid>,
  pub page:           Option<u32>,
  pub limit:          Option<u32>,
}

/// `GET /referrals`
pub async fn list<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Referral>>, ApiError> {
  let query = ReferralQuery {
    status:         params.status,
    beneficiary_id: params.beneficiary_id,
    page:           page_request(params.page, params.limit),
  };
  let page = store.list_referrals(query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingParams {
  pub beneficiary_id: Option<Uuid>,
  pub page:           Option<u32>,
  pub limit:          Option<u32>,
}

/// `GET /referrals/pending`
pub async fn pending<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<PendingParams>,
) -> Result<Json<Page<Referral>>, ApiError> {
  let query = ReferralQuery {
    status:         Some(ReferralStatus::Proposed),
    beneficiary_id: params.beneficiary_id,
    page:           page_request(params.page, params.limit),
  };
  let page = store.list_referrals(query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpParams {
  pub as_of: Option<DateTime<Utc>>,
}

/// `GET /referrals/follow-up[?asOf=<rfc3339>]`
pub async fn follow_up<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<FollowUpParams>,
) -> Result<Json<Vec<Referral>>, ApiError> {
  let as_of = params.as_of.unwrap_or_else(Utc::now);
  let due = store.follow_up_referrals(as_of).await.map_err(ApiError::store)?;
  Ok(Json(due))
}

// ─── Create / get / update ────────────────────────────────────────────────────

/// `POST /referrals`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewReferral>,
) -> Result<impl IntoResponse, ApiError> {
  let referral = store.create_referral(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(referral)))
}

/// `GET /referrals/{id}`
pub async fn get_one<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Referral>, ApiError> {
  let referral = store
    .get_referral(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("referral {id} not found")))?;
  Ok(Json(referral))
}

/// `PATCH /referrals/{id}`
pub async fn update<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ReferralUpdate>,
) -> Result<Json<Referral>, ApiError> {
  let referral = store.update_referral(id, body).await.map_err(ApiError::store)?;
  Ok(Json(referral))
}
