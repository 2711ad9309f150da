//! Handlers for `/maraudes` (outreach session) endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/maraudes` | `?status`, `?zoneId`, `?page`, `?limit` |
//! | `POST`   | `/maraudes` | Body: [`NewSession`]; returns 201 |
//! | `GET`    | `/maraudes/{id}` | 404 if not found |
//! | `PATCH`  | `/maraudes/{id}/start` | Optional body: `{"expectedVersion":1}` |
//! | `PATCH`  | `/maraudes/{id}/end` | Body: `{"expectedVersion":2,"summary":"..."}` |
//! | `PATCH`  | `/maraudes/{id}/cancel` | Body: `{"expectedVersion":1}` |
//! | `POST`   | `/maraudes/{id}/join` | Body: [`JoinRequest`]; idempotent |
//! | `DELETE` | `/maraudes/{id}/leave` | Body: `{"member":{...}}`; idempotent |
//! | `POST`   | `/maraudes/{id}/report` | Recompile the report of a completed session |

use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use maraude_core::{
  member::Member,
  session::{NewSession, OutreachSession, SessionStatus},
  store::{JoinRequest, OutreachStore, Page, SessionQuery},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::{error::ApiError, extract::{Json, Path, Query}, page_request};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub status:  Option<SessionStatus>,
  pub zone_id: Option<Uuid>,
  pub page:    Option<u32>,
  pub limit:   Option<u32>,
}

/// `GET /maraudes`
pub async fn list<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<OutreachSession>>, ApiError> {
  let query = SessionQuery {
    status:  params.status,
    zone_id: params.zone_id,
    page:    page_request(params.page, params.limit),
  };
  let page = store.list_sessions(query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

// ─── Plan / get ───────────────────────────────────────────────────────────────

/// `POST /maraudes`
pub async fn create<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewSession>,
) -> Result<impl IntoResponse, ApiError> {
  let session = store.plan_session(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /maraudes/{id}`
pub async fn get_one<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<OutreachSession>, ApiError> {
  let session = store
    .get_session(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("maraude {id} not found")))?;
  Ok(Json(session))
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionBody {
  /// Optimistic-concurrency token; a mismatch answers 409.
  pub expected_version: Option<u64>,
  /// Only read by `end`; stored on the compiled report.
  pub summary:          Option<String>,
}

/// `PATCH /maraudes/{id}/start`
pub async fn start<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  body: Option<Json<TransitionBody>>,
) -> Result<Json<OutreachSession>, ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let session = store
    .start_session(id, body.expected_version)
    .await
    .map_err(ApiError::store)?;

  let unavailable = session.unavailable_participants();
  if !unavailable.is_empty() {
    let members: Vec<String> = unavailable.iter().map(Member::to_string).collect();
    warn!(session_id = %id, members = ?members, "participants not available at session start");
  }
  Ok(Json(session))
}

/// `PATCH /maraudes/{id}/end`
pub async fn end<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  body: Option<Json<TransitionBody>>,
) -> Result<Json<OutreachSession>, ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let session = store
    .end_session(id, body.expected_version, body.summary)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(session))
}

/// `PATCH /maraudes/{id}/cancel`
pub async fn cancel<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  body: Option<Json<TransitionBody>>,
) -> Result<Json<OutreachSession>, ApiError> {
  let body = body.map(|Json(b)| b).unwrap_or_default();
  let session = store
    .cancel_session(id, body.expected_version)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(session))
}

/// `POST /maraudes/{id}/report`
pub async fn recompile<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<OutreachSession>, ApiError> {
  let session = store.recompile_report(id).await.map_err(ApiError::store)?;
  Ok(Json(session))
}

// ─── Roster ───────────────────────────────────────────────────────────────────

/// `POST /maraudes/{id}/join`
pub async fn join<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<JoinRequest>,
) -> Result<Json<OutreachSession>, ApiError> {
  let session = store.join_session(id, body).await.map_err(ApiError::store)?;
  Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct LeaveBody {
  pub member: Member,
}

/// `DELETE /maraudes/{id}/leave`
pub async fn leave<S: OutreachStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<LeaveBody>,
) -> Result<Json<OutreachSession>, ApiError> {
  let session = store.leave_session(id, body.member).await.map_err(ApiError::store)?;
  Ok(Json(session))
}
