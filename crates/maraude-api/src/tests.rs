//! Router tests driving the full API over an in-memory store.

use std::sync::Arc;

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use maraude_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  api_router(Arc::new(store))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

async fn create_need(app: &Router, code: &str) {
  let (status, _) = send(
    app,
    "POST",
    "/need-categories",
    Some(json!({ "code": code, "name": code })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
}

/// Plan and start a session; returns its id.
async fn running_session(app: &Router) -> String {
  let (status, session) = send(
    app,
    "POST",
    "/maraudes",
    Some(json!({ "plannedStartAt": Utc::now(), "title": "Tournée nord" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let id = session["id"].as_str().unwrap().to_owned();
  let (status, _) = send(app, "PATCH", &format!("/maraudes/{id}/start"), None).await;
  assert_eq!(status, StatusCode::OK);
  id
}

// ─── Scenario ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quick_log_then_end_reports_counts() {
  let app = app().await;
  create_need(&app, "REPAS").await;
  let session_id = running_session(&app).await;

  let (status, encounter) = send(
    &app,
    "POST",
    "/encounters/quick",
    Some(json!({
      "sessionId": session_id,
      "newBeneficiaryNickname": "Jo",
      "needCodes": ["REPAS"],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(encounter["type"], "FIRST_CONTACT");
  let beneficiary_id = encounter["beneficiaryId"].as_str().unwrap().to_owned();

  let (status, jo) = send(&app, "GET", &format!("/beneficiaries/{beneficiary_id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(jo["nickname"], "Jo");
  assert_eq!(jo["gdprConsentStatus"], "PENDING");

  let (status, ended) = send(
    &app,
    "PATCH",
    &format!("/maraudes/{session_id}/end"),
    Some(json!({ "summary": "RAS" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(ended["status"], "COMPLETED");
  assert_eq!(ended["report"]["totalEncounters"], 1);
  assert_eq!(ended["report"]["newBeneficiaries"], 1);
  assert_eq!(ended["report"]["mealsDistributed"], 1);

  let (status, again) = send(&app, "POST", &format!("/maraudes/{session_id}/report"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(again["report"]["summary"], "RAS");
}

// ─── Error mapping ───────────────────────────────────────────────────────────

#[tokio::test]
async fn encounter_on_planned_session_is_422() {
  let app = app().await;
  let (_, session) = send(
    &app,
    "POST",
    "/maraudes",
    Some(json!({ "plannedStartAt": Utc::now() })),
  )
  .await;

  let (status, body) = send(
    &app,
    "POST",
    "/encounters",
    Some(json!({ "sessionId": session["id"] })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn unknown_code_is_400_and_leaves_nothing() {
  let app = app().await;
  let session_id = running_session(&app).await;

  let (status, body) = send(
    &app,
    "POST",
    "/encounters/quick",
    Some(json!({
      "sessionId": session_id,
      "newBeneficiaryNickname": "Lou",
      "needCodes": ["UNKNOWN_CODE"],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "unknown_category");

  let (_, page) = send(&app, "GET", "/beneficiaries", None).await;
  assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn blank_quick_nickname_is_400() {
  let app = app().await;
  let session_id = running_session(&app).await;
  let (status, body) = send(
    &app,
    "POST",
    "/encounters/quick",
    Some(json!({ "sessionId": session_id, "newBeneficiaryNickname": "  " })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");

  let (_, session) = send(&app, "GET", &format!("/maraudes/{session_id}"), None).await;
  assert!(session["encounterIds"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn inline_nickname_needs_quick_endpoint() {
  let app = app().await;
  let session_id = running_session(&app).await;
  let (status, _) = send(
    &app,
    "POST",
    "/encounters",
    Some(json!({ "sessionId": session_id, "newBeneficiaryNickname": "Max" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_category_is_409() {
  let app = app().await;
  create_need(&app, "COUVERTURE").await;
  let (status, body) = send(
    &app,
    "POST",
    "/need-categories",
    Some(json!({ "code": "couverture", "name": "Couverture" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "conflict");

  let (status, list) = send(&app, "GET", "/need-categories", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(list.as_array().unwrap().len(), 1);
  let (_, actions) = send(&app, "GET", "/action-categories", None).await;
  assert!(actions.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stale_version_is_409() {
  let app = app().await;
  let session_id = running_session(&app).await;
  let (status, _) = send(
    &app,
    "PATCH",
    &format!("/maraudes/{session_id}/end"),
    Some(json!({ "expectedVersion": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, ended) = send(
    &app,
    "PATCH",
    &format!("/maraudes/{session_id}/end"),
    Some(json!({ "expectedVersion": 2 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(ended["version"], 3);
}

#[tokio::test]
async fn withdrawn_export_is_403() {
  let app = app().await;
  let (_, b) = send(
    &app,
    "POST",
    "/beneficiaries",
    Some(json!({ "nickname": "Rosa", "gdprConsentStatus": "GIVEN" })),
  )
  .await;
  let id = b["id"].as_str().unwrap();

  let (status, _) = send(&app, "GET", &format!("/beneficiaries/{id}/export"), None).await;
  assert_eq!(status, StatusCode::OK);

  let (status, anon) = send(&app, "POST", &format!("/beneficiaries/{id}/anonymize"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(anon["nickname"].as_str().unwrap().starts_with("Anonyme-"));
  let (status, again) = send(&app, "POST", &format!("/beneficiaries/{id}/anonymize"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(anon, again);

  let (status, body) = send(&app, "GET", &format!("/beneficiaries/{id}/export"), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "consent");
}

#[tokio::test]
async fn missing_entities_are_404() {
  let app = app().await;
  let id = Uuid::new_v4();
  for uri in [
    format!("/beneficiaries/{id}"),
    format!("/maraudes/{id}"),
    format!("/encounters/{id}"),
    format!("/referrals/{id}"),
    format!("/zones/{id}"),
  ] {
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    assert_eq!(body["kind"], "not_found");
  }
}

#[tokio::test]
async fn oversized_radius_is_400() {
  let app = app().await;
  let (status, body) = send(
    &app,
    "GET",
    "/beneficiaries/nearby?lat=48.85&lng=2.35&radiusKm=5000",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn transitions_accept_a_bare_request() {
  let app = app().await;
  let session_id = running_session(&app).await;
  let (status, ended) = send(&app, "PATCH", &format!("/maraudes/{session_id}/end"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(ended["status"], "COMPLETED");
  assert!(ended["report"]["summary"].is_null());

  let (_, planned) = send(
    &app,
    "POST",
    "/maraudes",
    Some(json!({ "plannedStartAt": Utc::now() })),
  )
  .await;
  let id = planned["id"].as_str().unwrap();
  let (status, canceled) = send(&app, "PATCH", &format!("/maraudes/{id}/cancel"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(canceled["status"], "CANCELED");
}

#[tokio::test]
async fn unknown_enum_value_is_400() {
  let app = app().await;
  let (_, b) = send(&app, "POST", "/beneficiaries", Some(json!({ "nickname": "Noé" }))).await;
  let (_, referral) = send(
    &app,
    "POST",
    "/referrals",
    Some(json!({ "beneficiaryId": b["id"], "structureName": "Accueil de jour" })),
  )
  .await;
  let uri = format!("/referrals/{}", referral["id"].as_str().unwrap());

  let (status, body) = send(&app, "PATCH", &uri, Some(json!({ "status": "BOGUS" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");
  assert!(body["error"].as_str().unwrap().contains("BOGUS"));

  let (_, unchanged) = send(&app, "GET", &uri, None).await;
  assert_eq!(unchanged["status"], "PROPOSED");
}

#[tokio::test]
async fn malformed_requests_answer_json_400() {
  let app = app().await;

  let (status, body) = send(&app, "GET", "/referrals?status=BOGUS", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");

  let (status, body) = send(&app, "GET", "/beneficiaries/not-a-uuid", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation");

  let req = Request::builder()
    .method("POST")
    .uri("/beneficiaries")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{\"nickname\": "))
    .unwrap();
  let resp = app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body: Value = serde_json::from_slice(&bytes).unwrap();
  assert_eq!(body["kind"], "validation");

  let req = Request::builder()
    .method("POST")
    .uri("/beneficiaries")
    .header(header::CONTENT_TYPE, "text/plain")
    .body(Body::from("nickname=Jo"))
    .unwrap();
  let resp = app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Roster ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn join_is_idempotent_over_http() {
  let app = app().await;
  let (_, session) = send(
    &app,
    "POST",
    "/maraudes",
    Some(json!({ "plannedStartAt": Utc::now() })),
  )
  .await;
  let id = session["id"].as_str().unwrap();
  let member = json!({ "kind": "user", "id": Uuid::new_v4() });

  for _ in 0..2 {
    let (status, joined) = send(
      &app,
      "POST",
      &format!("/maraudes/{id}/join"),
      Some(json!({ "member": member, "role": "MEDICAL" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["participants"].as_array().unwrap().len(), 1);
  }

  let (status, left) = send(
    &app,
    "DELETE",
    &format!("/maraudes/{id}/leave"),
    Some(json!({ "member": member })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert!(left["participants"].as_array().unwrap().is_empty());
}

// ─── Referrals & zones ───────────────────────────────────────────────────────

#[tokio::test]
async fn past_appointment_lists_as_expired() {
  let app = app().await;
  let (_, b) = send(&app, "POST", "/beneficiaries", Some(json!({ "nickname": "Ali" }))).await;
  let (status, referral) = send(
    &app,
    "POST",
    "/referrals",
    Some(json!({
      "beneficiaryId": b["id"],
      "structureName": "CHU Est",
      "appointmentDate": Utc::now() - Duration::hours(1),
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(referral["status"], "EXPIRED");

  let (_, expired) = send(&app, "GET", "/referrals?status=EXPIRED", None).await;
  assert_eq!(expired["total"], 1);
  let (_, pending) = send(&app, "GET", "/referrals/pending", None).await;
  assert_eq!(pending["total"], 0);

  let id = referral["id"].as_str().unwrap();
  let (status, body) = send(
    &app,
    "PATCH",
    &format!("/referrals/{id}"),
    Some(json!({ "status": "ACCEPTED" })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn stale_referral_status_is_409() {
  let app = app().await;
  let (_, b) = send(&app, "POST", "/beneficiaries", Some(json!({ "nickname": "Eva" }))).await;
  let (_, referral) = send(
    &app,
    "POST",
    "/referrals",
    Some(json!({ "beneficiaryId": b["id"], "structureName": "Halte santé" })),
  )
  .await;
  let uri = format!("/referrals/{}", referral["id"].as_str().unwrap());

  let accept = json!({ "expectedStatus": "PROPOSED", "status": "ACCEPTED" });
  let (status, _) = send(&app, "PATCH", &uri, Some(accept.clone())).await;
  assert_eq!(status, StatusCode::OK);
  let (status, body) = send(&app, "PATCH", &uri, Some(accept)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn zone_without_centre_cannot_list_beneficiaries() {
  let app = app().await;
  let (status, zone) = send(&app, "POST", "/zones", Some(json!({ "name": "Canal" }))).await;
  assert_eq!(status, StatusCode::CREATED);
  let id = zone["id"].as_str().unwrap();

  let (status, body) = send(&app, "GET", &format!("/zones/{id}/beneficiaries"), None).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "invalid_state");

  let (_, centred) = send(
    &app,
    "POST",
    "/zones",
    Some(json!({ "name": "Bastille", "center": { "lat": 48.853, "lng": 2.369 }, "radiusKm": 1.5 })),
  )
  .await;
  send(
    &app,
    "POST",
    "/beneficiaries",
    Some(json!({ "nickname": "Tom", "location": { "lat": 48.854, "lng": 2.370 } })),
  )
  .await;
  let id = centred["id"].as_str().unwrap();
  let (status, hits) = send(&app, "GET", &format!("/zones/{id}/beneficiaries"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(hits.as_array().unwrap().len(), 1);
  assert_eq!(hits[0]["nickname"], "Tom");
}
