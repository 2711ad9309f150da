//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use maraude_core::{
  Classify, ErrorKind,
  beneficiary::{BeneficiaryPatch, ConsentStatus, NewBeneficiary},
  encounter::{BeneficiaryRef, EncounterPatch, EncounterType, NewEncounter},
  geo::GeoPoint,
  member::{Member, ParticipantRole},
  referral::{NewReferral, NewStructure, ReferralStatus, ReferralUpdate, StructureType},
  session::{NewSession, SessionStatus},
  store::{BeneficiaryQuery, JoinRequest, OutreachStore, PageRequest, ReferralQuery, SessionQuery},
  taxonomy::{CategoryPatch, NewCategory, TaxonomyKind},
  zone::NewZone,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// Store seeded with the usual need and action categories.
async fn seeded() -> SqliteStore {
  let s = store().await;
  for (code, name) in [("REPAS", "Repas"), ("COUVERTURE", "Couverture"), ("SANTE", "Santé")] {
    s.create_category(TaxonomyKind::Need, NewCategory::new(code, name)).await.unwrap();
  }
  s.create_category(TaxonomyKind::Action, NewCategory::new("DISTRIBUTION", "Distribution"))
    .await
    .unwrap();
  s
}

/// A planned session coordinated by a fresh user, already started.
async fn running_session(s: &SqliteStore) -> (Uuid, Member) {
  let coordinator = Member::User(Uuid::new_v4());
  let mut input = NewSession::at(Utc::now());
  input.coordinator = Some(coordinator);
  let session = s.plan_session(input).await.unwrap();
  s.start_session(session.id, None).await.unwrap();
  (session.id, coordinator)
}

// ─── Sessions and reports ────────────────────────────────────────────────────

#[tokio::test]
async fn outreach_night_compiles_report() {
  let s = seeded().await;
  let coordinator = Member::User(Uuid::new_v4());
  let mut input = NewSession::at(Utc::now());
  input.coordinator = Some(coordinator);

  let planned = s.plan_session(input).await.unwrap();
  assert_eq!(planned.status, SessionStatus::Planned);
  assert_eq!(planned.participants.len(), 1);
  assert_eq!(planned.participants[0].role, ParticipantRole::Coordinator);

  let started = s.start_session(planned.id, Some(planned.version)).await.unwrap();
  assert_eq!(started.status, SessionStatus::InProgress);
  assert_eq!(started.version, planned.version + 1);
  assert!(started.started_at.is_some());

  let mut quick = NewEncounter::new(started.id, BeneficiaryRef::NewNickname("Jo".into()))
    .with_needs(["repas"]);
  quick.recorded_by = Some(coordinator);
  let encounter = s.record_encounter(quick).await.unwrap();
  assert_eq!(encounter.encounter_type, EncounterType::FirstContact);
  assert_eq!(encounter.need_codes, vec!["REPAS"]);

  let beneficiary_id = encounter.beneficiary_id.expect("quick-created beneficiary");
  let jo = s.get_beneficiary(beneficiary_id).await.unwrap().unwrap();
  assert_eq!(jo.nickname, "Jo");

  let ended = s
    .end_session(started.id, None, Some("Nuit calme".into()))
    .await
    .unwrap();
  assert_eq!(ended.status, SessionStatus::Completed);
  let report = ended.report.clone().expect("report compiled on end");
  assert_eq!(report.total_encounters, 1);
  assert_eq!(report.new_beneficiaries, 1);
  assert_eq!(report.meals_distributed, 1);
  assert_eq!(report.blankets_distributed, 0);
  assert_eq!(report.summary.as_deref(), Some("Nuit calme"));

  let reloaded = s.get_session(started.id).await.unwrap().unwrap();
  assert_eq!(reloaded.report, Some(report));
  assert_eq!(reloaded.encounter_ids, vec![encounter.id]);
}

#[tokio::test]
async fn returning_beneficiary_is_not_new() {
  let s = seeded().await;
  let known = s
    .register_beneficiary(NewBeneficiary::with_nickname("Marco"))
    .await
    .unwrap();
  let (session_id, _) = running_session(&s).await;

  let visit = NewEncounter::new(session_id, BeneficiaryRef::Existing(known.id))
    .with_needs(["COUVERTURE"]);
  let encounter = s.record_encounter(visit).await.unwrap();
  assert_eq!(encounter.encounter_type, EncounterType::FollowUp);

  let ended = s.end_session(session_id, None, None).await.unwrap();
  let report = ended.report.unwrap();
  assert_eq!(report.total_encounters, 1);
  assert_eq!(report.new_beneficiaries, 0);
  assert_eq!(report.blankets_distributed, 1);
}

#[tokio::test]
async fn encounters_require_in_progress_session() {
  let s = seeded().await;
  let planned = s.plan_session(NewSession::at(Utc::now())).await.unwrap();

  let err = s
    .record_encounter(NewEncounter::new(planned.id, BeneficiaryRef::Anonymous))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);

  s.start_session(planned.id, None).await.unwrap();
  s.end_session(planned.id, None, None).await.unwrap();
  let err = s
    .record_encounter(NewEncounter::new(planned.id, BeneficiaryRef::Anonymous))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
  let s = store().await;
  let session = s.plan_session(NewSession::at(Utc::now())).await.unwrap();

  let err = s.end_session(session.id, None, None).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);

  let canceled = s.cancel_session(session.id, None).await.unwrap();
  assert_eq!(canceled.status, SessionStatus::Canceled);
  assert!(canceled.report.is_none());

  let err = s.start_session(session.id, None).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn stale_version_conflicts() {
  let s = store().await;
  let session = s.plan_session(NewSession::at(Utc::now())).await.unwrap();
  s.start_session(session.id, Some(session.version)).await.unwrap();

  let err = s
    .end_session(session.id, Some(session.version), None)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let still = s.get_session(session.id).await.unwrap().unwrap();
  assert_eq!(still.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn recompile_keeps_summary() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;

  let err = s.recompile_report(session_id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);

  s.record_encounter(NewEncounter::new(session_id, BeneficiaryRef::Anonymous).with_needs(["REPAS"]))
    .await
    .unwrap();
  let ended = s
    .end_session(session_id, None, Some("Bilan".into()))
    .await
    .unwrap();

  let again = s.recompile_report(session_id).await.unwrap();
  let before = ended.report.unwrap();
  let after = again.report.unwrap();
  assert_eq!(after.summary.as_deref(), Some("Bilan"));
  assert_eq!(after.total_encounters, before.total_encounters);
  assert_eq!(after.meals_distributed, 1);
  assert!(after.compiled_at >= before.compiled_at);
}

#[tokio::test]
async fn session_requires_known_zone() {
  let s = store().await;
  let mut input = NewSession::at(Utc::now());
  input.zone_id = Some(Uuid::new_v4());
  let err = s.plan_session(input).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  let zone = s
    .create_zone(NewZone { name: "Gare du Nord".into(), ..Default::default() })
    .await
    .unwrap();
  let mut input = NewSession::at(Utc::now());
  input.zone_id = Some(zone.id);
  let session = s.plan_session(input).await.unwrap();
  assert_eq!(session.zone_id, Some(zone.id));

  let page = s
    .list_sessions(SessionQuery { zone_id: Some(zone.id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.total, 1);
  assert_eq!(page.items[0].id, session.id);
}

// ─── Roster ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn joining_twice_keeps_one_entry() {
  let s = store().await;
  let session = s.plan_session(NewSession::at(Utc::now())).await.unwrap();
  let volunteer = Member::Volunteer(Uuid::new_v4());
  let join = JoinRequest { member: volunteer, role: ParticipantRole::Driver, availability: None };

  s.join_session(session.id, join.clone()).await.unwrap();
  let after = s.join_session(session.id, join).await.unwrap();
  assert_eq!(after.participants.len(), 1);
  assert_eq!(after.participants[0].role, ParticipantRole::Driver);

  let reloaded = s.get_session(session.id).await.unwrap().unwrap();
  assert_eq!(reloaded.participants.len(), 1);

  let left = s.leave_session(session.id, volunteer).await.unwrap();
  assert!(left.participants.is_empty());
  let again = s.leave_session(session.id, volunteer).await.unwrap();
  assert!(again.participants.is_empty());
}

#[tokio::test]
async fn roster_frozen_after_cancel() {
  let s = store().await;
  let session = s.plan_session(NewSession::at(Utc::now())).await.unwrap();
  s.cancel_session(session.id, None).await.unwrap();

  let join = JoinRequest {
    member:       Member::Volunteer(Uuid::new_v4()),
    role:         ParticipantRole::Volunteer,
    availability: None,
  };
  let err = s.join_session(session.id, join).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

// ─── Encounters ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_code_rolls_back_quick_create() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;

  let quick = NewEncounter::new(session_id, BeneficiaryRef::NewNickname("Lina".into()))
    .with_needs(["REPAS", "JACUZZI"]);
  let err = s.record_encounter(quick).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::UnknownCategory);

  let beneficiaries = s.list_beneficiaries(BeneficiaryQuery::default()).await.unwrap();
  assert_eq!(beneficiaries.total, 0);
  let session = s.get_session(session_id).await.unwrap().unwrap();
  assert!(session.encounter_ids.is_empty());
}

#[tokio::test]
async fn action_codes_are_checked_against_actions() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;

  let wrong_taxonomy = NewEncounter::new(session_id, BeneficiaryRef::Anonymous)
    .with_actions(["REPAS"]);
  let err = s.record_encounter(wrong_taxonomy).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::UnknownCategory);

  let ok = NewEncounter::new(session_id, BeneficiaryRef::Anonymous).with_actions(["distribution"]);
  let encounter = s.record_encounter(ok).await.unwrap();
  assert_eq!(encounter.action_codes, vec!["DISTRIBUTION"]);
  assert!(encounter.beneficiary_id.is_none());
}

#[tokio::test]
async fn recorder_must_be_on_roster() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;

  let mut input = NewEncounter::new(session_id, BeneficiaryRef::Anonymous);
  input.recorded_by = Some(Member::Volunteer(Uuid::new_v4()));
  let err = s.record_encounter(input).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn only_recorder_may_edit() {
  let s = seeded().await;
  let (session_id, coordinator) = running_session(&s).await;

  let mut input = NewEncounter::new(session_id, BeneficiaryRef::Anonymous);
  input.recorded_by = Some(coordinator);
  let encounter = s.record_encounter(input).await.unwrap();

  let intruder = EncounterPatch {
    editor: Some(Member::User(Uuid::new_v4())),
    notes: Some("rewritten".into()),
    ..Default::default()
  };
  let err = s.update_encounter(encounter.id, intruder).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let fix = EncounterPatch {
    editor: Some(coordinator),
    encounter_type: Some(EncounterType::Emergency),
    need_codes: Some(vec!["sante".into()]),
    ..Default::default()
  };
  let updated = s.update_encounter(encounter.id, fix).await.unwrap();
  assert_eq!(updated.encounter_type, EncounterType::Emergency);
  assert_eq!(updated.need_codes, vec!["SANTE"]);

  let reloaded = s.get_encounter(encounter.id).await.unwrap().unwrap();
  assert_eq!(reloaded, updated);
}

#[tokio::test]
async fn tagging_unions_codes() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;
  let encounter = s
    .record_encounter(NewEncounter::new(session_id, BeneficiaryRef::Anonymous).with_needs(["REPAS"]))
    .await
    .unwrap();

  let tagged = s
    .tag_encounter(encounter.id, TaxonomyKind::Need, vec!["couverture".into(), "REPAS".into()], None)
    .await
    .unwrap();
  assert_eq!(tagged.need_codes, vec!["REPAS", "COUVERTURE"]);

  let err = s
    .tag_encounter(encounter.id, TaxonomyKind::Action, vec!["NOPE".into()], None)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::UnknownCategory);
}

#[tokio::test]
async fn anonymized_beneficiary_cannot_be_met() {
  let s = seeded().await;
  let b = s
    .register_beneficiary(NewBeneficiary::with_nickname("Sam"))
    .await
    .unwrap();
  s.anonymize_beneficiary(b.id).await.unwrap();
  let (session_id, _) = running_session(&s).await;

  let err = s
    .record_encounter(NewEncounter::new(session_id, BeneficiaryRef::Existing(b.id)))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Consent);
}

// ─── Taxonomy ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_code_conflicts() {
  let s = seeded().await;
  let err = s
    .create_category(TaxonomyKind::Need, NewCategory::new(" repas ", "Repas chaud"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  // Same code in the other taxonomy is fine.
  s.create_category(TaxonomyKind::Action, NewCategory::new("REPAS", "Repas servi"))
    .await
    .unwrap();
}

#[tokio::test]
async fn referenced_code_cannot_be_deleted() {
  let s = seeded().await;
  let (session_id, _) = running_session(&s).await;
  s.record_encounter(NewEncounter::new(session_id, BeneficiaryRef::Anonymous).with_needs(["REPAS"]))
    .await
    .unwrap();

  let err = s
    .delete_category(TaxonomyKind::Need, "REPAS".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  s.delete_category(TaxonomyKind::Need, "sante".into()).await.unwrap();
  let needs = s.list_categories(TaxonomyKind::Need).await.unwrap();
  assert!(needs.iter().all(|c| c.code != "SANTE"));
}

#[tokio::test]
async fn parent_cycles_are_rejected() {
  let s = store().await;
  let root = s
    .create_category(TaxonomyKind::Need, NewCategory::new("SOIN", "Soin"))
    .await
    .unwrap();
  let mut child = NewCategory::new("PANSEMENT", "Pansement");
  child.parent_id = Some(root.id);
  let child = s.create_category(TaxonomyKind::Need, child).await.unwrap();

  let err = s
    .delete_category(TaxonomyKind::Need, "SOIN".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let patch = CategoryPatch { parent_id: Some(child.id), ..Default::default() };
  let err = s
    .update_category(TaxonomyKind::Need, "SOIN".into(), patch)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  let mut orphan = NewCategory::new("ORPHELIN", "Orphelin");
  orphan.parent_id = Some(Uuid::new_v4());
  let err = s.create_category(TaxonomyKind::Need, orphan).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

// ─── Beneficiaries ───────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymize_is_idempotent() {
  let s = store().await;
  let mut input = NewBeneficiary::with_nickname("Karim");
  input.gdpr_consent_status = ConsentStatus::Given;
  input.photo_consent_given = true;
  input.notes = Some("dort sous le pont".into());
  let b = s.register_beneficiary(input).await.unwrap();

  let first = s.anonymize_beneficiary(b.id).await.unwrap();
  assert!(first.nickname.starts_with("Anonyme-"));
  assert_eq!(first.gdpr_consent_status, ConsentStatus::Withdrawn);
  assert!(!first.photo_consent_given);
  assert!(first.notes.is_none());

  let second = s.anonymize_beneficiary(b.id).await.unwrap();
  assert_eq!(first, second);
}

#[tokio::test]
async fn export_refused_once_withdrawn() {
  let s = store().await;
  let mut input = NewBeneficiary::with_nickname("Ana");
  input.gdpr_consent_status = ConsentStatus::Given;
  let b = s.register_beneficiary(input).await.unwrap();

  let export = s.export_beneficiary(b.id).await.unwrap();
  assert_eq!(export.beneficiary.id, b.id);

  let patch = BeneficiaryPatch {
    gdpr_consent_status: Some(ConsentStatus::Withdrawn),
    ..Default::default()
  };
  s.update_beneficiary(b.id, patch).await.unwrap();
  let err = s.export_beneficiary(b.id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Consent);
}

#[tokio::test]
async fn photo_requires_given_consent() {
  let s = store().await;
  let b = s
    .register_beneficiary(NewBeneficiary::with_nickname("Léo"))
    .await
    .unwrap();

  let patch = BeneficiaryPatch { photo_consent_given: Some(true), ..Default::default() };
  let err = s.update_beneficiary(b.id, patch).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Consent);

  let patch = BeneficiaryPatch {
    gdpr_consent_status: Some(ConsentStatus::Given),
    photo_consent_given: Some(true),
    ..Default::default()
  };
  let updated = s.update_beneficiary(b.id, patch).await.unwrap();
  assert!(updated.photo_consent_given);
  assert!(updated.gdpr_consent_date.is_some());
}

#[tokio::test]
async fn inactive_beneficiaries_are_swept() {
  let s = store().await;
  let b = s
    .register_beneficiary(NewBeneficiary::with_nickname("Yves"))
    .await
    .unwrap();

  let none = s.anonymize_inactive(Utc::now() - Duration::days(30)).await.unwrap();
  assert!(none.is_empty());

  let swept = s.anonymize_inactive(Utc::now() + Duration::seconds(1)).await.unwrap();
  assert_eq!(swept, vec![b.id]);
  let again = s.anonymize_inactive(Utc::now() + Duration::seconds(1)).await.unwrap();
  assert!(again.is_empty());

  let reloaded = s.get_beneficiary(b.id).await.unwrap().unwrap();
  assert!(reloaded.anonymized_at.is_some());
}

#[tokio::test]
async fn list_filters_and_paginates() {
  let s = store().await;
  for i in 0..25 {
    s.register_beneficiary(NewBeneficiary::with_nickname(format!("B{i:02}")))
      .await
      .unwrap();
  }

  let page = s
    .list_beneficiaries(BeneficiaryQuery { page: PageRequest::new(3, 10), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.total, 25);
  assert_eq!(page.items.len(), 5);
  assert_eq!(page.page, 3);

  let filtered = s
    .list_beneficiaries(BeneficiaryQuery { text: Some("b1".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(filtered.total, 10);
}

#[tokio::test]
async fn nearby_is_sorted_and_bounded() {
  let s = store().await;
  let spots = [
    ("Châtelet", 48.8584, 2.3470),
    ("République", 48.8674, 2.3636),
    ("Lyon", 45.7640, 4.8357),
  ];
  for (nickname, lat, lng) in spots {
    let mut input = NewBeneficiary::with_nickname(nickname);
    input.location = Some(GeoPoint { lat, lng });
    s.register_beneficiary(input).await.unwrap();
  }
  s.register_beneficiary(NewBeneficiary::with_nickname("Sans lieu"))
    .await
    .unwrap();

  let center = GeoPoint { lat: 48.8566, lng: 2.3522 };
  let hits = s.find_nearby_beneficiaries(center, 5.0).await.unwrap();
  let names: Vec<_> = hits.iter().map(|h| h.item.nickname.as_str()).collect();
  assert_eq!(names, ["Châtelet", "République"]);
  assert!(hits[0].distance_km <= hits[1].distance_km);
}

#[tokio::test]
async fn history_lists_encounters_and_referrals() {
  let s = seeded().await;
  let b = s
    .register_beneficiary(NewBeneficiary::with_nickname("Nina"))
    .await
    .unwrap();
  let (session_id, _) = running_session(&s).await;
  let encounter = s
    .record_encounter(NewEncounter::new(session_id, BeneficiaryRef::Existing(b.id)))
    .await
    .unwrap();
  s.create_referral(NewReferral {
    beneficiary_id: b.id,
    structure_name: Some("Accueil de jour".into()),
    encounter_id: Some(encounter.id),
    ..Default::default()
  })
  .await
  .unwrap();

  let history = s.beneficiary_history(b.id).await.unwrap();
  assert_eq!(history.encounters.len(), 1);
  assert_eq!(history.encounters[0].id, encounter.id);
  assert_eq!(history.referrals.len(), 1);

  let err = s.beneficiary_history(Uuid::new_v4()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Referrals ───────────────────────────────────────────────────────────────

async fn referred(s: &SqliteStore) -> Uuid {
  let b = s
    .register_beneficiary(NewBeneficiary::with_nickname("Omar"))
    .await
    .unwrap();
  b.id
}

#[tokio::test]
async fn referral_walks_its_lifecycle() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;
  let structure = s
    .create_structure(NewStructure {
      name:           "CHU Saint-Martin".into(),
      structure_type: StructureType::Chu,
      address:        None,
      phone:          None,
      email:          None,
      location:       None,
    })
    .await
    .unwrap();

  let referral = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_id: Some(structure.id),
      appointment_date: Some(Utc::now() + Duration::days(2)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(referral.status, ReferralStatus::Proposed);

  let accept = ReferralUpdate { status: Some(ReferralStatus::Accepted), ..Default::default() };
  let accepted = s.update_referral(referral.id, accept).await.unwrap();
  assert_eq!(accepted.status, ReferralStatus::Accepted);

  let done = ReferralUpdate {
    expected_status: Some(ReferralStatus::Accepted),
    status: Some(ReferralStatus::Completed),
    follow_up_notes: Some("hébergé".into()),
    ..Default::default()
  };
  let completed = s.update_referral(referral.id, done).await.unwrap();
  assert_eq!(completed.status, ReferralStatus::Completed);
  assert_eq!(completed.follow_up_notes.as_deref(), Some("hébergé"));

  let back = ReferralUpdate { status: Some(ReferralStatus::Refused), ..Default::default() };
  let err = s.update_referral(referral.id, back).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn stale_expected_status_conflicts() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;
  let referral = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_name: Some("Maraude santé".into()),
      ..Default::default()
    })
    .await
    .unwrap();

  let update = ReferralUpdate {
    expected_status: Some(ReferralStatus::Accepted),
    status: Some(ReferralStatus::Completed),
    ..Default::default()
  };
  let err = s.update_referral(referral.id, update).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let unchanged = s.get_referral(referral.id).await.unwrap().unwrap();
  assert_eq!(unchanged.status, ReferralStatus::Proposed);
}

#[tokio::test]
async fn past_appointment_reads_expired() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;
  let referral = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_name: Some("CADA Est".into()),
      appointment_date: Some(Utc::now() - Duration::hours(3)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(referral.status, ReferralStatus::Expired);

  let expired = s
    .list_referrals(ReferralQuery { status: Some(ReferralStatus::Expired), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(expired.total, 1);
  let proposed = s
    .list_referrals(ReferralQuery { status: Some(ReferralStatus::Proposed), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(proposed.total, 0);

  let accept = ReferralUpdate { status: Some(ReferralStatus::Accepted), ..Default::default() };
  let err = s.update_referral(referral.id, accept).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn referral_listing_filters_on_effective_status() {
  let s = store().await;
  let first = referred(&s).await;
  let second = referred(&s).await;
  let propose = |beneficiary_id, appointment_date| NewReferral {
    beneficiary_id,
    structure_name: Some("LHSS Belleville".into()),
    appointment_date,
    ..Default::default()
  };

  let upcoming = s
    .create_referral(propose(first, Some(Utc::now() + Duration::days(2))))
    .await
    .unwrap();
  let missed = s
    .create_referral(propose(first, Some(Utc::now() - Duration::days(1))))
    .await
    .unwrap();
  let declined = s
    .create_referral(propose(first, Some(Utc::now() + Duration::milliseconds(400))))
    .await
    .unwrap();
  let refuse = ReferralUpdate { status: Some(ReferralStatus::Refused), ..Default::default() };
  s.update_referral(declined.id, refuse).await.unwrap();
  for _ in 0..3 {
    s.create_referral(propose(second, None)).await.unwrap();
  }
  tokio::time::sleep(std::time::Duration::from_millis(500)).await;

  let by_status = |status| ReferralQuery { status: Some(status), ..Default::default() };

  let expired = s.list_referrals(by_status(ReferralStatus::Expired)).await.unwrap();
  assert_eq!(expired.total, 1);
  assert_eq!(expired.items[0].id, missed.id);
  assert_eq!(expired.items[0].status, ReferralStatus::Expired);

  // A terminal referral keeps its status once the appointment has passed.
  let refused = s.list_referrals(by_status(ReferralStatus::Refused)).await.unwrap();
  assert_eq!(refused.total, 1);
  assert_eq!(refused.items[0].id, declined.id);

  let mine = s
    .list_referrals(ReferralQuery {
      status: Some(ReferralStatus::Proposed),
      beneficiary_id: Some(first),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(mine.total, 1);
  assert_eq!(mine.items[0].id, upcoming.id);

  let last_page = s
    .list_referrals(ReferralQuery {
      status: Some(ReferralStatus::Proposed),
      page: PageRequest::new(2, 3),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(last_page.total, 4);
  assert_eq!(last_page.items.len(), 1);
  assert_eq!(last_page.items[0].id, upcoming.id);

  let theirs = s
    .list_referrals(ReferralQuery { beneficiary_id: Some(second), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(theirs.total, 3);
}

#[tokio::test]
async fn follow_ups_come_due_in_order() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;
  let mut ids = Vec::new();
  for days in [3, 1] {
    let r = s
      .create_referral(NewReferral {
        beneficiary_id,
        structure_name: Some("Permanence juridique".into()),
        ..Default::default()
      })
      .await
      .unwrap();
    let schedule = ReferralUpdate {
      follow_up_date: Some(Utc::now() + Duration::days(days)),
      ..Default::default()
    };
    s.update_referral(r.id, schedule).await.unwrap();
    ids.push(r.id);
  }

  let due = s.follow_up_referrals(Utc::now() + Duration::days(5)).await.unwrap();
  let order: Vec<_> = due.iter().map(|r| r.id).collect();
  assert_eq!(order, [ids[1], ids[0]]);

  let due_soon = s.follow_up_referrals(Utc::now() + Duration::days(2)).await.unwrap();
  assert_eq!(due_soon.len(), 1);
}

#[tokio::test]
async fn referral_rejects_unknown_structure_and_anonymized_beneficiary() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;

  let err = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_id: Some(Uuid::new_v4()),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  s.anonymize_beneficiary(beneficiary_id).await.unwrap();
  let err = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_name: Some("CHRS".into()),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn structures_filter_by_type_and_distance() {
  let s = store().await;
  let near = GeoPoint { lat: 48.8530, lng: 2.3499 };
  for (name, structure_type, location) in [
    ("Hôtel-Dieu", StructureType::Sante, Some(near)),
    ("CHU Nord", StructureType::Chu, None),
  ] {
    s.create_structure(NewStructure {
      name: name.into(),
      structure_type,
      address: None,
      phone: None,
      email: None,
      location,
    })
    .await
    .unwrap();
  }

  let chu = s.list_structures(Some(StructureType::Chu)).await.unwrap();
  assert_eq!(chu.len(), 1);
  assert_eq!(chu[0].name, "CHU Nord");
  assert_eq!(s.list_structures(None).await.unwrap().len(), 2);

  let center = GeoPoint { lat: 48.8566, lng: 2.3522 };
  let hits = s.find_nearby_structures(center, 2.0).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].item.name, "Hôtel-Dieu");
}

// ─── Concurrent callers ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_are_all_kept() {
  let s = store().await;
  let session = s.plan_session(NewSession::at(Utc::now())).await.unwrap();
  let members: Vec<Member> = (0..24).map(|_| Member::Volunteer(Uuid::new_v4())).collect();

  let handles: Vec<_> = members
    .iter()
    .map(|&member| {
      let s = s.clone();
      tokio::spawn(async move {
        let request =
          JoinRequest { member, role: ParticipantRole::Volunteer, availability: None };
        s.join_session(session.id, request).await
      })
    })
    .collect();
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  let reloaded = s.get_session(session.id).await.unwrap().unwrap();
  assert_eq!(reloaded.participants.len(), members.len());
  for member in &members {
    assert!(reloaded.participants.iter().any(|p| p.member == *member));
  }
  assert_eq!(reloaded.version, session.version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_referral_updates_let_one_through() {
  let s = store().await;
  let beneficiary_id = referred(&s).await;
  let referral = s
    .create_referral(NewReferral {
      beneficiary_id,
      structure_name: Some("CHRS Les Lilas".into()),
      ..Default::default()
    })
    .await
    .unwrap();

  let handles: Vec<_> = [ReferralStatus::Accepted, ReferralStatus::Refused]
    .into_iter()
    .map(|status| {
      let s = s.clone();
      tokio::spawn(async move {
        let update = ReferralUpdate {
          expected_status: Some(ReferralStatus::Proposed),
          status: Some(status),
          ..Default::default()
        };
        s.update_referral(referral.id, update).await
      })
    })
    .collect();

  let mut applied = Vec::new();
  let mut conflicts = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(updated) => applied.push(updated.status),
      Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Conflict);
        conflicts += 1;
      }
    }
  }
  assert_eq!(applied.len(), 1);
  assert_eq!(conflicts, 1);

  let stored = s.get_referral(referral.id).await.unwrap().unwrap();
  assert_eq!(stored.status, applied[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_anonymize_converges() {
  let s = store().await;
  let mut input = NewBeneficiary::with_nickname("Ilse");
  input.notes = Some("vient le jeudi".into());
  let b = s.register_beneficiary(input).await.unwrap();

  let handles: Vec<_> = (0..4)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move { s.anonymize_beneficiary(b.id).await })
    })
    .collect();
  let mut records = Vec::new();
  for handle in handles {
    records.push(handle.await.unwrap().unwrap());
  }

  assert!(records.windows(2).all(|pair| pair[0] == pair[1]));
  assert!(records[0].nickname.starts_with("Anonyme-"));
  assert_eq!(records[0], s.get_beneficiary(b.id).await.unwrap().unwrap());
}
