//! [`SqliteStore`], the SQLite implementation of [`OutreachStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use maraude_core::{
  Error as CoreError,
  beneficiary::{Beneficiary, BeneficiaryPatch, ConsentStatus, NewBeneficiary},
  encounter::{BeneficiaryRef, Encounter, EncounterPatch, NewEncounter},
  geo::{GeoPoint, Nearby, filter_nearby},
  member::Member,
  referral::{
    NewReferral, NewStructure, Referral, ReferralStructure, ReferralUpdate, StructureRef,
    StructureType, effective_status,
  },
  report::{OutreachReport, compile_report},
  session::{NewSession, OutreachSession, SessionAction, SessionStatus},
  store::{
    BeneficiaryExport, BeneficiaryHistory, BeneficiaryQuery, JoinRequest, OutreachStore, Page,
    ReferralQuery, SessionQuery,
  },
  taxonomy::{CategoryPatch, NewCategory, TaxonomyCode, TaxonomyKind, creates_cycle, normalize_code},
  zone::{NewZone, OutreachZone},
};

use crate::{Error, Result, repo, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An outreach store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Current instant at the precision the columns keep, so a value handed back
/// from a write equals the same value read later.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a read-only closure on the connection thread.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(&*conn))).await?
  }

  /// Run `f` inside one transaction. It commits only when `f` succeeds; on
  /// error the transaction is dropped and every write it made is rolled back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match f(&*tx) {
          Ok(out) => {
            tx.commit()?;
            Ok(Ok(out))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }
}

// ─── Helpers run inside a transaction ────────────────────────────────────────

fn require_session(conn: &Connection, id: Uuid) -> Result<OutreachSession> {
  repo::session::load(conn, id)?.ok_or_else(|| CoreError::not_found("session", id).into())
}

fn require_beneficiary(conn: &Connection, id: Uuid) -> Result<Beneficiary> {
  repo::beneficiary::load(conn, id)?.ok_or_else(|| CoreError::not_found("beneficiary", id).into())
}

fn require_encounter(conn: &Connection, id: Uuid) -> Result<Encounter> {
  repo::encounter::load(conn, id)?.ok_or_else(|| CoreError::not_found("encounter", id).into())
}

fn require_referral(conn: &Connection, id: Uuid) -> Result<Referral> {
  repo::referral::load(conn, id)?.ok_or_else(|| CoreError::not_found("referral", id).into())
}

fn require_category(conn: &Connection, kind: TaxonomyKind, code: &str) -> Result<TaxonomyCode> {
  let code = normalize_code(code)?;
  repo::taxonomy::load(conn, kind, &code)?
    .ok_or_else(|| CoreError::not_found("category", format!("{kind}/{code}")).into())
}

/// `parent` must be an existing category of the same taxonomy, and (when
/// `node` is already stored) must not sit below it.
fn check_parent(conn: &Connection, kind: TaxonomyKind, node: &TaxonomyCode, parent: Uuid) -> Result<()> {
  match repo::taxonomy::load_by_id(conn, parent)? {
    Some(p) if p.kind == kind => {}
    _ => return Err(CoreError::Validation(format!("unknown parent category {parent}")).into()),
  }
  let parents = repo::taxonomy::parent_map(conn, kind)?;
  if creates_cycle(node.id, parent, |id| parents.get(&id).copied()) {
    return Err(CoreError::CategoryCycle { code: node.code.clone() }.into());
  }
  Ok(())
}

fn check_codes(conn: &Connection, kind: TaxonomyKind, codes: &[String]) -> Result<()> {
  match repo::taxonomy::first_unknown(conn, kind, codes)? {
    Some(code) => Err(CoreError::UnknownCategory { kind, code }.into()),
    None => Ok(()),
  }
}

/// Compile a report over the session's encounters. The window runs from the
/// session start to its end.
fn compile_for(
  conn: &Connection,
  session: &OutreachSession,
  summary: Option<String>,
  now: DateTime<Utc>,
) -> Result<OutreachReport> {
  let encounters = repo::encounter::for_session(conn, session.id)?;
  let created: HashMap<Uuid, DateTime<Utc>> = repo::beneficiary::created_at(
    conn,
    encounters.iter().filter_map(|e| e.beneficiary_id),
  )?
  .into_iter()
  .collect();
  let window_start = session.started_at.unwrap_or(session.created_at);
  let window_end = session.ended_at.unwrap_or(now);
  Ok(compile_report(
    session.id,
    &encounters,
    window_start,
    window_end,
    |id| created.get(&id).copied(),
    summary,
    now,
  ))
}

fn transition_session(
  conn: &Connection,
  id: Uuid,
  expected_version: Option<u64>,
  action: SessionAction,
  now: DateTime<Utc>,
) -> Result<OutreachSession> {
  let mut session = require_session(conn, id)?;
  session.check_version(expected_version)?;
  session.transition(action, now)?;
  repo::session::save_header(conn, &session)?;
  Ok(session)
}

fn history_of(conn: &Connection, id: Uuid) -> Result<BeneficiaryHistory> {
  let encounters = repo::encounter::for_beneficiary(conn, id)?;
  let referrals = repo::referral::list(conn, Some(id))?;
  let now = now();
  Ok(BeneficiaryHistory {
    beneficiary_id: id,
    encounters:     encounters.iter().map(Encounter::summary).collect(),
    referrals:      referrals.into_iter().map(|r| r.resolve(now).summary()).collect(),
  })
}

// ─── OutreachStore impl ──────────────────────────────────────────────────────

impl OutreachStore for SqliteStore {
  type Error = Error;

  // ── Taxonomy ──────────────────────────────────────────────────────────────

  async fn list_categories(&self, kind: TaxonomyKind) -> Result<Vec<TaxonomyCode>> {
    self.read(move |conn| repo::taxonomy::list(conn, kind)).await
  }

  async fn create_category(&self, kind: TaxonomyKind, input: NewCategory) -> Result<TaxonomyCode> {
    let input = input.validate(kind)?;
    let now = now();

    let category = self
      .write(move |conn| {
        if repo::taxonomy::load(conn, kind, &input.code)?.is_some() {
          return Err(CoreError::DuplicateCategory { kind, code: input.code }.into());
        }
        let category = TaxonomyCode {
          id:         Uuid::new_v4(),
          kind,
          code:       input.code,
          name:       input.name,
          icon:       input.icon,
          color:      input.color,
          parent_id:  input.parent_id,
          created_at: now,
        };
        if let Some(parent) = category.parent_id {
          check_parent(conn, kind, &category, parent)?;
        }
        repo::taxonomy::insert(conn, &category)?;
        Ok(category)
      })
      .await?;

    info!(%kind, code = %category.code, "category created");
    Ok(category)
  }

  async fn update_category(
    &self,
    kind: TaxonomyKind,
    code: String,
    patch: CategoryPatch,
  ) -> Result<TaxonomyCode> {
    self
      .write(move |conn| {
        let mut category = require_category(conn, kind, &code)?;
        let old_parent = category.parent_id;
        patch.apply(&mut category)?;
        if let Some(parent) = category.parent_id
          && category.parent_id != old_parent
        {
          check_parent(conn, kind, &category, parent)?;
        }
        repo::taxonomy::update(conn, &category)?;
        Ok(category)
      })
      .await
  }

  async fn delete_category(&self, kind: TaxonomyKind, code: String) -> Result<()> {
    let code = self
      .write(move |conn| {
        let category = require_category(conn, kind, &code)?;
        if repo::taxonomy::is_referenced(conn, kind, &category.code)?
          || repo::taxonomy::has_children(conn, category.id)?
        {
          return Err(CoreError::CategoryInUse { kind, code: category.code }.into());
        }
        repo::taxonomy::delete(conn, category.id)?;
        Ok(category.code)
      })
      .await?;

    info!(%kind, %code, "category deleted");
    Ok(())
  }

  // ── Beneficiaries ─────────────────────────────────────────────────────────

  async fn register_beneficiary(&self, input: NewBeneficiary) -> Result<Beneficiary> {
    let beneficiary = Beneficiary::register(input, now())?;
    let saved = beneficiary.clone();
    self.write(move |conn| repo::beneficiary::save(conn, &saved)).await?;
    info!(beneficiary_id = %beneficiary.id, "beneficiary registered");
    Ok(beneficiary)
  }

  async fn get_beneficiary(&self, id: Uuid) -> Result<Option<Beneficiary>> {
    self.read(move |conn| repo::beneficiary::load(conn, id)).await
  }

  async fn list_beneficiaries(&self, query: BeneficiaryQuery) -> Result<Page<Beneficiary>> {
    self.read(move |conn| repo::beneficiary::list(conn, &query)).await
  }

  async fn update_beneficiary(&self, id: Uuid, patch: BeneficiaryPatch) -> Result<Beneficiary> {
    let now = now();
    let consent_change = patch.gdpr_consent_status;

    let beneficiary = self
      .write(move |conn| {
        let mut beneficiary = require_beneficiary(conn, id)?;
        beneficiary.apply(patch, now)?;
        repo::beneficiary::save(conn, &beneficiary)?;
        Ok(beneficiary)
      })
      .await?;

    if let Some(consent) = consent_change {
      info!(beneficiary_id = %id, %consent, "consent status changed");
    }
    Ok(beneficiary)
  }

  async fn anonymize_beneficiary(&self, id: Uuid) -> Result<Beneficiary> {
    let now = now();

    let (beneficiary, changed) = self
      .write(move |conn| {
        let mut beneficiary = require_beneficiary(conn, id)?;
        let changed = beneficiary.anonymize(now);
        if changed {
          repo::beneficiary::save(conn, &beneficiary)?;
        }
        Ok((beneficiary, changed))
      })
      .await?;

    if changed {
      info!(beneficiary_id = %id, "beneficiary anonymized");
    }
    Ok(beneficiary)
  }

  async fn anonymize_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let now = now();

    let ids = self
      .write(move |conn| {
        let mut changed = Vec::new();
        for id in repo::beneficiary::inactive_since(conn, cutoff)? {
          let mut beneficiary = require_beneficiary(conn, id)?;
          if beneficiary.anonymize(now) {
            repo::beneficiary::save(conn, &beneficiary)?;
            changed.push(id);
          }
        }
        Ok(changed)
      })
      .await?;

    info!(count = ids.len(), %cutoff, "retention sweep anonymized inactive beneficiaries");
    Ok(ids)
  }

  async fn export_beneficiary(&self, id: Uuid) -> Result<BeneficiaryExport> {
    self
      .read(move |conn| {
        let beneficiary = require_beneficiary(conn, id)?;
        beneficiary.ensure_exportable()?;
        let history = history_of(conn, id)?;
        Ok(BeneficiaryExport {
          beneficiary,
          encounters: history.encounters,
          referrals: history.referrals,
          exported_at: now(),
        })
      })
      .await
  }

  async fn beneficiary_history(&self, id: Uuid) -> Result<BeneficiaryHistory> {
    self
      .read(move |conn| {
        require_beneficiary(conn, id)?;
        history_of(conn, id)
      })
      .await
  }

  async fn find_nearby_beneficiaries(
    &self,
    center: GeoPoint,
    radius_km: f64,
  ) -> Result<Vec<Nearby<Beneficiary>>> {
    center.validate()?;
    let bbox = center.bounding_box(radius_km);
    let candidates = self
      .read(move |conn| repo::beneficiary::located_within(conn, &bbox))
      .await?;
    Ok(filter_nearby(center, radius_km, candidates, |b| b.location))
  }

  // ── Zones ─────────────────────────────────────────────────────────────────

  async fn create_zone(&self, input: NewZone) -> Result<OutreachZone> {
    let zone = OutreachZone::create(input)?;
    let saved = zone.clone();
    self.write(move |conn| repo::zone::insert(conn, &saved)).await?;
    info!(zone_id = %zone.id, name = %zone.name, "zone created");
    Ok(zone)
  }

  async fn get_zone(&self, id: Uuid) -> Result<Option<OutreachZone>> {
    self.read(move |conn| repo::zone::load(conn, id)).await
  }

  async fn list_zones(&self) -> Result<Vec<OutreachZone>> {
    self.read(repo::zone::list).await
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn plan_session(&self, input: NewSession) -> Result<OutreachSession> {
    let session = OutreachSession::plan(input, now())?;
    let saved = session.clone();

    self
      .write(move |conn| {
        if let Some(zone_id) = saved.zone_id
          && repo::zone::load(conn, zone_id)?.is_none()
        {
          return Err(CoreError::Validation(format!("unknown zone {zone_id}")).into());
        }
        repo::session::insert(conn, &saved)
      })
      .await?;

    info!(session_id = %session.id, planned_start_at = %session.planned_start_at, "session planned");
    Ok(session)
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<OutreachSession>> {
    self.read(move |conn| repo::session::load(conn, id)).await
  }

  async fn list_sessions(&self, query: SessionQuery) -> Result<Page<OutreachSession>> {
    self.read(move |conn| repo::session::list(conn, &query)).await
  }

  async fn start_session(&self, id: Uuid, expected_version: Option<u64>) -> Result<OutreachSession> {
    let now = now();
    let session = self
      .write(move |conn| transition_session(conn, id, expected_version, SessionAction::Start, now))
      .await?;
    info!(session_id = %id, version = session.version, "session started");
    Ok(session)
  }

  async fn end_session(
    &self,
    id: Uuid,
    expected_version: Option<u64>,
    summary: Option<String>,
  ) -> Result<OutreachSession> {
    let now = now();

    let session = self
      .write(move |conn| {
        let mut session = require_session(conn, id)?;
        session.check_version(expected_version)?;
        session.transition(SessionAction::End, now)?;
        session.report = Some(compile_for(conn, &session, summary, now)?);
        repo::session::save_header(conn, &session)?;
        Ok(session)
      })
      .await?;

    if let Some(report) = &session.report {
      info!(
        session_id = %id,
        total_encounters = report.total_encounters,
        new_beneficiaries = report.new_beneficiaries,
        "session completed"
      );
    }
    Ok(session)
  }

  async fn cancel_session(&self, id: Uuid, expected_version: Option<u64>) -> Result<OutreachSession> {
    let now = now();
    let session = self
      .write(move |conn| transition_session(conn, id, expected_version, SessionAction::Cancel, now))
      .await?;
    info!(session_id = %id, "session canceled");
    Ok(session)
  }

  async fn join_session(&self, id: Uuid, request: JoinRequest) -> Result<OutreachSession> {
    let now = now();
    let member = request.member;

    let (session, joined) = self
      .write(move |conn| {
        let mut session = require_session(conn, id)?;
        let joined = session.join(request.member, request.role, request.availability, now)?;
        if joined
          && let Some(p) = session.participants.iter().find(|p| p.member == request.member)
        {
          repo::session::add_participant(conn, id, p)?;
        }
        Ok((session, joined))
      })
      .await?;

    if joined {
      info!(session_id = %id, %member, "participant joined");
    } else {
      debug!(session_id = %id, %member, "participant already on roster");
    }
    Ok(session)
  }

  async fn leave_session(&self, id: Uuid, member: Member) -> Result<OutreachSession> {
    let (session, left) = self
      .write(move |conn| {
        let mut session = require_session(conn, id)?;
        let left = session.leave(&member)?;
        if left {
          repo::session::remove_participant(conn, id, &member)?;
        }
        Ok((session, left))
      })
      .await?;

    if left {
      info!(session_id = %id, %member, "participant left");
    }
    Ok(session)
  }

  async fn recompile_report(&self, id: Uuid) -> Result<OutreachSession> {
    let now = now();

    self
      .write(move |conn| {
        let mut session = require_session(conn, id)?;
        if session.status != SessionStatus::Completed {
          return Err(
            CoreError::InvalidSessionTransition {
              action: "recompile the report of",
              from:   session.status,
            }
            .into(),
          );
        }
        let summary = session.report.as_ref().and_then(|r| r.summary.clone());
        session.report = Some(compile_for(conn, &session, summary, now)?);
        repo::session::save_header(conn, &session)?;
        Ok(session)
      })
      .await
  }

  // ── Encounters ────────────────────────────────────────────────────────────

  async fn record_encounter(&self, input: NewEncounter) -> Result<Encounter> {
    let input = input.validate()?;
    let now = now();

    let (encounter, created) = self
      .write(move |conn| {
        let session = require_session(conn, input.session_id)?;
        session.ensure_accepts_encounters()?;
        if let Some(recorder) = &input.recorded_by
          && !session.is_participant(recorder)
        {
          return Err(
            CoreError::Validation(format!("{recorder} is not a participant of this session")).into(),
          );
        }

        let mut created = None;
        let beneficiary_id = match &input.beneficiary {
          BeneficiaryRef::Existing(id) => {
            let beneficiary = require_beneficiary(conn, *id)?;
            if beneficiary.is_anonymized() {
              return Err(CoreError::Consent(ConsentStatus::Withdrawn).into());
            }
            Some(beneficiary.id)
          }
          BeneficiaryRef::NewNickname(_) => {
            let registration = input.new_beneficiary().ok_or_else(|| {
              CoreError::Validation("new beneficiary nickname must not be empty".into())
            })?;
            let beneficiary = Beneficiary::register(registration, now)?;
            repo::beneficiary::save(conn, &beneficiary)?;
            created = Some(beneficiary.id);
            Some(beneficiary.id)
          }
          BeneficiaryRef::Anonymous => None,
        };

        check_codes(conn, TaxonomyKind::Need, &input.need_codes)?;
        check_codes(conn, TaxonomyKind::Action, &input.action_codes)?;

        let encounter = input.into_encounter(beneficiary_id, now);
        repo::encounter::insert(conn, &encounter)?;
        Ok((encounter, created))
      })
      .await?;

    if let Some(beneficiary_id) = created {
      info!(%beneficiary_id, encounter_id = %encounter.id, "beneficiary created from quick log");
    }
    info!(
      encounter_id = %encounter.id,
      session_id = %encounter.session_id,
      encounter_type = %encounter.encounter_type,
      "encounter recorded"
    );
    Ok(encounter)
  }

  async fn get_encounter(&self, id: Uuid) -> Result<Option<Encounter>> {
    self.read(move |conn| repo::encounter::load(conn, id)).await
  }

  async fn update_encounter(&self, id: Uuid, patch: EncounterPatch) -> Result<Encounter> {
    let patch = patch.validate()?;
    let now = now();

    self
      .write(move |conn| {
        let mut encounter = require_encounter(conn, id)?;
        require_session(conn, encounter.session_id)?.ensure_accepts_encounters()?;
        encounter.ensure_editable_by(patch.editor.as_ref())?;
        if let Some(codes) = &patch.need_codes {
          check_codes(conn, TaxonomyKind::Need, codes)?;
        }
        if let Some(codes) = &patch.action_codes {
          check_codes(conn, TaxonomyKind::Action, codes)?;
        }
        encounter.apply(patch, now);
        repo::encounter::update(conn, &encounter)?;
        Ok(encounter)
      })
      .await
  }

  async fn tag_encounter(
    &self,
    id: Uuid,
    kind: TaxonomyKind,
    codes: Vec<String>,
    editor: Option<Member>,
  ) -> Result<Encounter> {
    let codes = maraude_core::taxonomy::normalize_codes(&codes)?;
    let now = now();

    self
      .write(move |conn| {
        let mut encounter = require_encounter(conn, id)?;
        require_session(conn, encounter.session_id)?.ensure_accepts_encounters()?;
        encounter.ensure_editable_by(editor.as_ref())?;
        check_codes(conn, kind, &codes)?;
        let target = match kind {
          TaxonomyKind::Need => &mut encounter.need_codes,
          TaxonomyKind::Action => &mut encounter.action_codes,
        };
        if Encounter::add_codes(target, codes) {
          encounter.updated_at = now;
          repo::encounter::update(conn, &encounter)?;
        }
        Ok(encounter)
      })
      .await
  }

  // ── Referral structures ───────────────────────────────────────────────────

  async fn create_structure(&self, input: NewStructure) -> Result<ReferralStructure> {
    let structure = ReferralStructure::create(input)?;
    let saved = structure.clone();
    self.write(move |conn| repo::referral::insert_structure(conn, &saved)).await?;
    info!(structure_id = %structure.id, structure_type = %structure.structure_type, "structure created");
    Ok(structure)
  }

  async fn list_structures(
    &self,
    structure_type: Option<StructureType>,
  ) -> Result<Vec<ReferralStructure>> {
    self.read(move |conn| repo::referral::list_structures(conn, structure_type)).await
  }

  async fn find_nearby_structures(
    &self,
    center: GeoPoint,
    radius_km: f64,
  ) -> Result<Vec<Nearby<ReferralStructure>>> {
    center.validate()?;
    let bbox = center.bounding_box(radius_km);
    let candidates = self
      .read(move |conn| repo::referral::structures_within(conn, &bbox))
      .await?;
    Ok(filter_nearby(center, radius_km, candidates, |s| s.location))
  }

  // ── Referrals ─────────────────────────────────────────────────────────────

  async fn create_referral(&self, input: NewReferral) -> Result<Referral> {
    let now = now();
    let referral = Referral::propose(input, now)?;
    let saved = referral.clone();

    self
      .write(move |conn| {
        let beneficiary = require_beneficiary(conn, saved.beneficiary_id)?;
        if beneficiary.is_anonymized() {
          return Err(CoreError::Anonymized(beneficiary.id).into());
        }
        if let StructureRef::Listed(structure_id) = saved.structure
          && !repo::referral::structure_exists(conn, structure_id)?
        {
          return Err(CoreError::Validation(format!("unknown structure {structure_id}")).into());
        }
        if let Some(encounter_id) = saved.encounter_id {
          let encounter = require_encounter(conn, encounter_id)?;
          if encounter.beneficiary_id != Some(saved.beneficiary_id) {
            return Err(
              CoreError::Validation(format!(
                "encounter {encounter_id} does not concern beneficiary {}",
                saved.beneficiary_id
              ))
              .into(),
            );
          }
        }
        repo::referral::save(conn, &saved)
      })
      .await?;

    info!(referral_id = %referral.id, beneficiary_id = %referral.beneficiary_id, "referral proposed");
    Ok(referral.resolve(now))
  }

  async fn get_referral(&self, id: Uuid) -> Result<Option<Referral>> {
    let now = now();
    let referral = self.read(move |conn| repo::referral::load(conn, id)).await?;
    Ok(referral.map(|r| r.resolve(now)))
  }

  async fn list_referrals(&self, query: ReferralQuery) -> Result<Page<Referral>> {
    let now = now();
    let page = self.read(move |conn| repo::referral::page(conn, &query, now)).await?;
    Ok(Page { items: page.items.into_iter().map(|r| r.resolve(now)).collect(), ..page })
  }

  async fn follow_up_referrals(&self, as_of: DateTime<Utc>) -> Result<Vec<Referral>> {
    let now = now();
    let due = self.read(move |conn| repo::referral::follow_up_due(conn, as_of)).await?;
    Ok(due.into_iter().map(|r| r.resolve(now)).collect())
  }

  async fn update_referral(&self, id: Uuid, update: ReferralUpdate) -> Result<Referral> {
    let now = now();

    let (referral, from) = self
      .write(move |conn| {
        let mut referral = require_referral(conn, id)?;
        let from = effective_status(referral.status, referral.appointment_date, now);
        referral.apply(update, now)?;
        repo::referral::save(conn, &referral)?;
        Ok((referral, from))
      })
      .await?;

    let referral = referral.resolve(now);
    if referral.status != from {
      info!(referral_id = %id, %from, to = %referral.status, "referral status changed");
    }
    Ok(referral)
  }
}
