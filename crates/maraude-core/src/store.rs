//! The `OutreachStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `maraude-store-sqlite`). Higher layers (`maraude-api`) depend on this
//! abstraction, not on any concrete backend.
//!
//! Every mutating method is a single unit of work: either all of its effects
//! become visible or none do. Backends must serialise read-check-write
//! sequences per entity so that status transitions are compare-and-swap and
//! roster joins are set unions.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Classify,
  availability::Availability,
  beneficiary::{Beneficiary, BeneficiaryPatch, ConsentStatus, NewBeneficiary},
  encounter::{Encounter, EncounterPatch, EncounterSummary, NewEncounter},
  geo::{GeoPoint, Nearby},
  member::{Member, ParticipantRole},
  referral::{
    NewReferral, NewStructure, Referral, ReferralStatus, ReferralStructure,
    ReferralSummary, ReferralUpdate, StructureType,
  },
  session::{NewSession, OutreachSession, SessionStatus},
  taxonomy::{CategoryPatch, NewCategory, TaxonomyCode, TaxonomyKind},
  zone::{NewZone, OutreachZone},
};

// ─── Pagination ──────────────────────────────────────────────────────────────

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page request. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
  #[serde(default = "first_page")]
  pub page:  u32,
  #[serde(default = "default_limit")]
  pub limit: u32,
}

fn first_page() -> u32 { 1 }
fn default_limit() -> u32 { DEFAULT_PAGE_LIMIT }

impl Default for PageRequest {
  fn default() -> Self { Self { page: 1, limit: DEFAULT_PAGE_LIMIT } }
}

impl PageRequest {
  pub fn new(page: u32, limit: u32) -> Self { Self { page, limit }.clamped() }

  pub fn clamped(self) -> Self {
    Self {
      page:  self.page.max(1),
      limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
    }
  }

  pub fn offset(&self) -> u64 { u64::from(self.page.max(1) - 1) * u64::from(self.limit) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page:  u32,
  pub limit: u32,
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`OutreachStore::list_beneficiaries`].
#[derive(Debug, Clone, Default)]
pub struct BeneficiaryQuery {
  /// Case-insensitive substring match on the nickname.
  pub text:    Option<String>,
  pub consent: Option<ConsentStatus>,
  pub page:    PageRequest,
}

/// Parameters for [`OutreachStore::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
  pub status:  Option<SessionStatus>,
  pub zone_id: Option<Uuid>,
  pub page:    PageRequest,
}

/// Parameters for [`OutreachStore::list_referrals`]. `status` is matched
/// against the effective status.
#[derive(Debug, Clone, Default)]
pub struct ReferralQuery {
  pub status:         Option<ReferralStatus>,
  pub beneficiary_id: Option<Uuid>,
  pub page:           PageRequest,
}

// ─── Composite read models ───────────────────────────────────────────────────

/// Everything linked to a beneficiary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeneficiaryHistory {
  pub beneficiary_id: Uuid,
  pub encounters:     Vec<EncounterSummary>,
  pub referrals:      Vec<ReferralSummary>,
}

/// Data-portability bundle returned by [`OutreachStore::export_beneficiary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeneficiaryExport {
  pub beneficiary: Beneficiary,
  pub encounters:  Vec<EncounterSummary>,
  pub referrals:   Vec<ReferralSummary>,
  pub exported_at: DateTime<Utc>,
}

/// Roster change requested through [`OutreachStore::join_session`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
  pub member:       Member,
  #[serde(default)]
  pub role:         ParticipantRole,
  pub availability: Option<Availability>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an outreach store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait OutreachStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Taxonomy ──────────────────────────────────────────────────────────

  fn list_categories(
    &self,
    kind: TaxonomyKind,
  ) -> impl Future<Output = Result<Vec<TaxonomyCode>, Self::Error>> + Send + '_;

  /// Fails with a conflict if `code` already exists for `kind`, and with a
  /// validation error if `parent_id` is unknown or would form a cycle.
  fn create_category(
    &self,
    kind: TaxonomyKind,
    input: NewCategory,
  ) -> impl Future<Output = Result<TaxonomyCode, Self::Error>> + Send + '_;

  fn update_category(
    &self,
    kind: TaxonomyKind,
    code: String,
    patch: CategoryPatch,
  ) -> impl Future<Output = Result<TaxonomyCode, Self::Error>> + Send + '_;

  /// Refused while any encounter references the code or it has children.
  fn delete_category(
    &self,
    kind: TaxonomyKind,
    code: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Beneficiaries ─────────────────────────────────────────────────────

  fn register_beneficiary(
    &self,
    input: NewBeneficiary,
  ) -> impl Future<Output = Result<Beneficiary, Self::Error>> + Send + '_;

  fn get_beneficiary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Beneficiary>, Self::Error>> + Send + '_;

  fn list_beneficiaries(
    &self,
    query: BeneficiaryQuery,
  ) -> impl Future<Output = Result<Page<Beneficiary>, Self::Error>> + Send + '_;

  fn update_beneficiary(
    &self,
    id: Uuid,
    patch: BeneficiaryPatch,
  ) -> impl Future<Output = Result<Beneficiary, Self::Error>> + Send + '_;

  /// Idempotent: a second call returns the same redacted record.
  fn anonymize_beneficiary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Beneficiary, Self::Error>> + Send + '_;

  /// Anonymize every beneficiary with no encounter (and no registration)
  /// since `cutoff`. Returns the ids that changed.
  fn anonymize_inactive(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Fails with a consent error when consent has been withdrawn.
  fn export_beneficiary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<BeneficiaryExport, Self::Error>> + Send + '_;

  fn beneficiary_history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<BeneficiaryHistory, Self::Error>> + Send + '_;

  /// Beneficiaries with a stored location within `radius_km`, nearest first.
  fn find_nearby_beneficiaries(
    &self,
    center: GeoPoint,
    radius_km: f64,
  ) -> impl Future<Output = Result<Vec<Nearby<Beneficiary>>, Self::Error>> + Send + '_;

  // ── Zones ─────────────────────────────────────────────────────────────

  fn create_zone(
    &self,
    input: NewZone,
  ) -> impl Future<Output = Result<OutreachZone, Self::Error>> + Send + '_;

  fn get_zone(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<OutreachZone>, Self::Error>> + Send + '_;

  fn list_zones(
    &self,
  ) -> impl Future<Output = Result<Vec<OutreachZone>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn plan_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<OutreachSession>, Self::Error>> + Send + '_;

  fn list_sessions(
    &self,
    query: SessionQuery,
  ) -> impl Future<Output = Result<Page<OutreachSession>, Self::Error>> + Send + '_;

  fn start_session(
    &self,
    id: Uuid,
    expected_version: Option<u64>,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  /// Complete the session and compile its report in the same unit of work.
  fn end_session(
    &self,
    id: Uuid,
    expected_version: Option<u64>,
    summary: Option<String>,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  fn cancel_session(
    &self,
    id: Uuid,
    expected_version: Option<u64>,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  /// Re-joining is a no-op.
  fn join_session(
    &self,
    id: Uuid,
    request: JoinRequest,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  /// Leaving as a non-member is a no-op.
  fn leave_session(
    &self,
    id: Uuid,
    member: Member,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  /// Recompile the cached report of a completed session.
  fn recompile_report(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<OutreachSession, Self::Error>> + Send + '_;

  // ── Encounters ────────────────────────────────────────────────────────

  /// Record an encounter, creating the inline beneficiary if requested.
  /// Either both rows are written or neither is.
  fn record_encounter(
    &self,
    input: NewEncounter,
  ) -> impl Future<Output = Result<Encounter, Self::Error>> + Send + '_;

  fn get_encounter(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Encounter>, Self::Error>> + Send + '_;

  fn update_encounter(
    &self,
    id: Uuid,
    patch: EncounterPatch,
  ) -> impl Future<Output = Result<Encounter, Self::Error>> + Send + '_;

  /// Union `codes` into the encounter's need or action set.
  fn tag_encounter(
    &self,
    id: Uuid,
    kind: TaxonomyKind,
    codes: Vec<String>,
    editor: Option<Member>,
  ) -> impl Future<Output = Result<Encounter, Self::Error>> + Send + '_;

  // ── Referral structures ───────────────────────────────────────────────

  fn create_structure(
    &self,
    input: NewStructure,
  ) -> impl Future<Output = Result<ReferralStructure, Self::Error>> + Send + '_;

  fn list_structures(
    &self,
    structure_type: Option<StructureType>,
  ) -> impl Future<Output = Result<Vec<ReferralStructure>, Self::Error>> + Send + '_;

  fn find_nearby_structures(
    &self,
    center: GeoPoint,
    radius_km: f64,
  ) -> impl Future<Output = Result<Vec<Nearby<ReferralStructure>>, Self::Error>> + Send + '_;

  // ── Referrals ─────────────────────────────────────────────────────────
  //
  // Every referral handed back has its effective status resolved.

  fn create_referral(
    &self,
    input: NewReferral,
  ) -> impl Future<Output = Result<Referral, Self::Error>> + Send + '_;

  fn get_referral(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Referral>, Self::Error>> + Send + '_;

  fn list_referrals(
    &self,
    query: ReferralQuery,
  ) -> impl Future<Output = Result<Page<Referral>, Self::Error>> + Send + '_;

  /// Referrals with a follow-up date on or before `as_of`, earliest first.
  fn follow_up_referrals(
    &self,
    as_of: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Referral>, Self::Error>> + Send + '_;

  /// Status changes are compare-and-swap against the effective status.
  fn update_referral(
    &self,
    id: Uuid,
    update: ReferralUpdate,
  ) -> impl Future<Output = Result<Referral, Self::Error>> + Send + '_;
}
