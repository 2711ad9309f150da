//! Referrals: hand-offs of a beneficiary to a partner structure.
//!
//! ```text
//! PROPOSED ──▶ ACCEPTED ──▶ COMPLETED
//!    │            │
//!    ▼            └───────▶ NO_SHOW
//! REFUSED
//! ```
//!
//! `EXPIRED` is never stored by a transition: it is derived at read time by
//! [`effective_status`] from the stored status, the appointment date and the
//! clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, geo::GeoPoint};

// ─── Status machine ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
  #[default]
  Proposed,
  Accepted,
  Refused,
  Completed,
  NoShow,
  Expired,
}

impl ReferralStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Refused | Self::Completed | Self::NoShow | Self::Expired)
  }

  /// Whether `self -> to` is in the transition table.
  pub fn can_transition_to(self, to: ReferralStatus) -> bool {
    use ReferralStatus::*;
    matches!(
      (self, to),
      (Proposed, Accepted) | (Proposed, Refused) | (Accepted, Completed) | (Accepted, NoShow)
    )
  }

  pub fn transition_to(self, to: ReferralStatus) -> Result<ReferralStatus> {
    if self.can_transition_to(to) {
      Ok(to)
    } else {
      Err(Error::InvalidReferralTransition { from: self, to })
    }
  }
}

/// The status a caller should see: a non-terminal referral whose appointment
/// is already past reads as `EXPIRED`.
pub fn effective_status(
  stored: ReferralStatus,
  appointment_date: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
) -> ReferralStatus {
  match appointment_date {
    Some(at) if !stored.is_terminal() && at < now => ReferralStatus::Expired,
    _ => stored,
  }
}

// ─── Structures ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureType {
  /// Centre d'hébergement d'urgence.
  Chu,
  /// Centre d'hébergement et de réinsertion sociale.
  Chrs,
  /// Lits halte soins santé.
  Lhss,
  /// Centre d'accueil pour demandeurs d'asile.
  Cada,
  AccueilJour,
  Sante,
  Social,
  Juridique,
}

/// A partner organisation beneficiaries can be referred to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStructure {
  pub id:             Uuid,
  pub name:           String,
  #[serde(rename = "type")]
  pub structure_type: StructureType,
  pub address:        Option<String>,
  pub phone:          Option<String>,
  pub email:          Option<String>,
  pub location:       Option<GeoPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStructure {
  pub name:           String,
  #[serde(rename = "type")]
  pub structure_type: StructureType,
  pub address:        Option<String>,
  pub phone:          Option<String>,
  pub email:          Option<String>,
  pub location:       Option<GeoPoint>,
}

impl ReferralStructure {
  pub fn create(input: NewStructure) -> Result<Self> {
    let name = input.name.trim();
    if name.is_empty() {
      return Err(Error::Validation("structure name must not be empty".into()));
    }
    if let Some(location) = &input.location {
      location.validate()?;
    }
    if let Some(email) = &input.email
      && !email.contains('@')
    {
      return Err(Error::Validation(format!("invalid email: {email:?}")));
    }
    Ok(Self {
      id:             Uuid::new_v4(),
      name:           name.to_owned(),
      structure_type: input.structure_type,
      address:        input.address,
      phone:          input.phone,
      email:          input.email,
      location:       input.location,
    })
  }
}

/// Where a referral points: a listed structure or a free-text name for one
/// that is not in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StructureRef {
  Listed(Uuid),
  Unlisted(String),
}

// ─── Referral ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
  pub id:               Uuid,
  pub beneficiary_id:   Uuid,
  pub structure:        StructureRef,
  pub encounter_id:     Option<Uuid>,
  pub reason:           Option<String>,
  pub appointment_date: Option<DateTime<Utc>>,
  /// Effective status once the referral has been read through
  /// [`Referral::resolve`].
  pub status:           ReferralStatus,
  pub follow_up_notes:  Option<String>,
  pub follow_up_date:   Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Referral {
  pub fn propose(input: NewReferral, now: DateTime<Utc>) -> Result<Self> {
    let structure = match (input.structure_id, input.structure_name) {
      (Some(id), _) => StructureRef::Listed(id),
      (None, Some(name)) if !name.trim().is_empty() => StructureRef::Unlisted(name.trim().to_owned()),
      _ => {
        return Err(Error::Validation("either structureId or structureName is required".into()));
      }
    };
    Ok(Self {
      id: Uuid::new_v4(),
      beneficiary_id: input.beneficiary_id,
      structure,
      encounter_id: input.encounter_id,
      reason: input.reason,
      appointment_date: input.appointment_date,
      status: ReferralStatus::Proposed,
      follow_up_notes: None,
      follow_up_date: None,
      created_at: now,
      updated_at: now,
    })
  }

  /// Replace the stored status with the effective one.
  pub fn resolve(mut self, now: DateTime<Utc>) -> Self {
    self.status = effective_status(self.status, self.appointment_date, now);
    self
  }

  /// Apply an update against the effective status at `now`.
  ///
  /// When `expected_status` is given it must equal the current effective
  /// status, otherwise the update is refused as stale.
  pub fn apply(&mut self, update: ReferralUpdate, now: DateTime<Utc>) -> Result<()> {
    let current = effective_status(self.status, self.appointment_date, now);
    if let Some(expected) = update.expected_status
      && expected != current
    {
      return Err(Error::StaleReferral { id: self.id, expected, actual: current });
    }
    if let Some(to) = update.status {
      self.status = current.transition_to(to)?;
    }
    if let Some(notes) = update.follow_up_notes {
      self.follow_up_notes = Some(notes);
    }
    if let Some(date) = update.follow_up_date {
      self.follow_up_date = Some(date);
    }
    self.updated_at = now;
    Ok(())
  }

  pub fn summary(&self) -> ReferralSummary {
    ReferralSummary {
      id:               self.id,
      structure:        self.structure.clone(),
      status:           self.status,
      appointment_date: self.appointment_date,
      created_at:       self.created_at,
    }
  }
}

/// Input to [`crate::store::OutreachStore::create_referral`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReferral {
  pub beneficiary_id:   Uuid,
  pub structure_id:     Option<Uuid>,
  pub structure_name:   Option<String>,
  pub encounter_id:     Option<Uuid>,
  pub reason:           Option<String>,
  pub appointment_date: Option<DateTime<Utc>>,
}

/// Body of `PATCH /referrals/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralUpdate {
  /// Compare-and-swap guard on the current status.
  pub expected_status: Option<ReferralStatus>,
  pub status:          Option<ReferralStatus>,
  pub follow_up_notes: Option<String>,
  pub follow_up_date:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
  pub id:               Uuid,
  pub structure:        StructureRef,
  pub status:           ReferralStatus,
  pub appointment_date: Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
}
