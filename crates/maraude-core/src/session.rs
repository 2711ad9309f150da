//! Outreach sessions ("maraudes") and their lifecycle.
//!
//! ```text
//! PLANNED ──start──▶ IN_PROGRESS ──end──▶ COMPLETED
//!    │                    │
//!    └──────cancel────────┴──────────────▶ CANCELED
//! ```
//!
//! `status` only ever changes through [`SessionStatus::apply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  availability::Availability,
  member::{Member, ParticipantRole},
  report::OutreachReport,
};

// ─── Status machine ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
  #[default]
  Planned,
  InProgress,
  Completed,
  Canceled,
}

/// Operator-triggered lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SessionAction {
  Start,
  End,
  Cancel,
}

impl SessionStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Canceled) }

  pub fn accepts_encounters(self) -> bool { self == Self::InProgress }

  /// The state reached by applying `action`, or an error if the pair is not
  /// in the transition table.
  pub fn apply(self, action: SessionAction) -> Result<Self> {
    use SessionAction::*;
    use SessionStatus::*;

    match (self, action) {
      (Planned, Start) => Ok(InProgress),
      (InProgress, End) => Ok(Completed),
      (Planned | InProgress, Cancel) => Ok(Canceled),
      (from, action) => Err(Error::InvalidSessionTransition { action: action.into(), from }),
    }
  }
}

// ─── Roster ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
  pub member:       Member,
  pub role:         ParticipantRole,
  pub joined_at:    DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub availability: Option<Availability>,
}

// ─── Session ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachSession {
  pub id:               Uuid,
  pub title:            Option<String>,
  pub description:      Option<String>,
  pub zone_id:          Option<Uuid>,
  pub coordinator:      Option<Member>,
  pub planned_start_at: DateTime<Utc>,
  pub started_at:       Option<DateTime<Utc>>,
  pub ended_at:         Option<DateTime<Utc>>,
  pub status:           SessionStatus,
  /// Bumped on every status or metadata change; roster edits leave it alone.
  pub version:          u64,
  pub participants:     Vec<Participant>,
  pub encounter_ids:    Vec<Uuid>,
  pub report:           Option<OutreachReport>,
  pub created_at:       DateTime<Utc>,
}

impl OutreachSession {
  pub fn plan(input: NewSession, now: DateTime<Utc>) -> Result<Self> {
    let title = input.title.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty());
    let mut session = Self {
      id: Uuid::new_v4(),
      title,
      description: input.description,
      zone_id: input.zone_id,
      coordinator: input.coordinator,
      planned_start_at: input.planned_start_at,
      started_at: None,
      ended_at: None,
      status: SessionStatus::Planned,
      version: 1,
      participants: Vec::new(),
      encounter_ids: Vec::new(),
      report: None,
      created_at: now,
    };
    if let Some(coordinator) = input.coordinator {
      session.join(coordinator, ParticipantRole::Coordinator, None, now)?;
    }
    Ok(session)
  }

  pub fn is_participant(&self, member: &Member) -> bool {
    self.participants.iter().any(|p| &p.member == member)
  }

  /// Add `member` to the roster. Returns `false` when already present; the
  /// existing entry is left untouched.
  pub fn join(
    &mut self,
    member: Member,
    role: ParticipantRole,
    availability: Option<Availability>,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    self.ensure_roster_open()?;
    if self.is_participant(&member) {
      return Ok(false);
    }
    self.participants.push(Participant { member, role, joined_at: now, availability });
    Ok(true)
  }

  /// Remove `member`. Returns `false` when it was not on the roster.
  pub fn leave(&mut self, member: &Member) -> Result<bool> {
    self.ensure_roster_open()?;
    let before = self.participants.len();
    self.participants.retain(|p| &p.member != member);
    Ok(self.participants.len() != before)
  }

  fn ensure_roster_open(&self) -> Result<()> {
    if self.status.is_terminal() {
      return Err(Error::InvalidSessionTransition { action: "change the roster of", from: self.status });
    }
    Ok(())
  }

  /// Check an optimistic-concurrency token supplied by the caller.
  pub fn check_version(&self, expected: Option<u64>) -> Result<()> {
    match expected {
      Some(expected) if expected != self.version => Err(Error::VersionMismatch {
        id: self.id,
        expected,
        actual: self.version,
      }),
      _ => Ok(()),
    }
  }

  /// Apply a lifecycle event, stamping the matching timestamp and bumping
  /// the version. Report compilation for `End` is the caller's job and must
  /// happen in the same unit of work.
  pub fn transition(&mut self, action: SessionAction, now: DateTime<Utc>) -> Result<()> {
    let next = self.status.apply(action)?;
    match action {
      SessionAction::Start => self.started_at = Some(now),
      SessionAction::End | SessionAction::Cancel => self.ended_at = Some(now),
    }
    self.status = next;
    self.version += 1;
    Ok(())
  }

  pub fn ensure_accepts_encounters(&self) -> Result<()> {
    if !self.status.accepts_encounters() {
      return Err(Error::SessionNotActive { id: self.id, status: self.status });
    }
    Ok(())
  }

  /// Participants whose declared availability excludes the planned start.
  pub fn unavailable_participants(&self) -> Vec<Member> {
    self
      .participants
      .iter()
      .filter(|p| {
        p.availability
          .as_ref()
          .is_some_and(|a| !a.is_empty() && !a.covers(self.planned_start_at))
      })
      .map(|p| p.member)
      .collect()
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::OutreachStore::plan_session`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
  pub title:            Option<String>,
  pub description:      Option<String>,
  pub zone_id:          Option<Uuid>,
  /// Joined automatically with the `COORDINATOR` role.
  pub coordinator:      Option<Member>,
  pub planned_start_at: DateTime<Utc>,
}

impl NewSession {
  pub fn at(planned_start_at: DateTime<Utc>) -> Self {
    Self {
      title: None,
      description: None,
      zone_id: None,
      coordinator: None,
      planned_start_at,
    }
  }
}
