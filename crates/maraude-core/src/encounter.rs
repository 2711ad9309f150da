//! Encounters: facts captured by a team during an in-progress session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  beneficiary::NewBeneficiary,
  geo::GeoPoint,
  member::Member,
  taxonomy::normalize_codes,
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EncounterType {
  FirstContact,
  #[default]
  FollowUp,
  Emergency,
  Orientation,
  Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
  pub id:             Uuid,
  pub session_id:     Uuid,
  /// `None` for a fully anonymous encounter.
  pub beneficiary_id: Option<Uuid>,
  #[serde(rename = "type")]
  pub encounter_type: EncounterType,
  pub notes:          Option<String>,
  pub need_codes:     Vec<String>,
  pub action_codes:   Vec<String>,
  pub recorded_by:    Option<Member>,
  pub location:       Option<GeoPoint>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

/// Who an encounter is about. The three cases are mutually exclusive; a
/// `NewNickname` encounter creates its beneficiary in the same unit of work
/// and rolls it back if the encounter cannot be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BeneficiaryRef {
  Existing(Uuid),
  NewNickname(String),
  Anonymous,
}

/// Input to [`crate::store::OutreachStore::record_encounter`].
#[derive(Debug, Clone)]
pub struct NewEncounter {
  pub session_id:     Uuid,
  pub beneficiary:    BeneficiaryRef,
  pub encounter_type: Option<EncounterType>,
  pub notes:          Option<String>,
  pub need_codes:     Vec<String>,
  pub action_codes:   Vec<String>,
  pub recorded_by:    Option<Member>,
  pub location:       Option<GeoPoint>,
}

impl NewEncounter {
  pub fn new(session_id: Uuid, beneficiary: BeneficiaryRef) -> Self {
    Self {
      session_id,
      beneficiary,
      encounter_type: None,
      notes: None,
      need_codes: Vec::new(),
      action_codes: Vec::new(),
      recorded_by: None,
      location: None,
    }
  }

  pub fn with_needs<I, S>(mut self, codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.need_codes = codes.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_actions<I, S>(mut self, codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.action_codes = codes.into_iter().map(Into::into).collect();
    self
  }

  /// Normalise codes and check field-level constraints. Category existence
  /// is checked by the store, inside the write.
  pub fn validate(mut self) -> Result<Self> {
    self.need_codes = normalize_codes(&self.need_codes)?;
    self.action_codes = normalize_codes(&self.action_codes)?;
    if let Some(location) = &self.location {
      location.validate()?;
    }
    if let BeneficiaryRef::NewNickname(nickname) = &self.beneficiary
      && nickname.trim().is_empty()
    {
      return Err(Error::Validation("new beneficiary nickname must not be empty".into()));
    }
    Ok(self)
  }

  /// Registration input for the inline beneficiary, if any.
  pub fn new_beneficiary(&self) -> Option<NewBeneficiary> {
    match &self.beneficiary {
      BeneficiaryRef::NewNickname(nickname) => {
        let mut input = NewBeneficiary::with_nickname(nickname.clone());
        input.location = self.location;
        Some(input)
      }
      _ => None,
    }
  }

  /// The explicit type, or one inferred from how the beneficiary is given.
  pub fn resolved_type(&self) -> EncounterType {
    self.encounter_type.unwrap_or(match self.beneficiary {
      BeneficiaryRef::NewNickname(_) => EncounterType::FirstContact,
      _ => EncounterType::FollowUp,
    })
  }

  pub fn into_encounter(self, beneficiary_id: Option<Uuid>, now: DateTime<Utc>) -> Encounter {
    let encounter_type = self.resolved_type();
    Encounter {
      id: Uuid::new_v4(),
      session_id: self.session_id,
      beneficiary_id,
      encounter_type,
      notes: self.notes,
      need_codes: self.need_codes,
      action_codes: self.action_codes,
      recorded_by: self.recorded_by,
      location: self.location,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Quick-log body: `beneficiaryId` and `newBeneficiaryNickname` are folded
/// into a [`BeneficiaryRef`] by [`QuickEncounter::into_new_encounter`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickEncounter {
  pub session_id:               Uuid,
  pub beneficiary_id:           Option<Uuid>,
  pub new_beneficiary_nickname: Option<String>,
  #[serde(rename = "type")]
  pub encounter_type:           Option<EncounterType>,
  #[serde(default)]
  pub need_codes:               Vec<String>,
  #[serde(default)]
  pub action_codes:             Vec<String>,
  pub notes:                    Option<String>,
  pub recorded_by:              Option<Member>,
  pub location:                 Option<GeoPoint>,
}

impl QuickEncounter {
  pub fn into_new_encounter(self) -> Result<NewEncounter> {
    let beneficiary = match (self.beneficiary_id, self.new_beneficiary_nickname) {
      (Some(_), Some(_)) => {
        return Err(Error::Validation(
          "give either beneficiaryId or newBeneficiaryNickname, not both".into(),
        ));
      }
      (None, Some(nickname)) if nickname.trim().is_empty() => {
        return Err(Error::Validation("newBeneficiaryNickname must not be blank".into()));
      }
      (Some(id), None) => BeneficiaryRef::Existing(id),
      (None, Some(nickname)) => BeneficiaryRef::NewNickname(nickname),
      (None, None) => BeneficiaryRef::Anonymous,
    };
    Ok(NewEncounter {
      session_id: self.session_id,
      beneficiary,
      encounter_type: self.encounter_type,
      notes: self.notes,
      need_codes: self.need_codes,
      action_codes: self.action_codes,
      recorded_by: self.recorded_by,
      location: self.location,
    })
  }
}

/// Corrective edit. Replaces the listed fields wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterPatch {
  /// Who is making the edit; must match `recorded_by` when that is set.
  pub editor:         Option<Member>,
  #[serde(rename = "type")]
  pub encounter_type: Option<EncounterType>,
  pub notes:          Option<String>,
  pub need_codes:     Option<Vec<String>>,
  pub action_codes:   Option<Vec<String>>,
}

impl EncounterPatch {
  pub fn validate(mut self) -> Result<Self> {
    self.need_codes = self.need_codes.as_deref().map(normalize_codes).transpose()?;
    self.action_codes = self.action_codes.as_deref().map(normalize_codes).transpose()?;
    Ok(self)
  }
}

impl Encounter {
  /// Only the recording participant may correct an attributed encounter.
  pub fn ensure_editable_by(&self, editor: Option<&Member>) -> Result<()> {
    match &self.recorded_by {
      Some(recorder) if Some(recorder) != editor => Err(Error::NotRecorder(self.id)),
      _ => Ok(()),
    }
  }

  /// Apply an already-validated patch.
  pub fn apply(&mut self, patch: EncounterPatch, now: DateTime<Utc>) {
    if let Some(t) = patch.encounter_type { self.encounter_type = t; }
    if let Some(n) = patch.notes { self.notes = Some(n); }
    if let Some(c) = patch.need_codes { self.need_codes = c; }
    if let Some(c) = patch.action_codes { self.action_codes = c; }
    self.updated_at = now;
  }

  /// Merge codes into the need or action set, keeping existing order.
  pub fn add_codes(target: &mut Vec<String>, codes: Vec<String>) -> bool {
    let mut changed = false;
    for code in codes {
      if !target.contains(&code) {
        target.push(code);
        changed = true;
      }
    }
    changed
  }

  pub fn summary(&self) -> EncounterSummary {
    EncounterSummary {
      id:             self.id,
      session_id:     self.session_id,
      encounter_type: self.encounter_type,
      need_codes:     self.need_codes.clone(),
      action_codes:   self.action_codes.clone(),
      created_at:     self.created_at,
    }
  }
}

/// Notes-free view of an encounter, used in exports and histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSummary {
  pub id:             Uuid,
  pub session_id:     Uuid,
  #[serde(rename = "type")]
  pub encounter_type: EncounterType,
  pub need_codes:     Vec<String>,
  pub action_codes:   Vec<String>,
  pub created_at:     DateTime<Utc>,
}
