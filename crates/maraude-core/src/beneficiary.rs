//! Beneficiaries: pseudonymous person records with a consent lifecycle.
//!
//! A beneficiary's nickname is display-only and never a legal identity.
//! Anonymization is terminal: personal fields are replaced with redacted
//! placeholders while encounter and referral rows keep pointing at the same
//! id, so statistics stay consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, geo::GeoPoint};

/// Prefix of the nickname given to anonymized beneficiaries.
pub const ANONYMOUS_PREFIX: &str = "Anonyme-";

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Data-processing consent state.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
  #[default]
  Pending,
  Given,
  Refused,
  Withdrawn,
}

impl ConsentStatus {
  /// States in which photo consent can never be held.
  pub fn forbids_photo(self) -> bool { matches!(self, Self::Refused | Self::Withdrawn) }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
  Male,
  Female,
  Other,
  #[default]
  Unknown,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HousingStatus {
  Street,
  Squat,
  Vehicle,
  EmergencyShelter,
  Hotel,
  Housed,
  #[default]
  Unknown,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AdministrativeStatus {
  Citizen,
  ResidencePermit,
  AsylumSeeker,
  Refugee,
  Undocumented,
  #[default]
  Unknown,
}

// ─── Beneficiary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beneficiary {
  pub id:                    Uuid,
  pub nickname:              String,
  pub estimated_age:         Option<u8>,
  pub gender:                Gender,
  pub housing_status:        HousingStatus,
  pub administrative_status: AdministrativeStatus,
  pub usual_location:        Option<String>,
  pub nationality:           Option<String>,
  pub spoken_languages:      Vec<String>,
  pub tags:                  Vec<String>,
  pub notes:                 Option<String>,
  pub gdpr_consent_status:   ConsentStatus,
  pub gdpr_consent_date:     Option<DateTime<Utc>>,
  pub photo_consent_given:   bool,
  pub location:              Option<GeoPoint>,
  pub created_at:            DateTime<Utc>,
  pub updated_at:            DateTime<Utc>,
  /// Set once, by the first successful anonymization.
  pub anonymized_at:         Option<DateTime<Utc>>,
}

impl Beneficiary {
  /// Build a fresh record from registration input. Consent starts as given
  /// by the input (default `PENDING`).
  pub fn register(input: NewBeneficiary, now: DateTime<Utc>) -> Result<Self> {
    let input = input.validate()?;
    let consent_date = (input.gdpr_consent_status != ConsentStatus::Pending).then_some(now);
    Ok(Self {
      id:                    Uuid::new_v4(),
      nickname:              input.nickname,
      estimated_age:         input.estimated_age,
      gender:                input.gender,
      housing_status:        input.housing_status,
      administrative_status: input.administrative_status,
      usual_location:        input.usual_location,
      nationality:           input.nationality,
      spoken_languages:      input.spoken_languages,
      tags:                  input.tags,
      notes:                 input.notes,
      gdpr_consent_status:   input.gdpr_consent_status,
      gdpr_consent_date:     consent_date,
      photo_consent_given:   input.photo_consent_given,
      location:              input.location,
      created_at:            now,
      updated_at:            now,
      anonymized_at:         None,
    })
  }

  pub fn is_anonymized(&self) -> bool { self.anonymized_at.is_some() }

  /// Apply a partial update, enforcing the consent rules.
  pub fn apply(&mut self, patch: BeneficiaryPatch, now: DateTime<Utc>) -> Result<()> {
    if self.is_anonymized() {
      return Err(Error::Anonymized(self.id));
    }

    let consent = patch.gdpr_consent_status.unwrap_or(self.gdpr_consent_status);
    if patch.photo_consent_given == Some(true) && consent != ConsentStatus::Given {
      return Err(Error::Consent(consent));
    }

    if let Some(nickname) = patch.nickname {
      self.nickname = validate_nickname(&nickname)?;
    }
    if let Some(age) = patch.estimated_age {
      self.estimated_age = Some(validate_age(age)?);
    }
    if let Some(location) = patch.location {
      location.validate()?;
      self.location = Some(location);
    }
    if let Some(v) = patch.gender { self.gender = v; }
    if let Some(v) = patch.housing_status { self.housing_status = v; }
    if let Some(v) = patch.administrative_status { self.administrative_status = v; }
    if let Some(v) = patch.usual_location { self.usual_location = Some(v); }
    if let Some(v) = patch.nationality { self.nationality = Some(v); }
    if let Some(v) = patch.spoken_languages { self.spoken_languages = v; }
    if let Some(v) = patch.tags { self.tags = v; }
    if let Some(v) = patch.notes { self.notes = Some(v); }
    if let Some(v) = patch.photo_consent_given { self.photo_consent_given = v; }

    if consent != self.gdpr_consent_status {
      self.gdpr_consent_status = consent;
      self.gdpr_consent_date = Some(now);
    }
    if consent.forbids_photo() {
      self.photo_consent_given = false;
    }

    self.updated_at = now;
    Ok(())
  }

  /// Redact every personal field. Returns `false` (and changes nothing) when
  /// the record was already anonymized.
  pub fn anonymize(&mut self, now: DateTime<Utc>) -> bool {
    if self.is_anonymized() {
      return false;
    }
    self.nickname = anonymous_nickname(self.id);
    self.estimated_age = None;
    self.gender = Gender::Unknown;
    self.housing_status = HousingStatus::Unknown;
    self.administrative_status = AdministrativeStatus::Unknown;
    self.usual_location = None;
    self.nationality = None;
    self.spoken_languages.clear();
    self.tags.clear();
    self.notes = None;
    self.location = None;
    self.photo_consent_given = false;
    self.gdpr_consent_status = ConsentStatus::Withdrawn;
    self.gdpr_consent_date = Some(now);
    self.updated_at = now;
    self.anonymized_at = Some(now);
    true
  }

  /// Fail with a consent error when there is nothing left to export.
  pub fn ensure_exportable(&self) -> Result<()> {
    if self.gdpr_consent_status == ConsentStatus::Withdrawn {
      return Err(Error::Consent(ConsentStatus::Withdrawn));
    }
    Ok(())
  }
}

/// `"Anonyme-"` followed by the first eight hex digits of SHA-256(id).
pub fn anonymous_nickname(id: Uuid) -> String {
  let digest = Sha256::digest(id.as_bytes());
  format!("{ANONYMOUS_PREFIX}{}", &hex::encode(digest)[..8])
}

fn validate_nickname(raw: &str) -> Result<String> {
  let nickname = raw.trim();
  if nickname.is_empty() {
    return Err(Error::Validation("nickname must not be empty".into()));
  }
  if nickname.chars().count() > 100 {
    return Err(Error::Validation("nickname is too long".into()));
  }
  Ok(nickname.to_owned())
}

fn validate_age(age: u8) -> Result<u8> {
  if age > 120 {
    return Err(Error::Validation(format!("implausible estimated age: {age}")));
  }
  Ok(age)
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::OutreachStore::register_beneficiary`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewBeneficiary {
  pub nickname:              String,
  pub estimated_age:         Option<u8>,
  pub gender:                Gender,
  pub housing_status:        HousingStatus,
  pub administrative_status: AdministrativeStatus,
  pub usual_location:        Option<String>,
  pub nationality:           Option<String>,
  pub spoken_languages:      Vec<String>,
  pub tags:                  Vec<String>,
  pub notes:                 Option<String>,
  pub gdpr_consent_status:   ConsentStatus,
  pub photo_consent_given:   bool,
  pub location:              Option<GeoPoint>,
}

impl NewBeneficiary {
  /// Registration input carrying only a nickname, as created by a quick log.
  pub fn with_nickname(nickname: impl Into<String>) -> Self {
    Self { nickname: nickname.into(), ..Default::default() }
  }

  fn validate(mut self) -> Result<Self> {
    self.nickname = validate_nickname(&self.nickname)?;
    if let Some(age) = self.estimated_age {
      validate_age(age)?;
    }
    if let Some(location) = &self.location {
      location.validate()?;
    }
    if self.photo_consent_given && self.gdpr_consent_status != ConsentStatus::Given {
      return Err(Error::Consent(self.gdpr_consent_status));
    }
    Ok(self)
  }
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeneficiaryPatch {
  pub nickname:              Option<String>,
  pub estimated_age:         Option<u8>,
  pub gender:                Option<Gender>,
  pub housing_status:        Option<HousingStatus>,
  pub administrative_status: Option<AdministrativeStatus>,
  pub usual_location:        Option<String>,
  pub nationality:           Option<String>,
  pub spoken_languages:      Option<Vec<String>>,
  pub tags:                  Option<Vec<String>>,
  pub notes:                 Option<String>,
  pub gdpr_consent_status:   Option<ConsentStatus>,
  pub photo_consent_given:   Option<bool>,
  pub location:              Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn jo() -> Beneficiary {
    let mut input = NewBeneficiary::with_nickname("Jo");
    input.notes = Some("sleeps near the station".into());
    input.tags = vec!["dog".into()];
    input.estimated_age = Some(42);
    input.location = Some(GeoPoint { lat: 48.85, lng: 2.35 });
    Beneficiary::register(input, Utc::now()).unwrap()
  }

  #[test]
  fn register_defaults_to_pending_consent() {
    let b = jo();
    assert_eq!(b.gdpr_consent_status, ConsentStatus::Pending);
    assert!(b.gdpr_consent_date.is_none());
    assert!(!b.photo_consent_given);
  }

  #[test]
  fn register_rejects_blank_nickname() {
    let err = Beneficiary::register(NewBeneficiary::with_nickname("  "), Utc::now());
    assert!(matches!(err, Err(Error::Validation(_))));
  }

  #[test]
  fn photo_consent_requires_given_gdpr_consent() {
    let mut b = jo();
    let patch = BeneficiaryPatch { photo_consent_given: Some(true), ..Default::default() };
    assert!(matches!(b.apply(patch, Utc::now()), Err(Error::Consent(ConsentStatus::Pending))));
    assert!(!b.photo_consent_given);

    let patch = BeneficiaryPatch {
      gdpr_consent_status: Some(ConsentStatus::Given),
      photo_consent_given: Some(true),
      ..Default::default()
    };
    b.apply(patch, Utc::now()).unwrap();
    assert!(b.photo_consent_given);
    assert!(b.gdpr_consent_date.is_some());
  }

  #[test]
  fn refusing_consent_revokes_photo_consent() {
    let mut b = jo();
    b.apply(
      BeneficiaryPatch {
        gdpr_consent_status: Some(ConsentStatus::Given),
        photo_consent_given: Some(true),
        ..Default::default()
      },
      Utc::now(),
    )
    .unwrap();

    b.apply(
      BeneficiaryPatch { gdpr_consent_status: Some(ConsentStatus::Refused), ..Default::default() },
      Utc::now(),
    )
    .unwrap();
    assert_eq!(b.gdpr_consent_status, ConsentStatus::Refused);
    assert!(!b.photo_consent_given);
  }

  #[test]
  fn anonymize_redacts_and_is_idempotent() {
    let mut b = jo();
    assert!(b.anonymize(Utc::now()));
    let first = b.clone();

    assert_eq!(b.nickname, anonymous_nickname(b.id));
    assert!(b.nickname.starts_with(ANONYMOUS_PREFIX));
    assert_eq!(b.nickname.len(), ANONYMOUS_PREFIX.len() + 8);
    assert!(b.notes.is_none());
    assert!(b.tags.is_empty());
    assert!(b.estimated_age.is_none());
    assert!(b.location.is_none());
    assert_eq!(b.gdpr_consent_status, ConsentStatus::Withdrawn);

    assert!(!b.anonymize(Utc::now()));
    assert_eq!(b, first);
  }

  #[test]
  fn anonymized_records_reject_updates_and_export() {
    let mut b = jo();
    b.anonymize(Utc::now());
    let patch = BeneficiaryPatch { nickname: Some("Back".into()), ..Default::default() };
    assert!(matches!(b.apply(patch, Utc::now()), Err(Error::Anonymized(_))));
    assert!(matches!(b.ensure_exportable(), Err(Error::Consent(ConsentStatus::Withdrawn))));
  }

  #[test]
  fn anonymous_nickname_is_stable() {
    let id = Uuid::new_v4();
    assert_eq!(anonymous_nickname(id), anonymous_nickname(id));
    assert_ne!(anonymous_nickname(id), anonymous_nickname(Uuid::new_v4()));
  }
}
