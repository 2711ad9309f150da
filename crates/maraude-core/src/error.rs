//! Error types for `maraude-core`.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  beneficiary::ConsentStatus, referral::ReferralStatus,
  session::SessionStatus, taxonomy::TaxonomyKind,
};

/// Coarse classification shared by every backend, so callers can tell
/// "refresh and retry" apart from "operation not applicable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  UnknownCategory,
  InvalidState,
  Conflict,
  Consent,
  Forbidden,
  NotFound,
  Internal,
}

/// Implemented by every store error type.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("unknown {kind} category: {code:?}")]
  UnknownCategory { kind: TaxonomyKind, code: String },

  #[error("{kind} category {code:?} already exists")]
  DuplicateCategory { kind: TaxonomyKind, code: String },

  #[error("{kind} category {code:?} is still in use")]
  CategoryInUse { kind: TaxonomyKind, code: String },

  #[error("setting parent of {code:?} would create a cycle")]
  CategoryCycle { code: String },

  #[error("cannot {action} a session that is {from}")]
  InvalidSessionTransition {
    action: &'static str,
    from:   SessionStatus,
  },

  #[error("session {id} is {status}; encounters require IN_PROGRESS")]
  SessionNotActive { id: Uuid, status: SessionStatus },

  #[error("session {id} is at version {actual}, expected {expected}")]
  VersionMismatch {
    id:       Uuid,
    expected: u64,
    actual:   u64,
  },

  #[error("referral cannot move from {from} to {to}")]
  InvalidReferralTransition {
    from: ReferralStatus,
    to:   ReferralStatus,
  },

  #[error("referral {id} is {actual}, expected {expected}")]
  StaleReferral {
    id:       Uuid,
    expected: ReferralStatus,
    actual:   ReferralStatus,
  },

  #[error("beneficiary {0} has been anonymized")]
  Anonymized(Uuid),

  #[error("operation blocked by consent status {0}")]
  Consent(ConsentStatus),

  #[error("only the recording participant may edit encounter {0}")]
  NotRecorder(Uuid),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::UnknownCategory { .. } => ErrorKind::UnknownCategory,
      Self::DuplicateCategory { .. }
      | Self::CategoryInUse { .. }
      | Self::VersionMismatch { .. }
      | Self::StaleReferral { .. } => ErrorKind::Conflict,
      Self::CategoryCycle { .. } => ErrorKind::Validation,
      Self::InvalidSessionTransition { .. }
      | Self::SessionNotActive { .. }
      | Self::InvalidReferralTransition { .. }
      | Self::Anonymized(_) => ErrorKind::InvalidState,
      Self::Consent(_) => ErrorKind::Consent,
      Self::NotRecorder(_) => ErrorKind::Forbidden,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
