//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use maraude_core::{Classify, ErrorKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A classified failure from the domain layer or a store backend.
  #[error("{message}")]
  Store { kind: ErrorKind, message: String },
}

impl ApiError {
  pub fn store<E: std::error::Error + Classify>(e: E) -> Self {
    Self::Store { kind: e.kind(), message: e.to_string() }
  }

  pub fn invalid_state(message: impl Into<String>) -> Self {
    Self::Store { kind: ErrorKind::InvalidState, message: message.into() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::BadRequest(_) => ErrorKind::Validation,
      Self::Store { kind, .. } => *kind,
    }
  }
}

impl From<maraude_core::Error> for ApiError {
  fn from(e: maraude_core::Error) -> Self { Self::store(e) }
}

/// `409` tells the caller to refresh and retry; `422` that the operation
/// does not apply to the entity's current state.
pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation | ErrorKind::UnknownCategory => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::Consent | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let message = match &self {
      ApiError::NotFound(m) | ApiError::BadRequest(m) => m.clone(),
      ApiError::Store { message, .. } => message.clone(),
    };
    if kind == ErrorKind::Internal {
      tracing::error!(error = %message, "request failed");
    }
    (status_for(kind), Json(json!({ "error": message, "kind": kind }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use maraude_core::{Error, session::SessionStatus};

  use super::*;

  #[test]
  fn core_errors_keep_their_kind() {
    let e: ApiError = Error::SessionNotActive {
      id:     uuid::Uuid::nil(),
      status: SessionStatus::Planned,
    }
    .into();
    assert_eq!(e.kind(), ErrorKind::InvalidState);
    assert_eq!(status_for(e.kind()), StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[test]
  fn conflicts_map_to_409() {
    assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorKind::UnknownCategory), StatusCode::BAD_REQUEST);
  }
}
