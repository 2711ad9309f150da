//! Extractors that answer rejections with [`ApiError`].
//!
//! axum's own `Json`, `Query` and `Path` reject with plain-text bodies and
//! their own status codes (a body that fails to deserialise is a `422`).
//! These wrappers route every rejection through [`ApiError::BadRequest`], so
//! malformed input is a `400` with the usual `{"error", "kind"}` body and a
//! `422` always means the operation does not apply to the entity's state.

use axum::{
  extract::{
    FromRequest, FromRequestParts, OptionalFromRequest, Request,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::request::Parts,
  response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

/// JSON request body or response.
///
/// As an `Option<Json<T>>` extractor a request without a `Content-Type`
/// yields `None`; a request that declares a body must still send valid JSON.
#[derive(Debug, Clone, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let axum::Json(value) = <axum::Json<T> as FromRequest<S>>::from_request(req, state).await?;
    Ok(Self(value))
  }
}

impl<T, S> OptionalFromRequest<S> for Json<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
    let body =
      <axum::Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
    Ok(body.map(|axum::Json(value)| Self(value)))
  }
}

impl<T: Serialize> IntoResponse for Json<T> {
  fn into_response(self) -> Response { axum::Json(self.0).into_response() }
}

/// Query-string parameters.
#[derive(Debug, Clone, Default)]
pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let axum::extract::Query(value) =
      <axum::extract::Query<T> as FromRequestParts<S>>::from_request_parts(parts, state).await?;
    Ok(Self(value))
  }
}

/// Path segments, e.g. a `{id}` that must parse as a UUID.
#[derive(Debug, Clone)]
pub struct Path<T>(pub T);

impl<T, S> FromRequestParts<S> for Path<T>
where
  T: DeserializeOwned + Send,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let axum::extract::Path(value) =
      <axum::extract::Path<T> as FromRequestParts<S>>::from_request_parts(parts, state).await?;
    Ok(Self(value))
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}
