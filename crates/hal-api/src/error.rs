//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure renders as `{"error": <message>}` with the matching status.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use hal_core::{
  moderation::ModerationError,
  store::{Fault, StoreError},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::policy::Denial;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  Unauthorized(String),

  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  Conflict(String),

  #[error("request body too large")]
  PayloadTooLarge,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// The uniform answer for a path no route matches.
  pub fn route_not_found() -> Self { ApiError::NotFound("Endpoint not found".into()) }

  /// Classify a store failure: caller mistakes keep their message, anything
  /// else becomes an opaque 500.
  pub fn store<E: StoreError>(e: E) -> Self {
    match e.fault() {
      Fault::Conflict(message) => ApiError::Conflict(message),
      Fault::Invalid(message) => ApiError::BadRequest(message),
      Fault::Internal => ApiError::Store(Box::new(e)),
    }
  }
}

impl From<Denial> for ApiError {
  fn from(denial: Denial) -> Self {
    match denial {
      Denial::Unauthenticated => ApiError::Unauthorized(denial.to_string()),
      Denial::Forbidden | Denial::AccountDisabled => ApiError::Forbidden(denial.to_string()),
    }
  }
}

/// Domain validation failures are the caller's fault.
impl From<hal_core::Error> for ApiError {
  fn from(e: hal_core::Error) -> Self { ApiError::BadRequest(e.to_string()) }
}

impl<E: StoreError> From<ModerationError<E>> for ApiError {
  fn from(e: ModerationError<E>) -> Self {
    match e {
      ModerationError::Rejected(e) => e.into(),
      ModerationError::Store(e) => ApiError::store(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
      ApiError::Store(e) => {
        error!(error = %e, "internal failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn denials_map_to_auth_statuses() {
    let status = |d: Denial| ApiError::from(d).into_response().status();
    assert_eq!(status(Denial::Unauthenticated), StatusCode::UNAUTHORIZED);
    assert_eq!(status(Denial::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(status(Denial::AccountDisabled), StatusCode::FORBIDDEN);
  }

  #[test]
  fn invalid_transition_is_a_bad_request() {
    let err: ApiError = hal_core::Error::InvalidTransition("pending".into()).into();
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
  }

  async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
    let resp = err.into_response();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn store_conflicts_are_409() {
    let err = ApiError::store(hal_store_sqlite::Error::EmailTaken("a@x.io".into()));
    let (status, body) = render(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");

    let err = ApiError::store(hal_store_sqlite::Error::SlugTaken("food".into()));
    assert_eq!(render(err).await.0, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn internal_failures_do_not_leak_details() {
    let err = ApiError::store(hal_store_sqlite::Error::DateParse("not-a-date".into()));
    let (status, body) = render(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
  }
}
