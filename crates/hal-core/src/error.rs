//! Error types for `hal-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid status transition to {0:?}")]
  InvalidTransition(String),

  #[error("rating must be between 1 and 5, got {0}")]
  InvalidRating(i64),

  #[error("Field '{0}' is required")]
  RequiredField(&'static str),

  #[error("comment must not be empty")]
  EmptyComment,

  #[error("user {author_id} has already reviewed company {company_id}")]
  DuplicateReview { company_id: i64, author_id: i64 },

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("unknown review status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown audit action: {0:?}")]
  UnknownAction(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
