//! Error type for `hal-store-sqlite`.

use hal_core::store::{Fault, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] hal_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("email already registered: {0}")]
  EmailTaken(String),

  #[error("slug already in use: {0}")]
  SlugTaken(String),

  /// Recomputing a company's rating failed; the enclosing review mutation
  /// was rolled back.
  #[error("failed to recompute rating for company {company_id}: {source}")]
  AggregateRecompute {
    company_id: i64,
    #[source]
    source:     rusqlite::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// The extended result code when the statement broke a table constraint.
  pub(crate) fn constraint(&self) -> Option<i32> {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        Some(e.extended_code)
      }
      _ => None,
    }
  }
}

impl StoreError for Error {
  fn fault(&self) -> Fault {
    use rusqlite::ffi;

    match self {
      Error::EmailTaken(_) => Fault::Conflict("Email already registered".into()),
      Error::SlugTaken(_) => Fault::Conflict("Slug already exists".into()),
      Error::Core(e) => Fault::Invalid(e.to_string()),
      _ => match self.constraint() {
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
          Fault::Invalid("Referenced record does not exist".into())
        }
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
          Fault::Conflict("Record already exists".into())
        }
        Some(ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL) => {
          Fault::Invalid("Invalid field value".into())
        }
        _ => Fault::Internal,
      },
    }
  }
}
