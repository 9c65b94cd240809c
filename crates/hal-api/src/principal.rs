//! Resolve the caller of a request from its `Authorization: Bearer` header.
//!
//! Resolution never fails: a missing or malformed header, an invalid or
//! expired token, and an unknown user all yield an anonymous caller. The
//! access policy decides what an anonymous caller may do.

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};
use hal_core::{store::DirectoryStore, user::Principal};
use tracing::warn;

use crate::token::TokenCodec;

/// Extract the token from a `Bearer` authorization header. The scheme is
/// matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
  let (scheme, token) = value.split_once(|c: char| c.is_ascii_whitespace())?;
  if !scheme.eq_ignore_ascii_case("bearer") {
    return None;
  }
  let token = token.trim();
  (!token.is_empty()).then_some(token)
}

/// Load the principal a request's bearer token refers to, fresh from the
/// store. `None` means anonymous.
pub async fn resolve<S>(
  store: &S,
  codec: &TokenCodec,
  headers: &HeaderMap,
  now: DateTime<Utc>,
) -> Option<Principal>
where
  S: DirectoryStore,
{
  let token = bearer_token(headers)?;
  let subject = codec.verify(token, now).ok()?;

  match store.get_user(subject).await {
    Ok(principal) => principal,
    Err(e) => {
      warn!(error = %e, user_id = subject, "principal lookup failed, treating as anonymous");
      None
    }
  }
}
