//! Handlers for `auth/*`: registration, login and the current caller.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `auth/register` | Body: `{"name","email","password","phone"?}` → 201 `{user, token}` |
//! | `POST` | `auth/login` | Body: `{"email","password"}` → `{user, token}` |
//! | `GET`  | `auth/me` | The resolved principal |

use argon2::{
  Argon2,
  PasswordHash,
  PasswordHasher,
  PasswordVerifier,
  password_hash::SaltString,
};
use axum::response::Response;
use chrono::Utc;
use hal_core::{
  store::DirectoryStore,
  user::{NewUser, Principal, Role},
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{RequestContext, created, ok};
use crate::{AppState, error::ApiError};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Store(format!("argon2 error: {e}").into()))
}

/// Check `password` against a stored PHC string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}

fn looks_like_email(email: &str) -> bool {
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
    }
    None => false,
  }
}

#[derive(Serialize)]
struct Session<'a> {
  user:  &'a Principal,
  token: String,
}

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  #[serde(default)]
  pub name:     String,
  #[serde(default)]
  pub email:    String,
  #[serde(default)]
  pub password: String,
  #[serde(default)]
  pub phone:    Option<String>,
}

/// `POST auth/register`
pub async fn register<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let body: RegisterBody = ctx.json()?;
  let name = body.name.trim();
  let email = body.email.trim();

  if name.is_empty() || email.is_empty() || body.password.is_empty() {
    return Err(ApiError::BadRequest("Name, email and password are required".into()));
  }
  if !looks_like_email(email) {
    return Err(ApiError::BadRequest("Invalid email format".into()));
  }
  if body.password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ApiError::BadRequest(format!(
      "Password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }

  if state.store.email_exists(email).await.map_err(ApiError::store)? {
    return Err(ApiError::Conflict("Email already registered".into()));
  }

  let user = state
    .store
    .create_user(NewUser {
      name:          name.to_owned(),
      email:         email.to_owned(),
      phone:         body.phone.filter(|p| !p.trim().is_empty()),
      password_hash: hash_password(&body.password)?,
      role:          Role::User,
    })
    .await
    .map_err(ApiError::store)?;

  info!(user_id = user.id, "registered new account");
  let token = state.codec.issue(user.id, Utc::now());
  created(Session { user: &user, token })
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  #[serde(default)]
  pub email:    String,
  #[serde(default)]
  pub password: String,
}

/// `POST auth/login`
pub async fn login<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let body: LoginBody = ctx.json()?;
  let email = body.email.trim();
  if email.is_empty() || body.password.is_empty() {
    return Err(ApiError::BadRequest("Email and password are required".into()));
  }

  let invalid = || ApiError::Unauthorized("Invalid email or password".into());
  let credentials = state
    .store
    .find_credentials(email)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(invalid)?;
  if !verify_password(&body.password, &credentials.password_hash) {
    return Err(invalid());
  }

  let mut user = credentials.principal;
  if !user.is_active {
    return Err(ApiError::Forbidden("Account is disabled".into()));
  }

  let now = Utc::now();
  state.store.record_login(user.id, now).await.map_err(ApiError::store)?;
  user.last_login = Some(now);

  let token = state.codec.issue(user.id, now);
  ok(Session { user: &user, token })
}

// ─── Me ──────────────────────────────────────────────────────────────────────

/// `GET auth/me`
pub fn me(ctx: &RequestContext) -> Result<Response, ApiError> { ok(ctx.principal()?) }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn password_hash_round_trip() {
    let phc = hash_password("hunter22").unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(verify_password("hunter22", &phc));
    assert!(!verify_password("hunter23", &phc));
    assert!(!verify_password("hunter22", "not-a-phc-string"));
  }

  #[test]
  fn email_shape_check() {
    assert!(looks_like_email("alice@example.com"));
    assert!(!looks_like_email("alice"));
    assert!(!looks_like_email("@example.com"));
    assert!(!looks_like_email("alice@localhost"));
    assert!(!looks_like_email("al ice@example.com"));
  }
}
