//! Per-route capability requirements and the gate that enforces them.
//!
//! Ownership of individual records is not decided here; owner routes only
//! require an authenticated caller and the handler compares owner ids.

use hal_core::user::{Principal, Role};
use thiserror::Error;

/// Read access to the admin CMS.
pub const STAFF: &[Role] = &[Role::Admin, Role::Analyst];

/// Every admin write.
pub const ADMIN: &[Role] = &[Role::Admin];

/// What a route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
  None,
  Authenticated,
  Roles(&'static [Role]),
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
  /// No usable credentials (401).
  #[error("Authentication required")]
  Unauthenticated,

  /// Authenticated, but the role is not in the route's set (403).
  #[error("Access denied")]
  Forbidden,

  /// Authenticated as an account an admin has disabled (403).
  #[error("Account is disabled")]
  AccountDisabled,
}

/// Decide whether `principal` (`None` = anonymous) may use a route with
/// `requirement`.
pub fn authorize(
  principal: Option<&Principal>,
  requirement: AuthRequirement,
) -> Result<(), Denial> {
  let roles = match requirement {
    AuthRequirement::None => return Ok(()),
    AuthRequirement::Authenticated => None,
    AuthRequirement::Roles(roles) => Some(roles),
  };

  let principal = principal.ok_or(Denial::Unauthenticated)?;
  if !principal.is_active {
    return Err(Denial::AccountDisabled);
  }
  match roles {
    Some(roles) if !roles.contains(&principal.role) => Err(Denial::Forbidden),
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn principal(role: Role) -> Principal {
    Principal {
      id: 1,
      name: "Test".into(),
      email: "test@example.com".into(),
      phone: None,
      role,
      is_active: true,
      created_at: Utc::now(),
      last_login: None,
    }
  }

  #[test]
  fn open_routes_admit_everyone() {
    assert_eq!(authorize(None, AuthRequirement::None), Ok(()));
    let mut disabled = principal(Role::User);
    disabled.is_active = false;
    assert_eq!(authorize(Some(&disabled), AuthRequirement::None), Ok(()));
  }

  #[test]
  fn authenticated_routes_refuse_anonymous() {
    assert_eq!(authorize(None, AuthRequirement::Authenticated), Err(Denial::Unauthenticated));
    for role in [Role::User, Role::Analyst, Role::Admin] {
      assert_eq!(authorize(Some(&principal(role)), AuthRequirement::Authenticated), Ok(()));
    }
  }

  #[test]
  fn admin_set_refuses_analyst() {
    let req = AuthRequirement::Roles(ADMIN);
    assert_eq!(authorize(None, req), Err(Denial::Unauthenticated));
    assert_eq!(authorize(Some(&principal(Role::User)), req), Err(Denial::Forbidden));
    assert_eq!(authorize(Some(&principal(Role::Analyst)), req), Err(Denial::Forbidden));
    assert_eq!(authorize(Some(&principal(Role::Admin)), req), Ok(()));
  }

  #[test]
  fn staff_set_admits_analyst() {
    let req = AuthRequirement::Roles(STAFF);
    assert_eq!(authorize(Some(&principal(Role::Analyst)), req), Ok(()));
    assert_eq!(authorize(Some(&principal(Role::Admin)), req), Ok(()));
    assert_eq!(authorize(Some(&principal(Role::User)), req), Err(Denial::Forbidden));
  }

  #[test]
  fn disabled_account_is_refused_before_role_check() {
    let mut admin = principal(Role::Admin);
    admin.is_active = false;
    assert_eq!(
      authorize(Some(&admin), AuthRequirement::Roles(ADMIN)),
      Err(Denial::AccountDisabled)
    );
    assert_eq!(
      authorize(Some(&admin), AuthRequirement::Authenticated),
      Err(Denial::AccountDisabled)
    );
  }
}
