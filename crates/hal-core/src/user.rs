//! Users and the principal resolved for each request.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

pub type UserId = i64;

/// Capability tier of an account.
///
/// `Analyst` may read the admin CMS and view moderation queues; only `Admin`
/// may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Analyst,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Analyst => "analyst",
      Role::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "user" => Ok(Role::User),
      "analyst" => Ok(Role::Analyst),
      "admin" => Ok(Role::Admin),
      other => Err(Error::UnknownRole(other.to_owned())),
    }
  }
}

/// A user account as seen by the access-control layer.
///
/// Loaded fresh from the store on every request; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
  pub id:         UserId,
  pub name:       String,
  pub email:      String,
  pub phone:      Option<String>,
  pub role:       Role,
  pub is_active:  bool,
  pub created_at: DateTime<Utc>,
  pub last_login: Option<DateTime<Utc>>,
}

impl Principal {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }

  /// Ownership check for self-service editing: the owner or any admin.
  pub fn can_manage(&self, owner_id: Option<UserId>) -> bool {
    self.is_admin() || owner_id == Some(self.id)
  }
}

/// Input for [`DirectoryStore::create_user`](crate::store::DirectoryStore::create_user).
#[derive(Debug, Clone)]
pub struct NewUser {
  pub name:          String,
  pub email:         String,
  pub phone:         Option<String>,
  /// PHC string produced by argon2.
  pub password_hash: String,
  pub role:          Role,
}

/// Self-service profile change; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
  #[serde(default)]
  pub name:  Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
}

impl ProfilePatch {
  pub fn is_empty(&self) -> bool { self.name.is_none() && self.phone.is_none() }

  pub fn validate(&self) -> Result<(), Error> {
    match &self.name {
      Some(name) if name.trim().is_empty() => Err(Error::RequiredField("name")),
      _ => Ok(()),
    }
  }
}

/// A principal together with its stored password hash; only used by login.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub principal:     Principal,
  pub password_hash: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn principal(id: UserId, role: Role) -> Principal {
    Principal {
      id,
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
  fn role_parses_its_own_rendering() {
    for role in [Role::User, Role::Analyst, Role::Admin] {
      assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
    }
    assert!(matches!("root".parse::<Role>(), Err(Error::UnknownRole(_))));
  }

  #[test]
  fn owner_and_admin_can_manage() {
    assert!(principal(7, Role::User).can_manage(Some(7)));
    assert!(!principal(7, Role::User).can_manage(Some(8)));
    assert!(!principal(7, Role::Analyst).can_manage(None));
    assert!(principal(1, Role::Admin).can_manage(Some(8)));
  }
}
