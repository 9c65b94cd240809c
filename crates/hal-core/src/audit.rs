//! Admin audit trail records.
//!
//! Entries are append-only: the store exposes an insert and a paged read,
//! nothing else.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, user::UserId};

pub type AuditId = i64;

/// The closed vocabulary of audited admin actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
  Create,
  Update,
  Delete,
  Moderate,
  UpdateRole,
  ToggleStatus,
}

impl AuditAction {
  pub fn as_str(self) -> &'static str {
    match self {
      AuditAction::Create => "create",
      AuditAction::Update => "update",
      AuditAction::Delete => "delete",
      AuditAction::Moderate => "moderate",
      AuditAction::UpdateRole => "update_role",
      AuditAction::ToggleStatus => "toggle_status",
    }
  }
}

impl fmt::Display for AuditAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AuditAction {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "create" => Ok(AuditAction::Create),
      "update" => Ok(AuditAction::Update),
      "delete" => Ok(AuditAction::Delete),
      "moderate" => Ok(AuditAction::Moderate),
      "update_role" => Ok(AuditAction::UpdateRole),
      "toggle_status" => Ok(AuditAction::ToggleStatus),
      other => Err(Error::UnknownAction(other.to_owned())),
    }
  }
}

/// What kind of record an audited action touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Category,
  Company,
  Review,
  User,
  Settings,
}

impl EntityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      EntityKind::Category => "category",
      EntityKind::Company => "company",
      EntityKind::Review => "review",
      EntityKind::User => "user",
      EntityKind::Settings => "settings",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id:          AuditId,
  pub actor_id:    UserId,
  pub action:      AuditAction,
  /// Stored as free text so entries outlive changes to [`EntityKind`].
  pub entity_type: String,
  pub entity_id:   Option<i64>,
  pub details:     Option<serde_json::Value>,
  pub ip_address:  Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub actor_id:   UserId,
  pub action:     AuditAction,
  pub entity:     EntityKind,
  pub entity_id:  Option<i64>,
  pub details:    Option<serde_json::Value>,
  pub ip_address: Option<String>,
}
