//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enumerations are stored as
//! their lowercase names. Audit details are stored as compact JSON.

use chrono::{DateTime, Utc};
use hal_core::{
  audit::{AuditAction, AuditEntry},
  company::{Category, Company},
  review::{Review, ReviewStatus},
  user::{Principal, Role},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str =
  "id, name, email, phone, role, is_active, created_at, last_login";

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub id:         i64,
  pub name:       String,
  pub email:      String,
  pub phone:      Option<String>,
  pub role:       String,
  pub is_active:  bool,
  pub created_at: String,
  pub last_login: Option<String>,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      email:      row.get(2)?,
      phone:      row.get(3)?,
      role:       row.get(4)?,
      is_active:  row.get(5)?,
      created_at: row.get(6)?,
      last_login: row.get(7)?,
    })
  }

  pub fn into_principal(self) -> Result<Principal> {
    Ok(Principal {
      id:         self.id,
      name:       self.name,
      email:      self.email,
      phone:      self.phone,
      role:       self.role.parse::<Role>()?,
      is_active:  self.is_active,
      created_at: decode_dt(&self.created_at)?,
      last_login: decode_opt_dt(self.last_login)?,
    })
  }
}

pub const CATEGORY_COLUMNS: &str = "id, name, slug, parent_id";

pub fn category_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
  Ok(Category {
    id:        row.get(0)?,
    name:      row.get(1)?,
    slug:      row.get(2)?,
    parent_id: row.get(3)?,
  })
}

pub const COMPANY_COLUMNS: &str = "id, owner_id, category_id, name, description, city, phone, \
   email, website, is_active, rating, review_count, views_count, created_at, updated_at";

/// Raw values read directly from a `companies` row.
pub struct RawCompany {
  pub id:           i64,
  pub owner_id:     Option<i64>,
  pub category_id:  Option<i64>,
  pub name:         String,
  pub description:  Option<String>,
  pub city:         Option<String>,
  pub phone:        Option<String>,
  pub email:        Option<String>,
  pub website:      Option<String>,
  pub is_active:    bool,
  pub rating:       f64,
  pub review_count: u32,
  pub views_count:  i64,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawCompany {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      owner_id:     row.get(1)?,
      category_id:  row.get(2)?,
      name:         row.get(3)?,
      description:  row.get(4)?,
      city:         row.get(5)?,
      phone:        row.get(6)?,
      email:        row.get(7)?,
      website:      row.get(8)?,
      is_active:    row.get(9)?,
      rating:       row.get(10)?,
      review_count: row.get(11)?,
      views_count:  row.get(12)?,
      created_at:   row.get(13)?,
      updated_at:   row.get(14)?,
    })
  }

  pub fn into_company(self) -> Result<Company> {
    Ok(Company {
      id:           self.id,
      owner_id:     self.owner_id,
      category_id:  self.category_id,
      name:         self.name,
      description:  self.description,
      city:         self.city,
      phone:        self.phone,
      email:        self.email,
      website:      self.website,
      is_active:    self.is_active,
      rating:       self.rating,
      review_count: self.review_count,
      views_count:  self.views_count.max(0) as u64,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub const REVIEW_COLUMNS: &str = "id, company_id, author_id, author_name, rating, comment, \
   status, moderated_by, moderated_at, moderation_note, created_at";

/// Raw values read directly from a `reviews` row.
pub struct RawReview {
  pub id:              i64,
  pub company_id:      i64,
  pub author_id:       i64,
  pub author_name:     String,
  pub rating:          u8,
  pub comment:         String,
  pub status:          String,
  pub moderated_by:    Option<i64>,
  pub moderated_at:    Option<String>,
  pub moderation_note: Option<String>,
  pub created_at:      String,
}

impl RawReview {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      company_id:      row.get(1)?,
      author_id:       row.get(2)?,
      author_name:     row.get(3)?,
      rating:          row.get(4)?,
      comment:         row.get(5)?,
      status:          row.get(6)?,
      moderated_by:    row.get(7)?,
      moderated_at:    row.get(8)?,
      moderation_note: row.get(9)?,
      created_at:      row.get(10)?,
    })
  }

  pub fn into_review(self) -> Result<Review> {
    Ok(Review {
      id:              self.id,
      company_id:      self.company_id,
      author_id:       self.author_id,
      author_name:     self.author_name,
      rating:          self.rating,
      comment:         self.comment,
      status:          self.status.parse::<ReviewStatus>()?,
      moderated_by:    self.moderated_by,
      moderated_at:    decode_opt_dt(self.moderated_at)?,
      moderation_note: self.moderation_note,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub const AUDIT_COLUMNS: &str =
  "id, user_id, action, entity_type, entity_id, details, ip_address, created_at";

/// Raw values read directly from an `admin_logs` row.
pub struct RawAudit {
  pub id:          i64,
  pub actor_id:    i64,
  pub action:      String,
  pub entity_type: String,
  pub entity_id:   Option<i64>,
  pub details:     Option<String>,
  pub ip_address:  Option<String>,
  pub created_at:  String,
}

impl RawAudit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      actor_id:    row.get(1)?,
      action:      row.get(2)?,
      entity_type: row.get(3)?,
      entity_id:   row.get(4)?,
      details:     row.get(5)?,
      ip_address:  row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      id:          self.id,
      actor_id:    self.actor_id,
      action:      self.action.parse::<AuditAction>()?,
      entity_type: self.entity_type,
      entity_id:   self.entity_id,
      details:     self.details.as_deref().map(serde_json::from_str).transpose()?,
      ip_address:  self.ip_address,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
