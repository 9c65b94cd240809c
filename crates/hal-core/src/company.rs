//! Companies, categories and the catalog query type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, user::UserId};

pub type CompanyId = i64;
pub type CategoryId = i64;

// ─── Company ─────────────────────────────────────────────────────────────────

/// A directory listing.
///
/// `rating` and `review_count` are derived from approved reviews and are only
/// ever written by the store's review mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
  pub id:           CompanyId,
  pub owner_id:     Option<UserId>,
  pub category_id:  Option<CategoryId>,
  pub name:         String,
  pub description:  Option<String>,
  pub city:         Option<String>,
  pub phone:        Option<String>,
  pub email:        Option<String>,
  pub website:      Option<String>,
  pub is_active:    bool,
  pub rating:       f64,
  pub review_count: u32,
  pub views_count:  u64,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCompany {
  #[serde(default)]
  pub owner_id:    Option<UserId>,
  #[serde(default)]
  pub category_id: Option<CategoryId>,
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub city:        Option<String>,
  #[serde(default)]
  pub phone:       Option<String>,
  #[serde(default)]
  pub email:       Option<String>,
  #[serde(default)]
  pub website:     Option<String>,
  #[serde(default = "default_active")]
  pub is_active:   bool,
}

fn default_active() -> bool { true }

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub owner_id:    Option<UserId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category_id: Option<CategoryId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub city:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub website:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active:   Option<bool>,
}

impl CompanyPatch {
  pub fn is_empty(&self) -> bool {
    self.owner_id.is_none()
      && self.category_id.is_none()
      && self.name.is_none()
      && self.description.is_none()
      && self.city.is_none()
      && self.phone.is_none()
      && self.email.is_none()
      && self.website.is_none()
      && self.is_active.is_none()
  }

  /// A patch may leave the name alone but never blank it.
  pub fn validate(&self) -> Result<(), Error> {
    match &self.name {
      Some(name) if name.trim().is_empty() => Err(Error::RequiredField("name")),
      _ => Ok(()),
    }
  }

  /// Strip the fields an owner may not change on their own listing.
  pub fn owner_editable(self) -> Self {
    Self { owner_id: None, is_active: None, ..self }
  }
}

/// Ordering for catalog listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanySort {
  #[default]
  Recent,
  Popular,
  Rating,
}

/// Parameters for [`DirectoryStore::list_companies`](crate::store::DirectoryStore::list_companies).
#[derive(Debug, Clone, Default)]
pub struct CompanyQuery {
  /// Substring match over name and description.
  pub search:      Option<String>,
  pub city:        Option<String>,
  pub category_id: Option<CategoryId>,
  pub owner_id:    Option<UserId>,
  pub active:      Option<bool>,
  pub sort:        CompanySort,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// A city with the number of active listings in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityCount {
  pub city:  String,
  pub count: u64,
}

// ─── Category ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id:        CategoryId,
  pub name:      String,
  pub slug:      String,
  pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
  pub name:      String,
  pub slug:      String,
  pub parent_id: Option<CategoryId>,
}

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to `-`.
pub fn slugify(text: &str) -> String {
  let mut slug = String::with_capacity(text.len());
  for ch in text.chars().flat_map(char::to_lowercase) {
    if ch.is_ascii_alphanumeric() {
      slug.push(ch);
    } else if !slug.is_empty() && !slug.ends_with('-') {
      slug.push('-');
    }
  }
  slug.trim_end_matches('-').to_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("Cafes & Restaurants"), "cafes-restaurants");
    assert_eq!(slugify("  Auto -- Service "), "auto-service");
    assert_eq!(slugify("IT"), "it");
  }

  #[test]
  fn owner_patch_cannot_reassign_or_deactivate() {
    let patch = CompanyPatch {
      owner_id: Some(99),
      is_active: Some(false),
      name: Some("Renamed".into()),
      ..Default::default()
    }
    .owner_editable();

    assert_eq!(patch.owner_id, None);
    assert_eq!(patch.is_active, None);
    assert_eq!(patch.name.as_deref(), Some("Renamed"));
    assert!(!patch.is_empty());
  }

  #[test]
  fn patch_may_not_blank_the_name() {
    let blank = CompanyPatch { name: Some("  ".into()), ..Default::default() };
    assert!(matches!(blank.validate(), Err(Error::RequiredField("name"))));

    let untouched = CompanyPatch { city: Some("Lviv".into()), ..Default::default() };
    assert!(untouched.validate().is_ok());
    let renamed = CompanyPatch { name: Some("Acme".into()), ..Default::default() };
    assert!(renamed.validate().is_ok());
  }
}
