//! The `DirectoryStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `hal-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  audit::{AuditEntry, NewAuditEntry},
  company::{Category, CategoryId, CityCount, Company, CompanyId, CompanyPatch, CompanyQuery, NewCategory, NewCompany},
  review::{Moderation, NewReview, Review, ReviewChange, ReviewId, ReviewStatus},
  user::{Credentials, NewUser, Principal, ProfilePatch, Role, UserId},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Limit/offset window for paged listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub limit:  usize,
  pub offset: usize,
}

impl Page {
  /// The window for 1-based page number `page` with `per_page` rows.
  pub fn numbered(page: usize, per_page: usize) -> Self {
    Self { limit: per_page, offset: page.saturating_sub(1) * per_page }
  }
}

/// Views of one listing, as shown on its owner's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewCounts {
  pub total:      u64,
  pub this_week:  u64,
  pub this_month: u64,
}

/// Counters shown on the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
  pub users:            u64,
  pub companies:        u64,
  pub active_companies: u64,
  pub reviews:          u64,
  pub pending_reviews:  u64,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// How a failed store operation is reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
  /// The request clashes with existing data, e.g. a registered email.
  Conflict(String),
  /// The request references missing records or carries invalid values.
  Invalid(String),
  /// Anything else. Details belong in the server log only.
  Internal,
}

/// Implemented by every [`DirectoryStore::Error`] so the HTTP layer can tell
/// caller mistakes from backend failures without knowing the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn fault(&self) -> Fault;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational store backing the directory.
///
/// Review mutations (`insert_review`, `moderate_review`, `delete_review`) are
/// atomic units: the review write and the recomputation of the owning
/// company's [`RatingAggregate`](crate::review::RatingAggregate) commit
/// together or not at all.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DirectoryStore: Send + Sync {
  type Error: StoreError;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new account. Fails if the email is already registered.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<Principal, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;

  fn email_exists<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Look up the principal and password hash for a login attempt.
  fn find_credentials<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  fn record_login(
    &self,
    id: UserId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Apply a self-service profile change; `None` if no such user.
  fn update_profile(
    &self,
    id: UserId,
    patch: ProfilePatch,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;

  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<Principal>, Self::Error>> + Send + '_;

  /// Returns `false` if no such user exists.
  fn set_user_role(
    &self,
    id: UserId,
    role: Role,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Flip `is_active`; returns the new value, or `None` if no such user.
  fn toggle_user_active(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<bool>, Self::Error>> + Send + '_;

  // ── Categories ────────────────────────────────────────────────────────

  fn list_categories(
    &self,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + '_;

  fn create_category(
    &self,
    input: NewCategory,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + '_;

  fn update_category(
    &self,
    id: CategoryId,
    input: NewCategory,
  ) -> impl Future<Output = Result<Option<Category>, Self::Error>> + Send + '_;

  /// Companies in the category keep existing with no category.
  fn delete_category(
    &self,
    id: CategoryId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Companies ─────────────────────────────────────────────────────────

  fn create_company(
    &self,
    input: NewCompany,
  ) -> impl Future<Output = Result<Company, Self::Error>> + Send + '_;

  fn get_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  fn list_companies<'a>(
    &'a self,
    query: &'a CompanyQuery,
  ) -> impl Future<Output = Result<Vec<Company>, Self::Error>> + Send + 'a;

  fn update_company(
    &self,
    id: CompanyId,
    patch: CompanyPatch,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  /// Deletes the company together with its reviews.
  fn delete_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Count a detail-page view, attributed to `viewer` when known.
  fn record_company_view(
    &self,
    id: CompanyId,
    viewer: Option<UserId>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Detail-page views of a listing: all time, last 7 and last 30 days
  /// before `now`.
  fn count_company_views(
    &self,
    id: CompanyId,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<ViewCounts, Self::Error>> + Send + '_;

  /// Cities of active listings with their listing counts, most listings
  /// first, at most `limit` of them.
  fn list_cities(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<CityCount>, Self::Error>> + Send + '_;

  // ── Reviews ───────────────────────────────────────────────────────────

  fn get_review(
    &self,
    id: ReviewId,
  ) -> impl Future<Output = Result<Option<Review>, Self::Error>> + Send + '_;

  fn find_review_by_author(
    &self,
    company_id: CompanyId,
    author_id: UserId,
  ) -> impl Future<Output = Result<Option<Review>, Self::Error>> + Send + '_;

  /// Reviews of one company, newest first, optionally filtered by status.
  fn list_company_reviews(
    &self,
    company_id: CompanyId,
    status: Option<ReviewStatus>,
  ) -> impl Future<Output = Result<Vec<Review>, Self::Error>> + Send + '_;

  /// The moderation queue: reviews in `status`, newest first.
  fn list_reviews(
    &self,
    status: ReviewStatus,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Review>, Self::Error>> + Send + '_;

  /// Insert a review with `status` and recompute the company aggregate in
  /// the same transaction.
  fn insert_review(
    &self,
    input: NewReview,
    status: ReviewStatus,
  ) -> impl Future<Output = Result<ReviewChange, Self::Error>> + Send + '_;

  /// Apply a moderation verdict and recompute the company aggregate in the
  /// same transaction. `None` if the review does not exist.
  fn moderate_review(
    &self,
    id: ReviewId,
    moderation: Moderation,
  ) -> impl Future<Output = Result<Option<ReviewChange>, Self::Error>> + Send + '_;

  /// Delete a review and recompute the company aggregate in the same
  /// transaction. `None` if the review does not exist.
  fn delete_review(
    &self,
    id: ReviewId,
  ) -> impl Future<Output = Result<Option<ReviewChange>, Self::Error>> + Send + '_;

  // ── Audit log ─────────────────────────────────────────────────────────

  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  /// Entries newest first.
  fn list_audit(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;

  // ── Settings & stats ──────────────────────────────────────────────────

  fn get_settings(
    &self,
  ) -> impl Future<Output = Result<BTreeMap<String, String>, Self::Error>> + Send + '_;

  /// Overwrite existing keys; unknown keys are ignored. Returns the number
  /// of settings changed.
  fn update_settings(
    &self,
    values: BTreeMap<String, String>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn stats(
    &self,
  ) -> impl Future<Output = Result<DirectoryStats, Self::Error>> + Send + '_;
}
