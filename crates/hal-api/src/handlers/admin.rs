//! Handlers for the admin CMS (`admin/*`).
//!
//! Reads are open to admins and analysts; every mutation is admin-only and,
//! once it has succeeded, leaves an entry in the audit log.
//!
//! | Method | Path | Audit action |
//! |--------|------|--------------|
//! | `POST`/`PUT`/`DELETE` | `admin/categories[/{id}]` | `create` / `update` / `delete` |
//! | `POST`/`PUT`/`DELETE` | `admin/companies[/{id}]` | `create` / `update` / `delete` |
//! | `PUT` | `admin/reviews/{id}/moderate` | `moderate` |
//! | `DELETE` | `admin/reviews/{id}` | `delete` |
//! | `PUT` | `admin/users/{id}/role` | `update_role` |
//! | `PUT` | `admin/users/{id}/toggle-status` | `toggle_status` |
//! | `PUT` | `admin/settings` | `update` |

use std::collections::BTreeMap;

use axum::response::Response;
use hal_core::{
  audit::{AuditAction, EntityKind},
  company::{CategoryId, CompanyPatch, CompanyQuery, CompanySort, NewCategory, NewCompany, slugify},
  moderation::{ModerationEngine, parse_target},
  review::ReviewStatus,
  store::{DirectoryStore, Page},
  user::{Principal, Role, UserId},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{RequestContext, created, message, ok, paging};
use crate::{
  AppState,
  audit::{self, AuditEvent},
  error::ApiError,
};

const REVIEWS_PER_PAGE: usize = 20;
const LOGS_PER_PAGE: usize = 50;

async fn record<S>(state: &AppState<S>, ctx: &RequestContext, actor: &Principal, event: AuditEvent)
where
  S: DirectoryStore,
{
  audit::record(&*state.store, actor, ctx.ip.as_deref(), event).await;
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

/// `GET admin/dashboard`
pub async fn dashboard<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.stats().await.map_err(ApiError::store)?)
}

// ─── Categories ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CategoryBody {
  #[serde(default)]
  pub name:      String,
  #[serde(default)]
  pub slug:      Option<String>,
  #[serde(default)]
  pub parent_id: Option<CategoryId>,
}

impl CategoryBody {
  fn into_new(self) -> Result<NewCategory, ApiError> {
    let name = self.name.trim().to_owned();
    if name.is_empty() {
      return Err(ApiError::BadRequest("Field 'name' is required".into()));
    }
    let slug = match self.slug.as_deref().map(str::trim) {
      Some(slug) if !slug.is_empty() => slug.to_owned(),
      _ => slugify(&name),
    };
    if slug.is_empty() {
      return Err(ApiError::BadRequest("Field 'slug' is required".into()));
    }
    Ok(NewCategory { name, slug, parent_id: self.parent_id })
  }
}

/// Refuse a slug already used by a category other than `except`.
async fn ensure_slug_free<S>(
  state: &AppState<S>,
  slug: &str,
  except: Option<CategoryId>,
) -> Result<(), ApiError>
where
  S: DirectoryStore,
{
  let categories = state.store.list_categories().await.map_err(ApiError::store)?;
  if categories.iter().any(|c| c.slug == slug && Some(c.id) != except) {
    return Err(ApiError::Conflict("Slug already exists".into()));
  }
  Ok(())
}

/// `GET admin/categories`
pub async fn categories<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.list_categories().await.map_err(ApiError::store)?)
}

/// `POST admin/categories`
pub async fn create_category<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let input = ctx.json::<CategoryBody>()?.into_new()?;
  ensure_slug_free(state, &input.slug, None).await?;

  let category = state.store.create_category(input).await.map_err(ApiError::store)?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Create, EntityKind::Category, Some(category.id))
      .with_details(json!({ "name": category.name, "slug": category.slug })),
  )
  .await;
  created(category)
}

/// `PUT admin/categories/{id}`
pub async fn update_category<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  let input = ctx.json::<CategoryBody>()?.into_new()?;
  if input.parent_id == Some(id) {
    return Err(ApiError::BadRequest("A category cannot be its own parent".into()));
  }
  ensure_slug_free(state, &input.slug, Some(id)).await?;

  let category = state
    .store
    .update_category(id, input)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Category not found".into()))?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Update, EntityKind::Category, Some(id))
      .with_details(json!({ "name": category.name, "slug": category.slug })),
  )
  .await;
  ok(category)
}

/// `DELETE admin/categories/{id}`
pub async fn delete_category<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  if !state.store.delete_category(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound("Category not found".into()));
  }
  record(state, ctx, admin, AuditEvent::new(AuditAction::Delete, EntityKind::Category, Some(id)))
    .await;
  message("Category deleted")
}

// ─── Companies ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CompanyParams {
  pub page:     Option<usize>,
  pub limit:    Option<usize>,
  pub search:   Option<String>,
  pub city:     Option<String>,
  pub category: Option<CategoryId>,
  pub owner:    Option<UserId>,
  pub active:   Option<bool>,
  #[serde(default)]
  pub sort:     CompanySort,
}

/// `GET admin/companies`: includes inactive listings unless filtered.
pub async fn companies<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let params: CompanyParams = ctx.query()?;
  let (page, limit) = paging(params.page, params.limit, 20);
  let query = CompanyQuery {
    search:      params.search.filter(|s| !s.trim().is_empty()),
    city:        params.city.filter(|s| !s.trim().is_empty()),
    category_id: params.category,
    owner_id:    params.owner,
    active:      params.active,
    sort:        params.sort,
    limit:       Some(limit),
    offset:      Some((page - 1) * limit),
  };
  let companies = state.store.list_companies(&query).await.map_err(ApiError::store)?;
  ok(json!({ "companies": companies, "page": page, "limit": limit }))
}

/// `GET admin/companies/{id}`: no view is counted.
pub async fn company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let company = state
    .store
    .get_company(ctx.id(0)?)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;
  ok(company)
}

/// `POST admin/companies`
pub async fn create_company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let input: NewCompany = ctx.json()?;
  if input.name.trim().is_empty() {
    return Err(ApiError::BadRequest("Field 'name' is required".into()));
  }

  let company = state.store.create_company(input).await.map_err(ApiError::store)?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Create, EntityKind::Company, Some(company.id))
      .with_details(json!({ "name": company.name })),
  )
  .await;
  created(company)
}

/// `PUT admin/companies/{id}`
pub async fn update_company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  let patch: CompanyPatch = ctx.json()?;
  if patch.is_empty() {
    return Err(ApiError::BadRequest("No fields to update".into()));
  }
  patch.validate()?;
  let details = serde_json::to_value(&patch).unwrap_or(Value::Null);

  let company = state
    .store
    .update_company(id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Update, EntityKind::Company, Some(id)).with_details(details),
  )
  .await;
  ok(company)
}

/// `DELETE admin/companies/{id}`: removes the listing and its reviews.
pub async fn delete_company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  if !state.store.delete_company(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound("Company not found".into()));
  }
  record(state, ctx, admin, AuditEvent::new(AuditAction::Delete, EntityKind::Company, Some(id)))
    .await;
  message("Company deleted")
}

// ─── Reviews ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReviewParams {
  pub status: Option<String>,
  pub page:   Option<usize>,
}

/// `GET admin/reviews[?status=pending|approved|rejected&page]`: the
/// moderation queue, pending by default.
pub async fn reviews<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let params: ReviewParams = ctx.query()?;
  let status = match params.status.as_deref() {
    None | Some("") => ReviewStatus::Pending,
    Some(raw) => raw
      .parse::<ReviewStatus>()
      .map_err(|_| ApiError::BadRequest("Invalid status".into()))?,
  };
  let (page, _) = paging(params.page, None, REVIEWS_PER_PAGE);

  let reviews = state
    .store
    .list_reviews(status, Page::numbered(page, REVIEWS_PER_PAGE))
    .await
    .map_err(ApiError::store)?;
  ok(json!({ "reviews": reviews, "status": status, "page": page }))
}

#[derive(Debug, Deserialize)]
pub struct ModerateBody {
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub note:   Option<String>,
}

/// `PUT admin/reviews/{id}/moderate` takes `{"status":"approved"|"rejected","note"?}`;
/// the status defaults to `approved`.
pub async fn moderate_review<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  let body: ModerateBody = ctx.json()?;
  let target = parse_target(body.status.as_deref().unwrap_or("approved"))?;
  let note = body.note.filter(|n| !n.trim().is_empty());

  let engine = ModerationEngine::new(&*state.store, state.config.require_review_moderation);
  let change = engine
    .moderate(id, target, admin.id, note)
    .await?
    .ok_or_else(|| ApiError::NotFound("Review not found".into()))?;

  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Moderate, EntityKind::Review, Some(id)).with_details(json!({
      "status":       target,
      "company_id":   change.review.company_id,
      "rating":       change.aggregate.rating,
      "review_count": change.aggregate.review_count,
    })),
  )
  .await;
  ok(json!({
    "message":   format!("Review {target}"),
    "review":    change.review,
    "aggregate": change.aggregate,
  }))
}

/// `DELETE admin/reviews/{id}`
pub async fn delete_review<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;

  let engine = ModerationEngine::new(&*state.store, state.config.require_review_moderation);
  let change = engine
    .delete(id)
    .await?
    .ok_or_else(|| ApiError::NotFound("Review not found".into()))?;

  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Delete, EntityKind::Review, Some(id)).with_details(json!({
      "company_id":   change.review.company_id,
      "rating":       change.aggregate.rating,
      "review_count": change.aggregate.review_count,
    })),
  )
  .await;
  message("Review deleted")
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// `GET admin/users`
pub async fn users<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.list_users().await.map_err(ApiError::store)?)
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  #[serde(default)]
  pub role: String,
}

/// `PUT admin/users/{id}/role` takes `{"role":"user"|"analyst"|"admin"}`.
pub async fn update_user_role<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  let body: RoleBody = ctx.json()?;
  let role: Role = body.role.parse().map_err(|_| ApiError::BadRequest("Invalid role".into()))?;

  if !state.store.set_user_role(id, role).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound("User not found".into()));
  }
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::UpdateRole, EntityKind::User, Some(id))
      .with_details(json!({ "role": role })),
  )
  .await;
  message("User role updated")
}

/// `PUT admin/users/{id}/toggle-status`: flips `is_active`.
pub async fn toggle_user_status<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let id = ctx.id(0)?;
  if id == admin.id {
    return Err(ApiError::BadRequest("You cannot disable your own account".into()));
  }

  let is_active = state
    .store
    .toggle_user_active(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::ToggleStatus, EntityKind::User, Some(id))
      .with_details(json!({ "is_active": is_active })),
  )
  .await;
  ok(json!({ "message": "User status updated", "is_active": is_active }))
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// `GET admin/settings`
pub async fn settings<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.get_settings().await.map_err(ApiError::store)?)
}

/// `PUT admin/settings` takes a flat object; only existing keys change.
pub async fn update_settings<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let admin = ctx.principal()?;
  let body: BTreeMap<String, Value> = ctx.json()?;
  let values: BTreeMap<String, String> = body
    .into_iter()
    .map(|(key, value)| {
      let value = match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
      };
      (key, value)
    })
    .collect();
  let keys: Vec<String> = values.keys().cloned().collect();

  let changed = state.store.update_settings(values).await.map_err(ApiError::store)?;
  record(
    state,
    ctx,
    admin,
    AuditEvent::new(AuditAction::Update, EntityKind::Settings, None)
      .with_details(json!({ "keys": keys, "changed": changed })),
  )
  .await;
  ok(json!({ "message": "Settings updated", "changed": changed }))
}

// ─── Logs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogParams {
  pub page: Option<usize>,
}

/// `GET admin/logs[?page]`: newest first.
pub async fn logs<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let params: LogParams = ctx.query()?;
  let page = params.page.unwrap_or(1).max(1);
  let entries = state
    .store
    .list_audit(Page::numbered(page, LOGS_PER_PAGE))
    .await
    .map_err(ApiError::store)?;
  ok(entries)
}
