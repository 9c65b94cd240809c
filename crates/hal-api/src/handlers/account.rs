//! The owner dashboard: a signed-in user's profile and own listings.

use axum::response::Response;
use chrono::Utc;
use hal_core::{
  company::{CompanyPatch, CompanyQuery},
  store::DirectoryStore,
  user::ProfilePatch,
};
use serde_json::json;

use super::{RequestContext, ok};
use crate::{AppState, error::ApiError};

/// `GET users/me/dashboard`: view and review totals per listing.
pub async fn dashboard<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let user = ctx.principal()?;
  let query = CompanyQuery { owner_id: Some(user.id), ..Default::default() };
  let companies = state.store.list_companies(&query).await.map_err(ApiError::store)?;

  let now = Utc::now();
  let mut listings = Vec::with_capacity(companies.len());
  let (mut total_views, mut total_reviews) = (0_u64, 0_u64);
  for company in &companies {
    let views = state
      .store
      .count_company_views(company.id, now)
      .await
      .map_err(ApiError::store)?;
    total_views += views.total;
    total_reviews += u64::from(company.review_count);
    listings.push(json!({
      "company_id":   company.id,
      "company_name": company.name,
      "views":        views,
      "review_count": company.review_count,
      "rating":       company.rating,
    }));
  }

  ok(json!({
    "user": user,
    "overview": {
      "companies": companies.len(),
      "views":     total_views,
      "reviews":   total_reviews,
    },
    "companies": listings,
  }))
}

/// `PUT users/me` takes `{"name"?, "phone"?}` and answers with the updated
/// account.
pub async fn update_profile<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let user = ctx.principal()?;
  let mut patch: ProfilePatch = ctx.json()?;
  patch.name = patch.name.map(|name| name.trim().to_owned());
  patch.validate()?;
  if patch.is_empty() {
    return ok(user);
  }

  let updated = state
    .store
    .update_profile(user.id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
  ok(updated)
}

/// `GET users/me/companies`
pub async fn companies<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let owner = ctx.principal()?;
  let query = CompanyQuery { owner_id: Some(owner.id), ..Default::default() };
  ok(state.store.list_companies(&query).await.map_err(ApiError::store)?)
}

/// `PUT users/me/companies/{id}`: the owner or an admin only. Owners may
/// not reassign or deactivate their listing.
pub async fn update_company<S>(
  state: &AppState<S>,
  ctx: &RequestContext,
) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let caller = ctx.principal()?;
  let id = ctx.id(0)?;

  let company = state
    .store
    .get_company(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;
  if !caller.can_manage(company.owner_id) {
    return Err(ApiError::Forbidden("Access denied".into()));
  }

  let mut patch: CompanyPatch = ctx.json()?;
  if !caller.is_admin() {
    patch = patch.owner_editable();
  }
  if patch.is_empty() {
    return Err(ApiError::BadRequest("No fields to update".into()));
  }
  patch.validate()?;

  let updated = state
    .store
    .update_company(id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;
  ok(updated)
}
