//! Public catalog reads, plus listing submission by signed-in users.

use axum::response::Response;
use hal_core::{
  company::{CategoryId, CompanyQuery, CompanySort, NewCompany},
  store::DirectoryStore,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{RequestContext, created, ok, paging};
use crate::{AppState, error::ApiError};

const HOME_LIST_LEN: usize = 6;
const CITY_LIST_LEN: usize = 50;

/// `GET` (API root)
pub async fn home<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let settings = state.store.get_settings().await.map_err(ApiError::store)?;
  let featured = |sort| CompanyQuery {
    active: Some(true),
    sort,
    limit: Some(HOME_LIST_LEN),
    ..Default::default()
  };

  let top_rated = state
    .store
    .list_companies(&featured(CompanySort::Rating))
    .await
    .map_err(ApiError::store)?;
  let recent = state
    .store
    .list_companies(&featured(CompanySort::Recent))
    .await
    .map_err(ApiError::store)?;
  let categories = state.store.list_categories().await.map_err(ApiError::store)?;

  ok(json!({
    "name":       settings.get("site_name"),
    "categories": categories,
    "top_rated":  top_rated,
    "recent":     recent,
  }))
}

/// `GET categories`
pub async fn categories<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.list_categories().await.map_err(ApiError::store)?)
}

/// `GET categories/{slug}`: by slug, or by id when the segment is numeric.
/// Carries the subcategories and the first page of active listings.
pub async fn category<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let key = ctx.params.first().map(String::as_str).unwrap_or_default();
  let categories = state.store.list_categories().await.map_err(ApiError::store)?;
  let category = match key.parse::<CategoryId>() {
    Ok(id) => categories.iter().find(|c| c.id == id),
    Err(_) => categories.iter().find(|c| c.slug == key),
  }
  .ok_or_else(|| ApiError::NotFound("Category not found".into()))?;

  let children: Vec<_> = categories.iter().filter(|c| c.parent_id == Some(category.id)).collect();
  let query = CompanyQuery {
    category_id: Some(category.id),
    active: Some(true),
    sort: CompanySort::Rating,
    limit: Some(20),
    ..Default::default()
  };
  let companies = state.store.list_companies(&query).await.map_err(ApiError::store)?;

  ok(json!({ "category": category, "children": children, "companies": companies }))
}

/// `GET cities`
pub async fn cities<S>(state: &AppState<S>) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  ok(state.store.list_cities(CITY_LIST_LEN).await.map_err(ApiError::store)?)
}

#[derive(Debug, Deserialize)]
pub struct CatalogParams {
  pub page:     Option<usize>,
  pub limit:    Option<usize>,
  pub category: Option<CategoryId>,
  pub city:     Option<String>,
  pub search:   Option<String>,
  #[serde(default)]
  pub sort:     CompanySort,
}

/// `GET companies[?page&limit&category&city&search&sort]`: active listings
/// only.
pub async fn companies<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let params: CatalogParams = ctx.query()?;
  let (page, limit) = paging(params.page, params.limit, 20);
  let query = CompanyQuery {
    search:      params.search.filter(|s| !s.trim().is_empty()),
    city:        params.city.filter(|s| !s.trim().is_empty()),
    category_id: params.category,
    active:      Some(true),
    sort:        params.sort,
    limit:       Some(limit),
    offset:      Some((page - 1) * limit),
    ..Default::default()
  };

  let companies = state.store.list_companies(&query).await.map_err(ApiError::store)?;
  ok(json!({ "companies": companies, "page": page, "limit": limit }))
}

/// `GET companies/{id}`: counts a view, attributed to the caller if known.
pub async fn company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let id = ctx.id(0)?;
  let company = state
    .store
    .get_company(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;

  let viewer = ctx.principal.as_ref().map(|p| p.id);
  if let Err(e) = state.store.record_company_view(id, viewer).await {
    warn!(error = %e, company_id = id, "failed to record company view");
  }

  ok(company)
}

/// `POST companies`: the caller becomes the owner.
pub async fn create_company<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let owner = ctx.principal()?;
  let input: NewCompany = ctx.json()?;
  if input.name.trim().is_empty() {
    return Err(ApiError::BadRequest("Field 'name' is required".into()));
  }

  let company = state
    .store
    .create_company(NewCompany { owner_id: Some(owner.id), is_active: true, ..input })
    .await
    .map_err(ApiError::store)?;

  created(json!({ "id": company.id, "message": "Company created" }))
}
