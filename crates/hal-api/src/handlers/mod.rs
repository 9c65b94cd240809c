//! Endpoint handlers, grouped by audience.
//!
//! The dispatcher has already resolved the caller and applied the route's
//! [`AuthRequirement`](crate::policy::AuthRequirement) by the time a handler
//! runs; handlers only enforce record-level rules such as ownership.

pub mod account;
pub mod admin;
pub mod auth;
pub mod catalog;
pub mod reviews;

use axum::{
  Json,
  extract::Query,
  http::{StatusCode, Uri},
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use hal_core::{store::DirectoryStore, user::Principal};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::{AppState, error::ApiError, routes::Endpoint};

/// Everything a handler may read from the request.
#[derive(Debug)]
pub struct RequestContext {
  pub principal: Option<Principal>,
  /// Positional path captures.
  pub params:    Vec<String>,
  pub uri:       Uri,
  pub ip:        Option<String>,
  pub body:      Bytes,
}

impl RequestContext {
  /// The authenticated caller. Only fails if a route that reaches this
  /// handler was declared without an auth requirement.
  pub fn principal(&self) -> Result<&Principal, ApiError> {
    self
      .principal
      .as_ref()
      .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))
  }

  /// The `n`th path capture as a record id.
  pub fn id(&self, n: usize) -> Result<i64, ApiError> {
    self
      .params
      .get(n)
      .and_then(|p| p.parse().ok())
      .ok_or_else(|| ApiError::BadRequest("invalid id in path".into()))
  }

  /// Parse the JSON body; an empty body reads as `{}`.
  pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
    let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &self.body };
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
  }

  pub fn query<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
    Query::<T>::try_from_uri(&self.uri)
      .map(|Query(q)| q)
      .map_err(|e| ApiError::BadRequest(e.body_text()))
  }
}

pub(crate) fn ok<T: Serialize>(value: T) -> Result<Response, ApiError> {
  Ok(Json(value).into_response())
}

pub(crate) fn created<T: Serialize>(value: T) -> Result<Response, ApiError> {
  Ok((StatusCode::CREATED, Json(value)).into_response())
}

pub(crate) fn message(text: impl Into<String>) -> Result<Response, ApiError> {
  ok(json!({ "message": text.into() }))
}

/// 1-based page number and page size from query parameters, clamped.
pub(crate) fn paging(page: Option<usize>, limit: Option<usize>, default: usize) -> (usize, usize) {
  (page.unwrap_or(1).max(1), limit.unwrap_or(default).clamp(1, 100))
}

/// Invoke the handler behind `endpoint`.
pub async fn handle<S>(
  state: &AppState<S>,
  endpoint: Endpoint,
  ctx: RequestContext,
) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  use Endpoint::*;

  match endpoint {
    Home => catalog::home(state).await,
    Register => auth::register(state, &ctx).await,
    Login => auth::login(state, &ctx).await,
    Me => auth::me(&ctx),
    Categories => catalog::categories(state).await,
    Category => catalog::category(state, &ctx).await,
    Cities => catalog::cities(state).await,
    Companies => catalog::companies(state, &ctx).await,
    CreateCompany => catalog::create_company(state, &ctx).await,
    CompanyReviews => reviews::list(state, &ctx).await,
    CreateReview => reviews::create(state, &ctx).await,
    Company => catalog::company(state, &ctx).await,
    MyDashboard => account::dashboard(state, &ctx).await,
    UpdateProfile => account::update_profile(state, &ctx).await,
    MyCompanies => account::companies(state, &ctx).await,
    UpdateMyCompany => account::update_company(state, &ctx).await,
    AdminDashboard => admin::dashboard(state).await,
    AdminCategories => admin::categories(state).await,
    AdminCreateCategory => admin::create_category(state, &ctx).await,
    AdminUpdateCategory => admin::update_category(state, &ctx).await,
    AdminDeleteCategory => admin::delete_category(state, &ctx).await,
    AdminCompanies => admin::companies(state, &ctx).await,
    AdminCompany => admin::company(state, &ctx).await,
    AdminCreateCompany => admin::create_company(state, &ctx).await,
    AdminUpdateCompany => admin::update_company(state, &ctx).await,
    AdminDeleteCompany => admin::delete_company(state, &ctx).await,
    AdminReviews => admin::reviews(state, &ctx).await,
    AdminModerateReview => admin::moderate_review(state, &ctx).await,
    AdminDeleteReview => admin::delete_review(state, &ctx).await,
    AdminUsers => admin::users(state).await,
    AdminUpdateUserRole => admin::update_user_role(state, &ctx).await,
    AdminToggleUserStatus => admin::toggle_user_status(state, &ctx).await,
    AdminSettings => admin::settings(state).await,
    AdminUpdateSettings => admin::update_settings(state, &ctx).await,
    AdminLogs => admin::logs(state, &ctx).await,
  }
}
