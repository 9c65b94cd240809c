//! Public review listing and review submission.

use axum::response::Response;
use hal_core::{
  moderation::ModerationEngine,
  review::{NewReview, ReviewStatus},
  store::DirectoryStore,
};
use serde::Deserialize;
use serde_json::json;

use super::{RequestContext, created, ok};
use crate::{AppState, error::ApiError};

/// `GET companies/{id}/reviews`: approved reviews, newest first.
pub async fn list<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let company_id = ctx.id(0)?;
  state
    .store
    .get_company(company_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;

  let reviews = state
    .store
    .list_company_reviews(company_id, Some(ReviewStatus::Approved))
    .await
    .map_err(ApiError::store)?;
  ok(reviews)
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
  #[serde(default)]
  pub rating:  i64,
  #[serde(default)]
  pub comment: String,
}

/// `POST companies/{id}/reviews` takes `{"rating":1..5,"comment":"…"}`.
pub async fn create<S>(state: &AppState<S>, ctx: &RequestContext) -> Result<Response, ApiError>
where
  S: DirectoryStore,
{
  let author = ctx.principal()?;
  let company_id = ctx.id(0)?;
  let body: ReviewBody = ctx.json()?;

  let company = state
    .store
    .get_company(company_id)
    .await
    .map_err(ApiError::store)?
    .filter(|c| c.is_active)
    .ok_or_else(|| ApiError::NotFound("Company not found".into()))?;

  let engine = ModerationEngine::new(&*state.store, state.config.require_review_moderation);
  let change = engine
    .submit(NewReview {
      company_id:  company.id,
      author_id:   author.id,
      author_name: author.name.clone(),
      rating:      body.rating,
      comment:     body.comment.trim().to_owned(),
    })
    .await?;

  let message = match change.review.status {
    ReviewStatus::Pending => "Review submitted for moderation",
    _ => "Review published",
  };
  created(json!({ "message": message, "review": change.review }))
}
