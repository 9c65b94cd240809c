//! The review moderation state machine.
//!
//! ```text
//!            submit
//!   (new) ──────────► pending ──┐
//!     │                         │ moderate(approved | rejected)
//!     │ moderation off          ▼
//!     └────────────► approved ◄──► rejected
//! ```
//!
//! No state is terminal: a verdict can always be revised, and a review in any
//! state can be deleted. Every transition runs through one of the store's
//! atomic review mutations, which recompute the owning company's
//! [`RatingAggregate`](crate::review::RatingAggregate) in the same
//! transaction.

use chrono::Utc;
use thiserror::Error;

use crate::{
  Error,
  review::{Moderation, NewReview, ReviewChange, ReviewId, ReviewStatus},
  store::DirectoryStore,
  user::UserId,
};

#[derive(Debug, Error)]
pub enum ModerationError<E>
where
  E: std::error::Error + 'static,
{
  /// The request was refused before touching the store.
  #[error(transparent)]
  Rejected(#[from] Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}

/// Drives review status changes against a [`DirectoryStore`].
pub struct ModerationEngine<'a, S> {
  store:              &'a S,
  require_moderation: bool,
}

impl<'a, S: DirectoryStore> ModerationEngine<'a, S> {
  /// `require_moderation = false` publishes new reviews immediately.
  pub fn new(store: &'a S, require_moderation: bool) -> Self {
    Self { store, require_moderation }
  }

  pub fn initial_status(&self) -> ReviewStatus {
    if self.require_moderation {
      ReviewStatus::Pending
    } else {
      ReviewStatus::Approved
    }
  }

  /// Validate and persist a new review in its initial status.
  ///
  /// One review per author and company.
  pub async fn submit(
    &self,
    input: NewReview,
  ) -> Result<ReviewChange, ModerationError<S::Error>> {
    if !(1..=5).contains(&input.rating) {
      return Err(Error::InvalidRating(input.rating).into());
    }
    if input.comment.trim().is_empty() {
      return Err(Error::EmptyComment.into());
    }

    let existing = self
      .store
      .find_review_by_author(input.company_id, input.author_id)
      .await
      .map_err(ModerationError::Store)?;
    if existing.is_some() {
      return Err(
        Error::DuplicateReview {
          company_id: input.company_id,
          author_id:  input.author_id,
        }
        .into(),
      );
    }

    self
      .store
      .insert_review(input, self.initial_status())
      .await
      .map_err(ModerationError::Store)
  }

  /// Record a moderator's verdict. `target` must be `approved` or
  /// `rejected`; returns `Ok(None)` if the review does not exist.
  pub async fn moderate(
    &self,
    review_id: ReviewId,
    target: ReviewStatus,
    moderator_id: UserId,
    note: Option<String>,
  ) -> Result<Option<ReviewChange>, ModerationError<S::Error>> {
    if !target.is_verdict() {
      return Err(Error::InvalidTransition(target.as_str().to_owned()).into());
    }

    let moderation = Moderation {
      status: target,
      moderated_by: moderator_id,
      note,
      at: Utc::now(),
    };

    self
      .store
      .moderate_review(review_id, moderation)
      .await
      .map_err(ModerationError::Store)
  }

  /// Remove a review from any state; returns `Ok(None)` if it does not
  /// exist.
  pub async fn delete(
    &self,
    review_id: ReviewId,
  ) -> Result<Option<ReviewChange>, ModerationError<S::Error>> {
    self
      .store
      .delete_review(review_id)
      .await
      .map_err(ModerationError::Store)
  }
}

/// Parse a moderation target from request input. Anything other than a
/// verdict status is an invalid transition.
pub fn parse_target(raw: &str) -> Result<ReviewStatus, Error> {
  match raw.parse::<ReviewStatus>() {
    Ok(status) if status.is_verdict() => Ok(status),
    _ => Err(Error::InvalidTransition(raw.to_owned())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_target_accepts_only_verdicts() {
    assert_eq!(parse_target("approved").unwrap(), ReviewStatus::Approved);
    assert_eq!(parse_target("rejected").unwrap(), ReviewStatus::Rejected);
    assert!(matches!(parse_target("pending"), Err(Error::InvalidTransition(_))));
    assert!(matches!(parse_target("published"), Err(Error::InvalidTransition(_))));
  }
}
