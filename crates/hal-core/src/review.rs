//! Reviews and the company rating aggregate derived from them.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, company::CompanyId, user::UserId};

pub type ReviewId = i64;

/// Moderation status of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
  Pending,
  Approved,
  Rejected,
}

impl ReviewStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      ReviewStatus::Pending => "pending",
      ReviewStatus::Approved => "approved",
      ReviewStatus::Rejected => "rejected",
    }
  }

  /// Whether a moderator may move a review into this status.
  pub fn is_verdict(self) -> bool { !matches!(self, ReviewStatus::Pending) }
}

impl fmt::Display for ReviewStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ReviewStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(ReviewStatus::Pending),
      "approved" => Ok(ReviewStatus::Approved),
      "rejected" => Ok(ReviewStatus::Rejected),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id:              ReviewId,
  pub company_id:      CompanyId,
  pub author_id:       UserId,
  pub author_name:     String,
  pub rating:          u8,
  pub comment:         String,
  pub status:          ReviewStatus,
  pub moderated_by:    Option<UserId>,
  pub moderated_at:    Option<DateTime<Utc>>,
  pub moderation_note: Option<String>,
  pub created_at:      DateTime<Utc>,
}

/// Input for a new review; the status is chosen by the moderation engine.
#[derive(Debug, Clone)]
pub struct NewReview {
  pub company_id:  CompanyId,
  pub author_id:   UserId,
  pub author_name: String,
  pub rating:      i64,
  pub comment:     String,
}

/// A moderator's verdict as persisted on the review row.
#[derive(Debug, Clone)]
pub struct Moderation {
  pub status:       ReviewStatus,
  pub moderated_by: UserId,
  pub note:         Option<String>,
  pub at:           DateTime<Utc>,
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// The derived `rating`/`review_count` pair stored on a company.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
  pub rating:       f64,
  pub review_count: u32,
}

impl RatingAggregate {
  pub const EMPTY: Self = Self { rating: 0.0, review_count: 0 };

  /// Average of the given approved ratings rounded to one decimal place
  /// (half away from zero); `0` when there are none.
  pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
    let (sum, count) = ratings
      .into_iter()
      .fold((0u64, 0u32), |(sum, n), r| (sum + u64::from(r), n + 1));

    if count == 0 {
      return Self::EMPTY;
    }

    let avg = sum as f64 / f64::from(count);
    Self { rating: (avg * 10.0).round() / 10.0, review_count: count }
  }
}

/// The outcome of a review mutation: the affected review and the company
/// aggregate recomputed in the same transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewChange {
  pub review:    Review,
  pub aggregate: RatingAggregate,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_aggregate_is_zero() {
    assert_eq!(RatingAggregate::from_ratings([]), RatingAggregate::EMPTY);
  }

  #[test]
  fn aggregate_rounds_to_one_decimal() {
    let agg = RatingAggregate::from_ratings([5, 4, 4]);
    assert_eq!(agg.review_count, 3);
    assert_eq!(agg.rating, 4.3);

    let agg = RatingAggregate::from_ratings([5, 4, 5]);
    assert_eq!(agg.rating, 4.7);

    // 4.25 rounds away from zero.
    let agg = RatingAggregate::from_ratings([5, 4, 4, 4]);
    assert_eq!(agg.rating, 4.3);
  }

  #[test]
  fn only_verdicts_are_moderation_targets() {
    assert!(ReviewStatus::Approved.is_verdict());
    assert!(ReviewStatus::Rejected.is_verdict());
    assert!(!ReviewStatus::Pending.is_verdict());
  }
}
