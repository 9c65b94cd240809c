//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use hal_core::{
  audit::{AuditAction, EntityKind, NewAuditEntry},
  company::{CompanyPatch, CompanyQuery, CompanySort, NewCategory, NewCompany},
  moderation::{ModerationEngine, ModerationError},
  review::{NewReview, RatingAggregate, ReviewStatus},
  store::{DirectoryStore, Fault, Page, StoreError as _},
  user::{NewUser, Principal, ProfilePatch, Role},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn user(s: &SqliteStore, email: &str) -> Principal {
  s.create_user(NewUser {
    name:          email.split('@').next().unwrap_or(email).to_owned(),
    email:         email.to_owned(),
    phone:         None,
    password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_owned(),
    role:          Role::User,
  })
  .await
  .unwrap()
}

fn company(name: &str) -> NewCompany {
  NewCompany { name: name.into(), is_active: true, ..Default::default() }
}

fn review(company_id: i64, author: &Principal, rating: i64) -> NewReview {
  NewReview {
    company_id,
    author_id: author.id,
    author_name: author.name.clone(),
    rating,
    comment: "Solid service".into(),
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_user() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  assert_eq!(alice.role, Role::User);
  assert!(alice.is_active);

  let fetched = s.get_user(alice.id).await.unwrap().unwrap();
  assert_eq!(fetched, alice);
  assert!(s.get_user(alice.id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  user(&s, "alice@example.com").await;

  let err = s
    .create_user(NewUser {
      name:          "Other".into(),
      email:         "alice@example.com".into(),
      phone:         None,
      password_hash: "x".into(),
      role:          Role::User,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::EmailTaken(_)));
  assert!(s.email_exists("alice@example.com").await.unwrap());
}

#[tokio::test]
async fn credentials_carry_password_hash() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;

  let creds = s.find_credentials("alice@example.com").await.unwrap().unwrap();
  assert_eq!(creds.principal.id, alice.id);
  assert!(creds.password_hash.starts_with("$argon2id$"));
  assert!(s.find_credentials("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn role_change_and_toggle_active() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;

  assert!(s.set_user_role(alice.id, Role::Analyst).await.unwrap());
  assert_eq!(s.get_user(alice.id).await.unwrap().unwrap().role, Role::Analyst);
  assert!(!s.set_user_role(9999, Role::Admin).await.unwrap());

  assert_eq!(s.toggle_user_active(alice.id).await.unwrap(), Some(false));
  assert_eq!(s.toggle_user_active(alice.id).await.unwrap(), Some(true));
  assert_eq!(s.toggle_user_active(9999).await.unwrap(), None);

  assert!(s.set_role_by_email("alice@example.com", Role::Admin).await.unwrap());
  assert!(s.get_user(alice.id).await.unwrap().unwrap().is_admin());
}

#[tokio::test]
async fn profile_update_changes_only_given_fields() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;

  let patch = ProfilePatch { phone: Some("+380 44 000 00 00".into()), ..Default::default() };
  let updated = s.update_profile(alice.id, patch).await.unwrap().unwrap();
  assert_eq!(updated.name, alice.name);
  assert_eq!(updated.phone.as_deref(), Some("+380 44 000 00 00"));

  let patch = ProfilePatch { name: Some("Alice B.".into()), ..Default::default() };
  let updated = s.update_profile(alice.id, patch).await.unwrap().unwrap();
  assert_eq!(updated.name, "Alice B.");
  assert_eq!(updated.phone.as_deref(), Some("+380 44 000 00 00"));

  assert!(s.update_profile(alice.id + 100, ProfilePatch::default()).await.unwrap().is_none());
}

// ─── Companies ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_references_are_caller_errors() {
  let s = store().await;
  let input = NewCompany { category_id: Some(999), ..company("Acme") };
  let err = s.create_company(input).await.unwrap_err();
  assert_eq!(err.fault(), Fault::Invalid("Referenced record does not exist".into()));

  let c = s.create_company(company("Acme")).await.unwrap();
  let patch = CompanyPatch { owner_id: Some(999), ..Default::default() };
  let err = s.update_company(c.id, patch).await.unwrap_err();
  assert!(matches!(err.fault(), Fault::Invalid(_)));
}

#[tokio::test]
async fn company_patch_updates_only_given_fields() {
  let s = store().await;
  let c = s
    .create_company(NewCompany { city: Some("Kyiv".into()), ..company("Acme") })
    .await
    .unwrap();
  assert_eq!(c.rating, 0.0);
  assert_eq!(c.review_count, 0);

  let patch = CompanyPatch { name: Some("Acme Ltd".into()), ..Default::default() };
  let updated = s.update_company(c.id, patch).await.unwrap().unwrap();
  assert_eq!(updated.name, "Acme Ltd");
  assert_eq!(updated.city.as_deref(), Some("Kyiv"));

  let missing = s.update_company(c.id + 1, CompanyPatch::default()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn list_companies_filters_and_sorts() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  s.create_company(NewCompany { owner_id: Some(alice.id), ..company("Bakery") }).await.unwrap();
  s.create_company(NewCompany { city: Some("Lviv".into()), ..company("Books") }).await.unwrap();
  s.create_company(NewCompany { is_active: false, ..company("Closed Bar") }).await.unwrap();

  let active = s
    .list_companies(&CompanyQuery { active: Some(true), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(active.len(), 2);

  let owned = s
    .list_companies(&CompanyQuery { owner_id: Some(alice.id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(owned.len(), 1);
  assert_eq!(owned[0].name, "Bakery");

  let searched = s
    .list_companies(&CompanyQuery { search: Some("Boo".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(searched.len(), 1);

  let in_lviv = s
    .list_companies(&CompanyQuery {
      city: Some("lviv".into()),
      sort: CompanySort::Rating,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(in_lviv.len(), 1);
}

#[tokio::test]
async fn views_are_counted() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();

  s.record_company_view(c.id, None).await.unwrap();
  s.record_company_view(c.id, Some(alice.id)).await.unwrap();
  // Unknown company is a no-op.
  s.record_company_view(c.id + 1, None).await.unwrap();

  assert_eq!(s.get_company(c.id).await.unwrap().unwrap().views_count, 2);

  let now = s.count_company_views(c.id, Utc::now()).await.unwrap();
  assert_eq!((now.total, now.this_week, now.this_month), (2, 2, 2));
  let later = s.count_company_views(c.id, Utc::now() + Duration::days(10)).await.unwrap();
  assert_eq!((later.total, later.this_week, later.this_month), (2, 0, 2));
}

#[tokio::test]
async fn cities_are_ranked_by_active_listings() {
  let s = store().await;
  for (name, city, active) in [
    ("A", Some("Lviv"), true),
    ("B", Some("Kyiv"), true),
    ("C", Some("Kyiv"), true),
    ("D", Some("Odesa"), false),
    ("E", Some(""), true),
    ("F", None, true),
  ] {
    let input = NewCompany { city: city.map(str::to_owned), is_active: active, ..company(name) };
    s.create_company(input).await.unwrap();
  }

  let cities = s.list_cities(50).await.unwrap();
  let got: Vec<_> = cities.iter().map(|c| (c.city.as_str(), c.count)).collect();
  assert_eq!(got, vec![("Kyiv", 2), ("Lviv", 1)]);
  assert_eq!(s.list_cities(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn category_slug_must_be_unique() {
  let s = store().await;
  let cat = s
    .create_category(NewCategory { name: "Food".into(), slug: "food".into(), parent_id: None })
    .await
    .unwrap();

  let err = s
    .create_category(NewCategory { name: "Food 2".into(), slug: "food".into(), parent_id: None })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SlugTaken(_)));

  let renamed = s
    .update_category(cat.id, NewCategory { name: "Eat".into(), slug: "eat".into(), parent_id: None })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(renamed.slug, "eat");

  assert!(s.delete_category(cat.id).await.unwrap());
  assert!(s.list_categories().await.unwrap().is_empty());
}

// ─── Reviews & rating aggregate ──────────────────────────────────────────────

async fn assert_aggregate(s: &SqliteStore, company_id: i64) {
  let approved: Vec<u8> = s
    .list_company_reviews(company_id, Some(ReviewStatus::Approved))
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.rating)
    .collect();
  let expected = RatingAggregate::from_ratings(approved);
  let c = s.get_company(company_id).await.unwrap().unwrap();
  assert_eq!(c.rating, expected.rating);
  assert_eq!(c.review_count, expected.review_count);
}

#[tokio::test]
async fn moderation_scenario_keeps_rating_consistent() {
  let s = store().await;
  let admin = user(&s, "admin@example.com").await;
  let alice = user(&s, "alice@example.com").await;
  let bob = user(&s, "bob@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);

  let first = engine.submit(review(c.id, &alice, 5)).await.unwrap();
  assert_eq!(first.review.status, ReviewStatus::Pending);
  assert_eq!(first.aggregate, RatingAggregate::EMPTY);

  let change = engine
    .moderate(first.review.id, ReviewStatus::Approved, admin.id, None)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(change.aggregate, RatingAggregate { rating: 5.0, review_count: 1 });
  assert_eq!(change.review.moderated_by, Some(admin.id));
  assert!(change.review.moderated_at.is_some());

  let second = engine.submit(review(c.id, &bob, 3)).await.unwrap();
  engine
    .moderate(second.review.id, ReviewStatus::Approved, admin.id, Some("ok".into()))
    .await
    .unwrap();
  let acme = s.get_company(c.id).await.unwrap().unwrap();
  assert_eq!((acme.rating, acme.review_count), (4.0, 2));

  let deleted = engine.delete(first.review.id).await.unwrap().unwrap();
  assert_eq!(deleted.aggregate, RatingAggregate { rating: 3.0, review_count: 1 });
  let acme = s.get_company(c.id).await.unwrap().unwrap();
  assert_eq!((acme.rating, acme.review_count), (3.0, 1));
}

#[tokio::test]
async fn rejecting_an_approved_review_lowers_the_aggregate() {
  let s = store().await;
  let admin = user(&s, "admin@example.com").await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);

  let r = engine.submit(review(c.id, &alice, 4)).await.unwrap().review;
  engine.moderate(r.id, ReviewStatus::Approved, admin.id, None).await.unwrap();
  let change = engine
    .moderate(r.id, ReviewStatus::Rejected, admin.id, Some("spam".into()))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(change.review.status, ReviewStatus::Rejected);
  assert_eq!(change.review.moderation_note.as_deref(), Some("spam"));
  assert_eq!(change.aggregate, RatingAggregate::EMPTY);
  assert_aggregate(&s, c.id).await;
}

#[tokio::test]
async fn aggregate_holds_after_every_operation() {
  let s = store().await;
  let admin = user(&s, "admin@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);

  let mut ids = vec![];
  for (i, rating) in [5, 2, 4, 1, 3].into_iter().enumerate() {
    let author = user(&s, &format!("author{i}@example.com")).await;
    ids.push(engine.submit(review(c.id, &author, rating)).await.unwrap().review.id);
    assert_aggregate(&s, c.id).await;
  }

  let verdicts = [
    (ids[0], ReviewStatus::Approved),
    (ids[1], ReviewStatus::Approved),
    (ids[2], ReviewStatus::Rejected),
    (ids[3], ReviewStatus::Approved),
    (ids[1], ReviewStatus::Rejected),
    (ids[2], ReviewStatus::Approved),
  ];
  for (id, status) in verdicts {
    engine.moderate(id, status, admin.id, None).await.unwrap();
    assert_aggregate(&s, c.id).await;
  }

  for id in [ids[4], ids[0], ids[3], ids[2]] {
    engine.delete(id).await.unwrap();
    assert_aggregate(&s, c.id).await;
  }

  // Only the rejected review remains: zero approved means rating 0.
  let acme = s.get_company(c.id).await.unwrap().unwrap();
  assert_eq!((acme.rating, acme.review_count), (0.0, 0));
}

#[tokio::test]
async fn moderation_disabled_publishes_immediately() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, false);

  let change = engine.submit(review(c.id, &alice, 4)).await.unwrap();
  assert_eq!(change.review.status, ReviewStatus::Approved);
  assert_eq!(change.aggregate, RatingAggregate { rating: 4.0, review_count: 1 });
}

#[tokio::test]
async fn engine_rejects_bad_input() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);

  let err = engine.submit(review(c.id, &alice, 6)).await.unwrap_err();
  assert!(matches!(err, ModerationError::Rejected(hal_core::Error::InvalidRating(6))));

  let mut blank = review(c.id, &alice, 3);
  blank.comment = "   ".into();
  let err = engine.submit(blank).await.unwrap_err();
  assert!(matches!(err, ModerationError::Rejected(hal_core::Error::EmptyComment)));

  let r = engine.submit(review(c.id, &alice, 3)).await.unwrap().review;
  let err = engine.submit(review(c.id, &alice, 2)).await.unwrap_err();
  assert!(matches!(
    err,
    ModerationError::Rejected(hal_core::Error::DuplicateReview { .. })
  ));

  let err = engine
    .moderate(r.id, ReviewStatus::Pending, alice.id, None)
    .await
    .unwrap_err();
  assert!(matches!(err, ModerationError::Rejected(hal_core::Error::InvalidTransition(_))));
  assert_eq!(s.get_review(r.id).await.unwrap().unwrap().status, ReviewStatus::Pending);
}

#[tokio::test]
async fn failed_recompute_rolls_back_the_status_change() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let admin = user(&s, "admin@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);
  let pending = engine.submit(review(c.id, &alice, 5)).await.unwrap().review;

  s.execute_batch(
    "CREATE TRIGGER freeze_rating BEFORE UPDATE OF rating ON companies
     BEGIN SELECT RAISE(ABORT, 'rating is frozen'); END;",
  )
  .await
  .unwrap();

  let err = engine
    .moderate(pending.id, ReviewStatus::Approved, admin.id, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    ModerationError::Store(Error::AggregateRecompute { company_id, .. }) if company_id == c.id
  ));
  assert_eq!(s.get_review(pending.id).await.unwrap().unwrap().status, ReviewStatus::Pending);

  let err = engine.delete(pending.id).await.unwrap_err();
  assert!(matches!(err, ModerationError::Store(Error::AggregateRecompute { .. })));
  assert!(s.get_review(pending.id).await.unwrap().is_some());

  let unchanged = s.get_company(c.id).await.unwrap().unwrap();
  assert_eq!((unchanged.rating, unchanged.review_count), (0.0, 0));
}

#[tokio::test]
async fn racing_duplicate_review_is_a_domain_error() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();

  // Straight to the store, past the engine's pre-check.
  s.insert_review(review(c.id, &alice, 4), ReviewStatus::Pending).await.unwrap();
  let err = s
    .insert_review(review(c.id, &alice, 2), ReviewStatus::Pending)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(hal_core::Error::DuplicateReview { company_id, author_id })
      if company_id == c.id && author_id == alice.id
  ));
  assert!(matches!(err.fault(), Fault::Invalid(_)));
}

#[tokio::test]
async fn missing_review_yields_none() {
  let s = store().await;
  let engine = ModerationEngine::new(&s, true);
  assert!(engine.moderate(42, ReviewStatus::Approved, 1, None).await.unwrap().is_none());
  assert!(engine.delete(42).await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_company_removes_its_reviews() {
  let s = store().await;
  let alice = user(&s, "alice@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let r = ModerationEngine::new(&s, true)
    .submit(review(c.id, &alice, 5))
    .await
    .unwrap()
    .review;

  assert!(s.delete_company(c.id).await.unwrap());
  assert!(s.get_review(r.id).await.unwrap().is_none());
  assert!(!s.delete_company(c.id).await.unwrap());
}

#[tokio::test]
async fn moderation_queue_is_filtered_by_status() {
  let s = store().await;
  let admin = user(&s, "admin@example.com").await;
  let c = s.create_company(company("Acme")).await.unwrap();
  let engine = ModerationEngine::new(&s, true);

  for i in 0..3 {
    let author = user(&s, &format!("a{i}@example.com")).await;
    engine.submit(review(c.id, &author, 4)).await.unwrap();
  }
  let pending = s.list_reviews(ReviewStatus::Pending, Page::numbered(1, 20)).await.unwrap();
  assert_eq!(pending.len(), 3);

  engine.moderate(pending[0].id, ReviewStatus::Approved, admin.id, None).await.unwrap();
  let pending = s.list_reviews(ReviewStatus::Pending, Page::numbered(1, 20)).await.unwrap();
  assert_eq!(pending.len(), 2);
  let second_page = s.list_reviews(ReviewStatus::Pending, Page::numbered(2, 1)).await.unwrap();
  assert_eq!(second_page.len(), 1);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.reviews, 3);
  assert_eq!(stats.pending_reviews, 2);
}

// ─── Audit log & settings ────────────────────────────────────────────────────

#[tokio::test]
async fn audit_entries_are_listed_newest_first() {
  let s = store().await;
  let admin = user(&s, "admin@example.com").await;

  s.append_audit(NewAuditEntry {
    actor_id:   admin.id,
    action:     AuditAction::Create,
    entity:     EntityKind::Company,
    entity_id:  Some(1),
    details:    None,
    ip_address: Some("127.0.0.1".into()),
  })
  .await
  .unwrap();
  let second = s
    .append_audit(NewAuditEntry {
      actor_id:   admin.id,
      action:     AuditAction::UpdateRole,
      entity:     EntityKind::User,
      entity_id:  Some(7),
      details:    Some(serde_json::json!({ "role": "analyst" })),
      ip_address: None,
    })
    .await
    .unwrap();

  let entries = s.list_audit(Page::numbered(1, 50)).await.unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0], second);
  assert_eq!(entries[0].entity_type, "user");
  assert_eq!(entries[1].action, AuditAction::Create);
  assert_eq!(entries[1].ip_address.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn settings_update_ignores_unknown_keys() {
  let s = store().await;
  let defaults = s.get_settings().await.unwrap();
  assert_eq!(defaults.get("site_name").map(String::as_str), Some("HAL"));

  let changed = s
    .update_settings(BTreeMap::from([
      ("site_name".to_owned(), "Directory".to_owned()),
      ("no_such_key".to_owned(), "x".to_owned()),
    ]))
    .await
    .unwrap();
  assert_eq!(changed, 1);

  let settings = s.get_settings().await.unwrap();
  assert_eq!(settings["site_name"], "Directory");
  assert!(!settings.contains_key("no_such_key"));
}
