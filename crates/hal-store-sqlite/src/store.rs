//! [`SqliteStore`]: the SQLite implementation of [`DirectoryStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value};

use hal_core::{
  audit::{AuditEntry, NewAuditEntry},
  company::{
    Category, CategoryId, CityCount, Company, CompanyId, CompanyPatch, CompanyQuery, CompanySort,
    NewCategory, NewCompany,
  },
  review::{
    Moderation, NewReview, RatingAggregate, Review, ReviewChange, ReviewId, ReviewStatus,
  },
  store::{DirectoryStats, DirectoryStore, Page, ViewCounts},
  user::{Credentials, NewUser, Principal, ProfilePatch, Role, UserId},
};

use crate::{
  Error, Result,
  encode::{
    AUDIT_COLUMNS, CATEGORY_COLUMNS, COMPANY_COLUMNS, REVIEW_COLUMNS, RawAudit, RawCompany,
    RawReview, RawUser, USER_COLUMNS, category_from_row, encode_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A HAL directory store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Grant `role` to the account registered under `email`. Returns `false`
  /// if no such account exists.
  pub async fn set_role_by_email(&self, email: &str, role: Role) -> Result<bool> {
    let email = email.to_owned();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET role = ?1 WHERE email = ?2",
          rusqlite::params![role.as_str(), email],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  /// Run raw SQL on the store's connection. Fixtures use it to inject
  /// failures.
  #[cfg(any(test, feature = "test-util"))]
  pub async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Rating aggregate ────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("rating recompute failed for company {company_id}")]
struct RecomputeFailed {
  company_id: CompanyId,
  #[source]
  source:     rusqlite::Error,
}

/// Recompute `rating`/`review_count` for `company_id` from its approved
/// reviews. Must be called inside the transaction that changed the reviews.
fn recompute_rating(
  tx: &rusqlite::Transaction<'_>,
  company_id: CompanyId,
) -> tokio_rusqlite::Result<RatingAggregate> {
  let run = || -> rusqlite::Result<RatingAggregate> {
    let mut stmt = tx.prepare(
      "SELECT rating FROM reviews WHERE company_id = ?1 AND status = 'approved'",
    )?;
    let ratings = stmt
      .query_map(rusqlite::params![company_id], |row| row.get::<_, u8>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let aggregate = RatingAggregate::from_ratings(ratings);
    tx.execute(
      "UPDATE companies SET rating = ?1, review_count = ?2 WHERE id = ?3",
      rusqlite::params![aggregate.rating, aggregate.review_count, company_id],
    )?;
    Ok(aggregate)
  };

  run().map_err(|source| {
    tokio_rusqlite::Error::Other(Box::new(RecomputeFailed { company_id, source }))
  })
}

/// Map a failed review mutation, surfacing recompute failures distinctly.
fn review_mutation_error(err: tokio_rusqlite::Error) -> Error {
  match err {
    tokio_rusqlite::Error::Other(inner) => match inner.downcast::<RecomputeFailed>() {
      Ok(failed) => {
        let RecomputeFailed { company_id, source } = *failed;
        Error::AggregateRecompute { company_id, source }
      }
      Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
    },
    other => Error::Database(other),
  }
}

fn select_review(
  conn: &rusqlite::Connection,
  id: ReviewId,
) -> rusqlite::Result<Option<RawReview>> {
  conn
    .query_row(
      &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
      rusqlite::params![id],
      RawReview::from_row,
    )
    .optional()
}

fn into_change(raw: RawReview, aggregate: RatingAggregate) -> Result<ReviewChange> {
  Ok(ReviewChange { review: raw.into_review()?, aggregate })
}

// ─── DirectoryStore impl ─────────────────────────────────────────────────────

impl DirectoryStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<Principal> {
    let now   = encode_dt(Utc::now());
    let email = input.email.clone();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![input.email],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO users (name, email, phone, password_hash, role, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            input.name,
            input.email,
            input.phone,
            input.password_hash,
            input.role.as_str(),
            now,
          ],
        )?;
        let id = tx.last_insert_rowid();
        let raw = tx.query_row(
          &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
          rusqlite::params![id],
          RawUser::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.ok_or(Error::EmailTaken(email))?.into_principal()
  }

  async fn get_user(&self, id: UserId) -> Result<Option<Principal>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id],
            RawUser::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_principal).transpose()
  }

  async fn email_exists(&self, email: &str) -> Result<bool> {
    let email = email.to_owned();
    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(()),
          )
          .optional()?
          .is_some())
      })
      .await?;
    Ok(exists)
  }

  async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>> {
    let email = email.to_owned();
    let row: Option<(RawUser, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
            rusqlite::params![email],
            |row| Ok((RawUser::from_row(row)?, row.get(8)?)),
          )
          .optional()?)
      })
      .await?;

    row
      .map(|(raw, password_hash)| {
        Ok(Credentials { principal: raw.into_principal()?, password_hash })
      })
      .transpose()
  }

  async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET last_login = ?1 WHERE id = ?2",
          rusqlite::params![at_str, id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_profile(&self, id: UserId, patch: ProfilePatch) -> Result<Option<Principal>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE users SET name = COALESCE(?1, name), phone = COALESCE(?2, phone) WHERE id = ?3",
          rusqlite::params![patch.name, patch.phone, id],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx.query_row(
          &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
          rusqlite::params![id],
          RawUser::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawUser::into_principal).transpose()
  }

  async fn list_users(&self) -> Result<Vec<Principal>> {
    let raws: Vec<RawUser> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
          .query_map([], RawUser::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_principal).collect()
  }

  async fn set_user_role(&self, id: UserId, role: Role) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET role = ?1 WHERE id = ?2",
          rusqlite::params![role.as_str(), id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn toggle_user_active(&self, id: UserId) -> Result<Option<bool>> {
    let active = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE users SET is_active = NOT is_active WHERE id = ?1",
          rusqlite::params![id],
        )?;
        let active: Option<bool> = tx
          .query_row(
            "SELECT is_active FROM users WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
          )
          .optional()?;
        tx.commit()?;
        Ok(active)
      })
      .await?;
    Ok(active)
  }

  // ── Categories ────────────────────────────────────────────────────────────

  async fn list_categories(&self) -> Result<Vec<Category>> {
    let categories = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name"
        ))?;
        let rows = stmt
          .query_map([], category_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(categories)
  }

  async fn create_category(&self, input: NewCategory) -> Result<Category> {
    let slug = input.slug.clone();
    let category: Option<Category> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM categories WHERE slug = ?1",
            rusqlite::params![input.slug],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO categories (name, slug, parent_id) VALUES (?1, ?2, ?3)",
          rusqlite::params![input.name, input.slug, input.parent_id],
        )?;
        let category = Category {
          id:        tx.last_insert_rowid(),
          name:      input.name,
          slug:      input.slug,
          parent_id: input.parent_id,
        };
        tx.commit()?;
        Ok(Some(category))
      })
      .await?;

    category.ok_or(Error::SlugTaken(slug))
  }

  async fn update_category(
    &self,
    id:    CategoryId,
    input: NewCategory,
  ) -> Result<Option<Category>> {
    let slug = input.slug.clone();
    let outcome: std::result::Result<Option<Category>, ()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let clash = tx
          .query_row(
            "SELECT 1 FROM categories WHERE slug = ?1 AND id != ?2",
            rusqlite::params![input.slug, id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if clash {
          return Ok(Err(()));
        }

        let changed = tx.execute(
          "UPDATE categories SET name = ?1, slug = ?2, parent_id = ?3 WHERE id = ?4",
          rusqlite::params![input.name, input.slug, input.parent_id, id],
        )?;
        tx.commit()?;
        Ok(Ok((changed > 0).then(|| Category {
          id,
          name: input.name,
          slug: input.slug,
          parent_id: input.parent_id,
        })))
      })
      .await?;

    outcome.map_err(|()| Error::SlugTaken(slug))
  }

  async fn delete_category(&self, id: CategoryId) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM categories WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Companies ─────────────────────────────────────────────────────────────

  async fn create_company(&self, input: NewCompany) -> Result<Company> {
    let now = encode_dt(Utc::now());

    let raw: RawCompany = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO companies (
             owner_id, category_id, name, description, city, phone, email, website,
             is_active, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
          rusqlite::params![
            input.owner_id,
            input.category_id,
            input.name,
            input.description,
            input.city,
            input.phone,
            input.email,
            input.website,
            input.is_active,
            now,
          ],
        )?;
        let id = tx.last_insert_rowid();
        let raw = tx.query_row(
          &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"),
          rusqlite::params![id],
          RawCompany::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_company()
  }

  async fn get_company(&self, id: CompanyId) -> Result<Option<Company>> {
    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"),
            rusqlite::params![id],
            RawCompany::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn list_companies(&self, query: &CompanyQuery) -> Result<Vec<Company>> {
    // Build WHERE clause dynamically; values are always bound, never inlined.
    let mut conds: Vec<String> = vec![];
    let mut values: Vec<Value> = vec![];

    if let Some(text) = &query.search {
      values.push(Value::Text(format!("%{text}%")));
      let n = values.len();
      conds.push(format!("(name LIKE ?{n} OR description LIKE ?{n})"));
    }
    if let Some(city) = &query.city {
      values.push(Value::Text(format!("%{city}%")));
      conds.push(format!("city LIKE ?{}", values.len()));
    }
    if let Some(category_id) = query.category_id {
      values.push(Value::Integer(category_id));
      let n = values.len();
      conds.push(format!(
        "(category_id = ?{n} OR category_id IN (SELECT id FROM categories WHERE parent_id = ?{n}))"
      ));
    }
    if let Some(owner_id) = query.owner_id {
      values.push(Value::Integer(owner_id));
      conds.push(format!("owner_id = ?{}", values.len()));
    }
    if let Some(active) = query.active {
      values.push(Value::Integer(i64::from(active)));
      conds.push(format!("is_active = ?{}", values.len()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    let order_by = match query.sort {
      CompanySort::Recent => "created_at DESC, id DESC",
      CompanySort::Popular => "views_count DESC, rating DESC, id DESC",
      CompanySort::Rating => "rating DESC, review_count DESC, id DESC",
    };

    values.push(Value::Integer(query.limit.unwrap_or(100) as i64));
    let limit_n = values.len();
    values.push(Value::Integer(query.offset.unwrap_or(0) as i64));
    let offset_n = values.len();

    let sql = format!(
      "SELECT {COMPANY_COLUMNS} FROM companies
       {where_clause}
       ORDER BY {order_by}
       LIMIT ?{limit_n} OFFSET ?{offset_n}"
    );

    let raws: Vec<RawCompany> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values.iter()), RawCompany::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCompany::into_company).collect()
  }

  async fn update_company(
    &self,
    id:    CompanyId,
    patch: CompanyPatch,
  ) -> Result<Option<Company>> {
    let mut sets: Vec<String> = vec![];
    let mut values: Vec<Value> = vec![];

    let mut set = |column: &str, value: Value| {
      values.push(value);
      sets.push(format!("{column} = ?{}", values.len()));
    };
    if let Some(v) = patch.owner_id { set("owner_id", Value::Integer(v)); }
    if let Some(v) = patch.category_id { set("category_id", Value::Integer(v)); }
    if let Some(v) = patch.name { set("name", Value::Text(v)); }
    if let Some(v) = patch.description { set("description", Value::Text(v)); }
    if let Some(v) = patch.city { set("city", Value::Text(v)); }
    if let Some(v) = patch.phone { set("phone", Value::Text(v)); }
    if let Some(v) = patch.email { set("email", Value::Text(v)); }
    if let Some(v) = patch.website { set("website", Value::Text(v)); }
    if let Some(v) = patch.is_active { set("is_active", Value::Integer(i64::from(v))); }
    set("updated_at", Value::Text(encode_dt(Utc::now())));

    values.push(Value::Integer(id));
    let sql = format!(
      "UPDATE companies SET {} WHERE id = ?{}",
      sets.join(", "),
      values.len()
    );

    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx.query_row(
          &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"),
          rusqlite::params![id],
          RawCompany::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn delete_company(&self, id: CompanyId) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM companies WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn record_company_view(&self, id: CompanyId, viewer: Option<UserId>) -> Result<()> {
    let at_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE companies SET views_count = views_count + 1 WHERE id = ?1",
          rusqlite::params![id],
        )?;
        if changed > 0 {
          tx.execute(
            "INSERT INTO company_views (company_id, user_id, viewed_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, viewer, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn count_company_views(&self, id: CompanyId, now: DateTime<Utc>) -> Result<ViewCounts> {
    let week  = encode_dt(now - chrono::Duration::days(7));
    let month = encode_dt(now - chrono::Duration::days(30));

    let counts = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*),
                  COUNT(*) FILTER (WHERE viewed_at >= ?2),
                  COUNT(*) FILTER (WHERE viewed_at >= ?3)
           FROM company_views WHERE company_id = ?1",
          rusqlite::params![id, week, month],
          |row| {
            Ok(ViewCounts {
              total:      row.get::<_, i64>(0)? as u64,
              this_week:  row.get::<_, i64>(1)? as u64,
              this_month: row.get::<_, i64>(2)? as u64,
            })
          },
        )?)
      })
      .await?;
    Ok(counts)
  }

  async fn list_cities(&self, limit: usize) -> Result<Vec<CityCount>> {
    let limit = limit as i64;
    let cities = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT city, COUNT(*) AS n FROM companies
           WHERE is_active = 1 AND city IS NOT NULL AND city != ''
           GROUP BY city
           ORDER BY n DESC, city ASC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(CityCount { city: row.get(0)?, count: row.get::<_, i64>(1)? as u64 })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(cities)
  }

  // ── Reviews ───────────────────────────────────────────────────────────────

  async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
    let raw = self.conn.call(move |conn| Ok(select_review(conn, id)?)).await?;
    raw.map(RawReview::into_review).transpose()
  }

  async fn find_review_by_author(
    &self,
    company_id: CompanyId,
    author_id:  UserId,
  ) -> Result<Option<Review>> {
    let raw: Option<RawReview> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {REVIEW_COLUMNS} FROM reviews WHERE company_id = ?1 AND author_id = ?2"
            ),
            rusqlite::params![company_id, author_id],
            RawReview::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawReview::into_review).transpose()
  }

  async fn list_company_reviews(
    &self,
    company_id: CompanyId,
    status:     Option<ReviewStatus>,
  ) -> Result<Vec<Review>> {
    let status_str = status.map(ReviewStatus::as_str);

    let raws: Vec<RawReview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REVIEW_COLUMNS} FROM reviews
           WHERE company_id = ?1 AND (?2 IS NULL OR status = ?2)
           ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![company_id, status_str], RawReview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReview::into_review).collect()
  }

  async fn list_reviews(&self, status: ReviewStatus, page: Page) -> Result<Vec<Review>> {
    let status_str = status.as_str();
    let limit      = page.limit as i64;
    let offset     = page.offset as i64;

    let raws: Vec<RawReview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REVIEW_COLUMNS} FROM reviews
           WHERE status = ?1
           ORDER BY created_at DESC, id DESC
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str, limit, offset], RawReview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReview::into_review).collect()
  }

  async fn insert_review(&self, input: NewReview, status: ReviewStatus) -> Result<ReviewChange> {
    let rating = u8::try_from(input.rating)
      .map_err(|_| hal_core::Error::InvalidRating(input.rating))?;
    let created_at = encode_dt(Utc::now());
    let status_str = status.as_str();
    let (company_id, author_id) = (input.company_id, input.author_id);

    let (raw, aggregate) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO reviews (company_id, author_id, author_name, rating, comment, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            input.company_id,
            input.author_id,
            input.author_name,
            rating,
            input.comment,
            status_str,
            created_at,
          ],
        )?;
        let id = tx.last_insert_rowid();
        let raw = select_review(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let aggregate = recompute_rating(&tx, input.company_id)?;
        tx.commit()?;
        Ok((raw, aggregate))
      })
      .await
      .map_err(|e| match review_mutation_error(e) {
        e if e.constraint() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => {
          Error::Core(hal_core::Error::DuplicateReview { company_id, author_id })
        }
        e => e,
      })?;

    into_change(raw, aggregate)
  }

  async fn moderate_review(
    &self,
    id:         ReviewId,
    moderation: Moderation,
  ) -> Result<Option<ReviewChange>> {
    let status_str = moderation.status.as_str();
    let at_str     = encode_dt(moderation.at);

    let outcome: Option<(RawReview, RatingAggregate)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE reviews
           SET status = ?1, moderated_by = ?2, moderated_at = ?3, moderation_note = ?4
           WHERE id = ?5",
          rusqlite::params![status_str, moderation.moderated_by, at_str, moderation.note, id],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = select_review(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let aggregate = recompute_rating(&tx, raw.company_id)?;
        tx.commit()?;
        Ok(Some((raw, aggregate)))
      })
      .await
      .map_err(review_mutation_error)?;

    outcome.map(|(raw, aggregate)| into_change(raw, aggregate)).transpose()
  }

  async fn delete_review(&self, id: ReviewId) -> Result<Option<ReviewChange>> {
    let outcome: Option<(RawReview, RatingAggregate)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(raw) = select_review(&tx, id)? else {
          return Ok(None);
        };
        tx.execute("DELETE FROM reviews WHERE id = ?1", rusqlite::params![id])?;
        // Runs even when the review was never approved, confirming the
        // stored aggregate.
        let aggregate = recompute_rating(&tx, raw.company_id)?;
        tx.commit()?;
        Ok(Some((raw, aggregate)))
      })
      .await
      .map_err(review_mutation_error)?;

    outcome.map(|(raw, aggregate)| into_change(raw, aggregate)).transpose()
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
    let details_str = entry.details.as_ref().map(serde_json::to_string).transpose()?;
    let created_at  = Utc::now();
    let at_str      = encode_dt(created_at);
    let action_str  = entry.action.as_str();
    let entity_str  = entry.entity.as_str();
    let ip_address  = entry.ip_address.clone();
    let actor_id    = entry.actor_id;
    let entity_id   = entry.entity_id;

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO admin_logs (user_id, action, entity_type, entity_id, details, ip_address, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            actor_id,
            action_str,
            entity_str,
            entity_id,
            details_str,
            ip_address,
            at_str,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(AuditEntry {
      id,
      actor_id,
      action:      entry.action,
      entity_type: entity_str.to_owned(),
      entity_id,
      details:     entry.details,
      ip_address:  entry.ip_address,
      created_at,
    })
  }

  async fn list_audit(&self, page: Page) -> Result<Vec<AuditEntry>> {
    let limit  = page.limit as i64;
    let offset = page.offset as i64;

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM admin_logs
           ORDER BY created_at DESC, id DESC
           LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawAudit::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_entry).collect()
  }

  // ── Settings & stats ──────────────────────────────────────────────────────

  async fn get_settings(&self) -> Result<BTreeMap<String, String>> {
    let settings = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT setting_key, setting_value FROM site_settings")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(settings)
  }

  async fn update_settings(&self, values: BTreeMap<String, String>) -> Result<usize> {
    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        for (key, value) in &values {
          changed += tx.execute(
            "UPDATE site_settings SET setting_value = ?1 WHERE setting_key = ?2",
            rusqlite::params![value, key],
          )?;
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed)
  }

  async fn stats(&self) -> Result<DirectoryStats> {
    let stats = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM users),
             (SELECT COUNT(*) FROM companies),
             (SELECT COUNT(*) FROM companies WHERE is_active = 1),
             (SELECT COUNT(*) FROM reviews),
             (SELECT COUNT(*) FROM reviews WHERE status = 'pending')",
          [],
          |row| {
            Ok(DirectoryStats {
              users:            row.get::<_, i64>(0)? as u64,
              companies:        row.get::<_, i64>(1)? as u64,
              active_companies: row.get::<_, i64>(2)? as u64,
              reviews:          row.get::<_, i64>(3)? as u64,
              pending_reviews:  row.get::<_, i64>(4)? as u64,
            })
          },
        )?)
      })
      .await?;
    Ok(stats)
  }
}
