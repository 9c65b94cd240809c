//! SQL schema for the HAL SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS` / `OR IGNORE`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user',   -- 'user' | 'analyst' | 'admin'
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,                  -- RFC 3339 UTC
    last_login    TEXT
);

CREATE TABLE IF NOT EXISTS categories (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    slug      TEXT NOT NULL UNIQUE,
    parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL
);

-- rating / review_count are derived from approved reviews and only written
-- by the review mutations in the same transaction as the review change.
CREATE TABLE IF NOT EXISTS companies (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id     INTEGER REFERENCES users(id) ON DELETE SET NULL,
    category_id  INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    name         TEXT NOT NULL,
    description  TEXT,
    city         TEXT,
    phone        TEXT,
    email        TEXT,
    website      TEXT,
    is_active    INTEGER NOT NULL DEFAULT 1,
    rating       REAL NOT NULL DEFAULT 0,
    review_count INTEGER NOT NULL DEFAULT 0,
    views_count  INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS company_views (
    company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    user_id    INTEGER REFERENCES users(id) ON DELETE SET NULL,
    viewed_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reviews (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id      INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    author_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    author_name     TEXT NOT NULL,
    rating          INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    comment         TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'approved' | 'rejected'
    moderated_by    INTEGER REFERENCES users(id) ON DELETE SET NULL,
    moderated_at    TEXT,
    moderation_note TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (company_id, author_id)
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS admin_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    action      TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   INTEGER,
    details     TEXT,             -- JSON or NULL
    ip_address  TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS site_settings (
    setting_key   TEXT PRIMARY KEY,
    setting_value TEXT NOT NULL,
    description   TEXT
);

INSERT OR IGNORE INTO site_settings (setting_key, setting_value, description) VALUES
    ('site_name',        'HAL',  'Public site title'),
    ('contact_email',    '',     'Address shown on the contact page'),
    ('companies_per_page', '20', 'Catalog page size');

CREATE INDEX IF NOT EXISTS companies_owner_idx   ON companies(owner_id);
CREATE INDEX IF NOT EXISTS reviews_company_idx   ON reviews(company_id, status);
CREATE INDEX IF NOT EXISTS reviews_status_idx    ON reviews(status, created_at);
CREATE INDEX IF NOT EXISTS admin_logs_created_idx ON admin_logs(created_at);

PRAGMA user_version = 1;
";
