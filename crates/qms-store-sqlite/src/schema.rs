//! SQL schema for the QMS SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,   -- trimmed, lowercase
    password_hash TEXT NOT NULL,          -- argon2 PHC string
    created_at    TEXT NOT NULL
);

-- Opaque bearer tokens. Only the SHA-256 digest is stored.
CREATE TABLE IF NOT EXISTS auth_sessions (
    session_id  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(user_id),
    token_hash  TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    revoked_at  TEXT
);

CREATE TABLE IF NOT EXISTS companies (
    company_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    active      INTEGER NOT NULL DEFAULT 1,
    modules     TEXT NOT NULL DEFAULT '[]'   -- JSON array of module names
);

-- One profile per user, keyed by the user id.
CREATE TABLE IF NOT EXISTS profiles (
    profile_id       TEXT PRIMARY KEY REFERENCES users(user_id),
    email            TEXT NOT NULL,
    first_name       TEXT,
    last_name        TEXT,
    company_id       TEXT REFERENCES companies(company_id),
    is_super_admin   INTEGER NOT NULL DEFAULT 0,
    is_company_admin INTEGER NOT NULL DEFAULT 0,
    is_active        INTEGER NOT NULL DEFAULT 1,
    last_login       TEXT
);

CREATE INDEX IF NOT EXISTS auth_sessions_user_idx ON auth_sessions(user_id);
CREATE INDEX IF NOT EXISTS profiles_company_idx   ON profiles(company_id);

PRAGMA user_version = 1;
";
