//! [`SqliteStore`]: users, bearer sessions, profiles and companies.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use qms_core::{
  backend::{ProfileStore, TenantStore},
  company::Company,
  identity::{Identity, SignUpMetadata},
  profile::Profile,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    COMPANY_COLUMNS, PROFILE_COLUMNS, RawCompany, RawIdentity, RawProfile, decode_dt,
    encode_dt, encode_modules, encode_uuid, normalize_email,
  },
  schema::SCHEMA,
  token,
};

/// Input for [`SqliteStore::create_company`].
#[derive(Debug, Clone)]
pub struct NewCompany {
  pub name:    String,
  pub slug:    String,
  pub modules: Vec<String>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The local QMS backend, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
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

  /// Open an in-memory store, mostly for tests.
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

  // ── Users ─────────────────────────────────────────────────────────────────

  /// Register a user and create their active profile from `metadata`.
  ///
  /// The email is stored trimmed and lowercased; a second registration with
  /// the same address fails with [`Error::UserExists`].
  pub async fn create_user(
    &self,
    email: &str,
    password: &str,
    metadata: &SignUpMetadata,
  ) -> Result<Identity> {
    let identity = Identity {
      id:    Uuid::new_v4(),
      email: normalize_email(email),
    };
    let password_hash = token::hash_password(password)?;

    let id_str = encode_uuid(identity.id);
    let email_str = identity.email.clone();
    let created_at = encode_dt(Utc::now());
    let first_name = metadata.first_name.clone();
    let last_name = metadata.last_name.clone();
    let company_str = metadata.company_id.map(encode_uuid);

    // (email taken, company missing)
    let (taken, missing_company) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken = tx
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![email_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok((true, false));
        }

        if let Some(company) = &company_str {
          let exists = tx
            .query_row(
              "SELECT 1 FROM companies WHERE company_id = ?1",
              rusqlite::params![company],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !exists {
            return Ok((false, true));
          }
        }

        tx.execute(
          "INSERT INTO users (user_id, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, email_str, password_hash, created_at],
        )?;
        tx.execute(
          "INSERT INTO profiles (profile_id, email, first_name, last_name, company_id)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, email_str, first_name, last_name, company_str],
        )?;
        tx.commit()?;
        Ok((false, false))
      })
      .await?;

    if taken {
      return Err(Error::UserExists(identity.email));
    }
    if missing_company && let Some(company_id) = metadata.company_id {
      return Err(Error::CompanyNotFound(company_id));
    }
    Ok(identity)
  }

  pub async fn find_user(&self, email: &str) -> Result<Option<Identity>> {
    let email = normalize_email(email);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, email FROM users WHERE email = ?1",
              rusqlite::params![email],
              RawIdentity::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawIdentity::into_identity).transpose()
  }

  /// Check a password. Unknown email and wrong password are
  /// indistinguishable to the caller.
  pub async fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
    let email = normalize_email(email);
    let row: Option<(RawIdentity, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, email, password_hash FROM users WHERE email = ?1",
              rusqlite::params![email],
              |r| Ok((RawIdentity::from_row(r)?, r.get(2)?)),
            )
            .optional()?,
        )
      })
      .await?;

    match row {
      Some((raw, phc)) if token::verify_password(password, &phc) => raw.into_identity(),
      _ => Err(Error::InvalidCredentials),
    }
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Start a session for `user_id` and return its bearer token. Only the
  /// token's digest is persisted.
  pub async fn issue_session(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
    lifetime: Duration,
  ) -> Result<String> {
    let token = token::generate();
    let digest = token::digest(&token);
    let session_id = encode_uuid(Uuid::new_v4());
    let user_str = encode_uuid(user_id);
    let created_at = encode_dt(now);
    let expires_at = encode_dt(now + lifetime);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO auth_sessions (session_id, user_id, token_hash, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![session_id, user_str, digest, created_at, expires_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(token)
  }

  /// The user behind `token`, or `None` when the token is unknown, revoked
  /// or expired at `now`.
  pub async fn resolve_session(
    &self,
    token: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<Identity>> {
    let digest = token::digest(token);
    let row: Option<(RawIdentity, String, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT u.user_id, u.email, s.expires_at, s.revoked_at
               FROM auth_sessions s JOIN users u ON u.user_id = s.user_id
               WHERE s.token_hash = ?1",
              rusqlite::params![digest],
              |r| Ok((RawIdentity::from_row(r)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((raw, expires_at, revoked_at)) = row else {
      return Ok(None);
    };
    if revoked_at.is_some() || decode_dt(&expires_at)? <= now {
      return Ok(None);
    }
    raw.into_identity().map(Some)
  }

  /// Revoke `token`. Returns whether a live session was revoked; revoking
  /// twice is harmless.
  pub async fn revoke_session(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
    let digest = token::digest(token);
    let revoked_at = encode_dt(now);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE auth_sessions SET revoked_at = ?1
           WHERE token_hash = ?2 AND revoked_at IS NULL",
          rusqlite::params![revoked_at, digest],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Profiles ──────────────────────────────────────────────────────────────

  pub async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE profile_id = ?1"),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  pub async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let at = encode_dt(at);
    self
      .update_profile(id, move |conn, id_str| {
        conn.execute(
          "UPDATE profiles SET last_login = ?1 WHERE profile_id = ?2",
          rusqlite::params![at, id_str],
        )
      })
      .await
  }

  pub async fn set_profile_active(&self, id: Uuid, active: bool) -> Result<()> {
    self
      .update_profile(id, move |conn, id_str| {
        conn.execute(
          "UPDATE profiles SET is_active = ?1 WHERE profile_id = ?2",
          rusqlite::params![active, id_str],
        )
      })
      .await
  }

  pub async fn set_roles(
    &self,
    id: Uuid,
    is_super_admin: bool,
    is_company_admin: bool,
  ) -> Result<()> {
    self
      .update_profile(id, move |conn, id_str| {
        conn.execute(
          "UPDATE profiles SET is_super_admin = ?1, is_company_admin = ?2
           WHERE profile_id = ?3",
          rusqlite::params![is_super_admin, is_company_admin, id_str],
        )
      })
      .await
  }

  /// Move a profile to `company` (or detach it with `None`).
  pub async fn assign_company(&self, id: Uuid, company: Option<Uuid>) -> Result<()> {
    if let Some(company_id) = company
      && self.company(company_id).await?.is_none()
    {
      return Err(Error::CompanyNotFound(company_id));
    }
    let company_str = company.map(encode_uuid);
    self
      .update_profile(id, move |conn, id_str| {
        conn.execute(
          "UPDATE profiles SET company_id = ?1 WHERE profile_id = ?2",
          rusqlite::params![company_str, id_str],
        )
      })
      .await
  }

  /// Run a single-row profile update; zero affected rows is
  /// [`Error::ProfileNotFound`].
  async fn update_profile<F>(&self, id: Uuid, f: F) -> Result<()>
  where
    F: FnOnce(&rusqlite::Connection, &str) -> rusqlite::Result<usize> + Send + 'static,
  {
    let id_str = encode_uuid(id);
    let changed = self.conn.call(move |conn| Ok(f(conn, &id_str)?)).await?;
    if changed == 0 {
      return Err(Error::ProfileNotFound(id));
    }
    Ok(())
  }

  // ── Companies ─────────────────────────────────────────────────────────────

  pub async fn create_company(&self, new: NewCompany) -> Result<Company> {
    let company = Company {
      id:      Uuid::new_v4(),
      name:    new.name,
      slug:    new.slug.trim().to_lowercase(),
      active:  true,
      modules: new.modules,
    };

    let id_str = encode_uuid(company.id);
    let name = company.name.clone();
    let slug = company.slug.clone();
    let modules = encode_modules(&company.modules)?;

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO companies (company_id, name, slug, active, modules)
           VALUES (?1, ?2, ?3, 1, ?4)
           ON CONFLICT (slug) DO NOTHING",
          rusqlite::params![id_str, name, slug, modules],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::SlugTaken(company.slug));
    }
    Ok(company)
  }

  /// A company regardless of its `active` flag.
  pub async fn company(&self, id: Uuid) -> Result<Option<Company>> {
    self.select_company(id, false).await
  }

  pub async fn active_company(&self, id: Uuid) -> Result<Option<Company>> {
    self.select_company(id, true).await
  }

  async fn select_company(&self, id: Uuid, active_only: bool) -> Result<Option<Company>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {COMPANY_COLUMNS} FROM companies
                 WHERE company_id = ?1 AND (active = 1 OR ?2 = 0)"
              ),
              rusqlite::params![id_str, active_only],
              RawCompany::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCompany::into_company).transpose()
  }

  pub async fn set_company_active(&self, id: Uuid, active: bool) -> Result<()> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE companies SET active = ?1 WHERE company_id = ?2",
          rusqlite::params![active, id_str],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::CompanyNotFound(id));
    }
    Ok(())
  }
}

// ─── Backend traits ──────────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  async fn get_profile(&self, id: Uuid) -> qms_core::Result<Option<Profile>> {
    Ok(self.profile(id).await?)
  }

  async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> qms_core::Result<()> {
    Ok(self.record_login(id, at).await?)
  }
}

impl TenantStore for SqliteStore {
  async fn get_active_company(&self, id: Uuid) -> qms_core::Result<Option<Company>> {
    Ok(self.active_company(id).await?)
  }
}
