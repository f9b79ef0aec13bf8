//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! company module lists compact JSON arrays.

use chrono::{DateTime, Utc};
use qms_core::{company::Company, identity::Identity, profile::Profile};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Email ───────────────────────────────────────────────────────────────────

/// Emails are compared case-insensitively and without surrounding blanks.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

// ─── Modules ─────────────────────────────────────────────────────────────────

pub fn encode_modules(modules: &[String]) -> Result<String> {
  Ok(serde_json::to_string(modules)?)
}

pub fn decode_modules(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawIdentity {
  pub user_id: String,
  pub email:   String,
}

impl RawIdentity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id: row.get(0)?,
      email:   row.get(1)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      id:    decode_uuid(&self.user_id)?,
      email: self.email,
    })
  }
}

/// Column order of [`PROFILE_COLUMNS`].
pub struct RawProfile {
  pub profile_id:       String,
  pub email:            String,
  pub first_name:       Option<String>,
  pub last_name:        Option<String>,
  pub company_id:       Option<String>,
  pub is_super_admin:   bool,
  pub is_company_admin: bool,
  pub is_active:        bool,
  pub last_login:       Option<String>,
}

pub const PROFILE_COLUMNS: &str = "profile_id, email, first_name, last_name, company_id, \
                                   is_super_admin, is_company_admin, is_active, last_login";

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      profile_id:       row.get(0)?,
      email:            row.get(1)?,
      first_name:       row.get(2)?,
      last_name:        row.get(3)?,
      company_id:       row.get(4)?,
      is_super_admin:   row.get(5)?,
      is_company_admin: row.get(6)?,
      is_active:        row.get(7)?,
      last_login:       row.get(8)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:               decode_uuid(&self.profile_id)?,
      email:            self.email,
      first_name:       self.first_name,
      last_name:        self.last_name,
      company_id:       self.company_id.as_deref().map(decode_uuid).transpose()?,
      is_super_admin:   self.is_super_admin,
      is_company_admin: self.is_company_admin,
      is_active:        self.is_active,
      last_login:       self.last_login.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Column order of [`COMPANY_COLUMNS`].
pub struct RawCompany {
  pub company_id: String,
  pub name:       String,
  pub slug:       String,
  pub active:     bool,
  pub modules:    String,
}

pub const COMPANY_COLUMNS: &str = "company_id, name, slug, active, modules";

impl RawCompany {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      company_id: row.get(0)?,
      name:       row.get(1)?,
      slug:       row.get(2)?,
      active:     row.get(3)?,
      modules:    row.get(4)?,
    })
  }

  pub fn into_company(self) -> Result<Company> {
    Ok(Company {
      id:      decode_uuid(&self.company_id)?,
      name:    self.name,
      slug:    self.slug,
      active:  self.active,
      modules: decode_modules(&self.modules)?,
    })
  }
}
