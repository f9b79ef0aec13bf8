//! Error type for `qms-store-sqlite`.

use qms_core::ProviderCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("a user with email {0:?} already exists")]
  UserExists(String),

  #[error("invalid email or password")]
  InvalidCredentials,

  /// The bearer token is unknown, revoked or past its expiry.
  #[error("session token expired or revoked")]
  TokenExpired,

  #[error("profile not found: {0}")]
  ProfileNotFound(uuid::Uuid),

  #[error("company not found: {0}")]
  CompanyNotFound(uuid::Uuid),

  #[error("company slug {0:?} is already taken")]
  SlugTaken(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for qms_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::UserExists(_) => Self::provider(ProviderCode::UserExists, err.to_string()),
      Error::InvalidCredentials => {
        Self::provider(ProviderCode::InvalidCredentials, err.to_string())
      }
      Error::TokenExpired => Self::provider(ProviderCode::TokenExpired, err.to_string()),
      Error::ProfileNotFound(id) => Self::ProfileNotFound(id),
      other => Self::backend(other),
    }
  }
}
