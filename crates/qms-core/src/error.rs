//! Error types for `qms-core`.
//!
//! Every backend maps its own failures into [`Error`] so the session layer can
//! classify them without knowing which backend produced them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Machine-readable reason attached to an identity-provider failure.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderCode {
  InvalidCredentials,
  /// The access token (or the session behind it) is expired or revoked.
  TokenExpired,
  UserExists,
  EmailNotConfirmed,
  RateLimited,
  /// The provider could not be reached at all.
  Network,
  Unexpected,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("email and password are required")]
  MissingCredentials,

  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),

  #[error("identity provider error ({code}): {message}")]
  Provider { code: ProviderCode, message: String },

  #[error("no profile found for user {0}")]
  ProfileNotFound(Uuid),

  #[error("profile {0} is inactive")]
  ProfileInactive(Uuid),

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used by the retry escalator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Rejected locally before any network call.
  Validation,
  /// Transient; retried a bounded number of times.
  TokenExpired,
  /// Fatal account state (missing or inactive profile); never retried.
  AccountState,
  Other,
}

impl Error {
  pub fn provider(code: ProviderCode, message: impl Into<String>) -> Self {
    Self::Provider {
      code,
      message: message.into(),
    }
  }

  pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Backend(Box::new(err))
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      Self::MissingCredentials | Self::InvalidEmail(_) => ErrorClass::Validation,
      Self::Provider {
        code: ProviderCode::TokenExpired,
        ..
      } => ErrorClass::TokenExpired,
      Self::ProfileNotFound(_) | Self::ProfileInactive(_) => {
        ErrorClass::AccountState
      }
      Self::Provider { .. } | Self::Backend(_) => ErrorClass::Other,
    }
  }

  pub fn is_token_expired(&self) -> bool {
    self.class() == ErrorClass::TokenExpired
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
