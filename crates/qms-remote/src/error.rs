//! Error type for `qms-remote`.

use qms_core::ProviderCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The request never produced a response, or its body could not be read.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The service answered with a non-success status.
  #[error("{operation} failed ({status}): {message}")]
  Status {
    operation: &'static str,
    status:    u16,
    /// Machine-readable code from the error body, if any.
    code:      Option<String>,
    message:   String,
  },

  /// The refresh token was refused; the session cannot be renewed.
  #[error("refresh token rejected: {0}")]
  RefreshRejected(String),

  #[error("unexpected response from {operation}: {detail}")]
  Unexpected {
    operation: &'static str,
    detail:    String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The shapes error bodies come in across the auth and table APIs.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
  #[serde(default)]
  error_code:        Option<String>,
  #[serde(default)]
  error:             Option<String>,
  #[serde(default)]
  msg:               Option<String>,
  #[serde(default)]
  message:           Option<String>,
  #[serde(default)]
  error_description: Option<String>,
}

impl Error {
  /// Build a [`Error::Status`] from a failed response body.
  pub(crate) fn from_body(operation: &'static str, status: u16, body: &str) -> Self {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or(parsed.error);
    let message = parsed
      .msg
      .or(parsed.message)
      .or(parsed.error_description)
      .unwrap_or_else(|| body.trim().to_owned());
    Self::Status {
      operation,
      status,
      code,
      message,
    }
  }

  pub fn provider_code(&self) -> ProviderCode {
    match self {
      Self::Http(err) if err.is_decode() => ProviderCode::Unexpected,
      Self::Http(_) => ProviderCode::Network,
      Self::RefreshRejected(_) => ProviderCode::TokenExpired,
      Self::Unexpected { .. } => ProviderCode::Unexpected,
      Self::Status { status, code, .. } => match (code.as_deref(), *status) {
        (Some("user_already_exists" | "email_exists"), _) => ProviderCode::UserExists,
        (Some("email_not_confirmed"), _) => ProviderCode::EmailNotConfirmed,
        (Some("invalid_grant" | "invalid_credentials"), _) => {
          ProviderCode::InvalidCredentials
        }
        (_, 429) => ProviderCode::RateLimited,
        (_, 401 | 403) => ProviderCode::TokenExpired,
        _ => ProviderCode::Unexpected,
      },
    }
  }
}

impl From<Error> for qms_core::Error {
  fn from(err: Error) -> Self { Self::provider(err.provider_code(), err.to_string()) }
}
