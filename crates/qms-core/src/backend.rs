//! Backend traits consumed by the session lifecycle manager.
//!
//! Implemented by `qms-store-sqlite` (local reference backend) and
//! `qms-remote` (the hosted identity service and table API). The session
//! layer depends on these abstractions only.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Result,
  company::Company,
  identity::{AuthEvent, Identity, SignUpMetadata},
  profile::Profile,
};

/// The external identity provider.
///
/// Implementations hold their own credentials (tokens) between calls; the
/// session layer only sees [`Identity`] values.
pub trait IdentityProvider: Send + Sync {
  /// The locally known session, refreshed if the provider supports it.
  /// `None` when nobody is signed in.
  fn get_session(
    &self,
  ) -> impl Future<Output = Result<Option<Identity>>> + Send + '_;

  /// Ask the provider to confirm the current session server-side.
  fn get_user(&self) -> impl Future<Output = Result<Option<Identity>>> + Send + '_;

  fn sign_in_with_password<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Identity>> + Send + 'a;

  fn sign_up<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
    metadata: &'a SignUpMetadata,
  ) -> impl Future<Output = Result<Identity>> + Send + 'a;

  /// End the session. Local credentials are dropped even if the remote call
  /// fails.
  fn sign_out(&self) -> impl Future<Output = Result<()>> + Send + '_;

  /// Subscribe to auth-state changes. Dropping the receiver unsubscribes.
  fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Read access to user profiles.
pub trait ProfileStore: Send + Sync {
  /// Fetch the profile keyed by an identity id. Inactive profiles are
  /// returned as-is; rejecting them is the caller's job.
  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>>> + Send + '_;

  fn touch_last_login(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}

/// Read access to companies (tenants).
pub trait TenantStore: Send + Sync {
  /// Fetch a company only if it is active. A miss is `Ok(None)`.
  fn get_active_company(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Company>>> + Send + '_;
}
