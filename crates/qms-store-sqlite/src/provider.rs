//! [`SqliteIdentityProvider`]: a local identity provider over [`SqliteStore`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use qms_core::{
  backend::IdentityProvider,
  clock::{Clock, SystemClock},
  identity::{AuthEvent, Identity, SignUpMetadata},
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{Error, SqliteStore};

const EVENT_CAPACITY: usize = 16;

/// Holds at most one bearer token at a time, the way a client SDK would.
///
/// The token can be exported with [`Self::token`] and handed back with
/// [`Self::restore`] so a session survives process restarts.
#[derive(Clone)]
pub struct SqliteIdentityProvider {
  store:          SqliteStore,
  token:          Arc<Mutex<Option<String>>>,
  events:         broadcast::Sender<AuthEvent>,
  clock:          Arc<dyn Clock>,
  token_lifetime: Duration,
}

impl SqliteIdentityProvider {
  pub fn new(store: SqliteStore) -> Self { Self::with_clock(store, SystemClock) }

  pub fn with_clock(store: SqliteStore, clock: impl Clock) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      store,
      token: Arc::default(),
      events,
      clock: Arc::new(clock),
      token_lifetime: Duration::hours(24),
    }
  }

  /// How long issued tokens stay valid. Defaults to 24 hours.
  pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
    self.token_lifetime = lifetime;
    self
  }

  pub fn store(&self) -> &SqliteStore { &self.store }

  /// The current bearer token, if signed in.
  pub fn token(&self) -> Option<String> { self.slot().clone() }

  /// Adopt a previously exported token. It is checked on the next call.
  pub fn restore(&self, token: impl Into<String>) { *self.slot() = Some(token.into()); }

  fn slot(&self) -> MutexGuard<'_, Option<String>> {
    self.token.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: AuthEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }
}

impl IdentityProvider for SqliteIdentityProvider {
  /// A held token that no longer resolves is reported as expired rather than
  /// silently dropped.
  async fn get_session(&self) -> qms_core::Result<Option<Identity>> {
    let Some(token) = self.token() else {
      return Ok(None);
    };
    match self.store.resolve_session(&token, self.clock.now()).await? {
      Some(identity) => Ok(Some(identity)),
      None => Err(Error::TokenExpired.into()),
    }
  }

  async fn get_user(&self) -> qms_core::Result<Option<Identity>> {
    let Some(token) = self.token() else {
      return Ok(None);
    };
    Ok(self.store.resolve_session(&token, self.clock.now()).await?)
  }

  async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str,
  ) -> qms_core::Result<Identity> {
    let identity = self.store.authenticate(email, password).await?;
    let token = self
      .store
      .issue_session(identity.id, self.clock.now(), self.token_lifetime)
      .await?;
    *self.slot() = Some(token);

    info!(user = %identity.id, "local session issued");
    self.emit(AuthEvent::SignedIn(identity.clone()));
    Ok(identity)
  }

  async fn sign_up(
    &self,
    email: &str,
    password: &str,
    metadata: &SignUpMetadata,
  ) -> qms_core::Result<Identity> {
    let identity = self.store.create_user(email, password, metadata).await?;
    info!(user = %identity.id, "local user registered");
    Ok(identity)
  }

  async fn sign_out(&self) -> qms_core::Result<()> {
    let held = self.slot().take();
    let Some(token) = held else {
      debug!("sign-out without a token");
      return Ok(());
    };
    let revoked = self.store.revoke_session(&token, self.clock.now()).await?;
    debug!(revoked, "local session ended");
    self.emit(AuthEvent::SignedOut);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }
}
