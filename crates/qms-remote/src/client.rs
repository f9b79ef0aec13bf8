//! [`RemoteClient`]: the auth half of the hosted backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qms_core::{
  backend::IdentityProvider,
  clock::{Clock, SystemClock},
  identity::{AuthEvent, Identity, SignUpMetadata},
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::{self, broadcast};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::RemoteConfig,
  wire::{
    PasswordGrant, RefreshGrant, SignUpRequest, SignUpResponse, StoredSession, TokenResponse,
    UserBody,
  },
};

const EVENT_CAPACITY: usize = 16;

struct Inner {
  http:    Client,
  config:  RemoteConfig,
  clock:   Arc<dyn Clock>,
  session: Mutex<Option<StoredSession>>,
  /// Held for the whole refresh round-trip; refresh tokens are single use.
  refresh: sync::Mutex<()>,
  events:  broadcast::Sender<AuthEvent>,
}

/// Async HTTP client for the hosted auth and table APIs.
///
/// Cheap to clone; clones share the same session. One value serves as the
/// identity provider, profile store and tenant store of a session manager.
#[derive(Clone)]
pub struct RemoteClient {
  inner: Arc<Inner>,
}

impl RemoteClient {
  pub fn new(config: RemoteConfig) -> Result<Self> { Self::with_clock(config, SystemClock) }

  pub fn with_clock(config: RemoteConfig, clock: impl Clock) -> Result<Self> {
    let http = Client::builder().timeout(config.timeout()).build()?;
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Ok(Self {
      inner: Arc::new(Inner {
        http,
        config,
        clock: Arc::new(clock),
        session: Mutex::new(None),
        refresh: sync::Mutex::new(()),
        events,
      }),
    })
  }

  pub fn config(&self) -> &RemoteConfig { &self.inner.config }

  // ── Session persistence ───────────────────────────────────────────────────

  /// The current token pair, for persisting between runs.
  pub fn export_session(&self) -> Option<StoredSession> { self.slot().clone() }

  /// Adopt a previously exported token pair. Nothing is checked until the
  /// next call; an expired access token is refreshed then.
  pub fn restore_session(&self, session: StoredSession) {
    debug!(user = %session.user.id, "session restored");
    *self.slot() = Some(session);
  }

  fn slot(&self) -> MutexGuard<'_, Option<StoredSession>> {
    self
      .inner
      .session
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: AuthEvent) {
    // No subscribers is fine.
    let _ = self.inner.events.send(event);
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
    self
      .inner
      .http
      .request(method, self.inner.config.endpoint(path))
      .header("apikey", &self.inner.config.api_key)
  }

  /// Attach the bearer token: the user's access token when signed in, the
  /// API key otherwise.
  pub(crate) async fn authorized(
    &self,
    method: reqwest::Method,
    path: &str,
  ) -> Result<RequestBuilder> {
    let bearer = match self.access_token().await? {
      Some(token) => token,
      None => self.inner.config.api_key.clone(),
    };
    Ok(self.request(method, path).bearer_auth(bearer))
  }

  /// Return the response on success, or the service's error otherwise.
  pub(crate) async fn check(operation: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::from_body(operation, status.as_u16(), &body))
  }

  pub(crate) async fn json<T: DeserializeOwned>(
    operation: &'static str,
    resp: Response,
  ) -> Result<T> {
    let resp = Self::check(operation, resp).await?;
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| Error::Unexpected {
      operation,
      detail: e.to_string(),
    })
  }

  // ── Tokens ────────────────────────────────────────────────────────────────

  /// A usable access token, refreshing it first when it is about to expire.
  /// `None` when signed out.
  async fn access_token(&self) -> Result<Option<String>> {
    Ok(self.current_session().await?.map(|s| s.access_token))
  }

  async fn current_session(&self) -> Result<Option<StoredSession>> {
    let margin = self.inner.config.refresh_margin();
    let held = self.slot().clone();
    match held {
      None => return Ok(None),
      Some(session) if !session.needs_refresh(self.inner.clock.now(), margin) => {
        return Ok(Some(session));
      }
      Some(_) => {}
    }

    let _refreshing = self.inner.refresh.lock().await;
    // Another caller may have refreshed while this one waited.
    let held = self.slot().clone();
    match held {
      None => Ok(None),
      Some(session) if !session.needs_refresh(self.inner.clock.now(), margin) => {
        Ok(Some(session))
      }
      Some(stale) => self.refresh(&stale).await.map(Some),
    }
  }

  /// Trade the refresh token for a new pair. A refused refresh token keeps
  /// the stale session so that a later sign-out can still revoke it.
  async fn refresh(&self, stale: &StoredSession) -> Result<StoredSession> {
    debug!(user = %stale.user.id, "refreshing access token");
    let resp = self
      .request(reqwest::Method::POST, "/auth/v1/token")
      .query(&[("grant_type", "refresh_token")])
      .json(&RefreshGrant {
        refresh_token: &stale.refresh_token,
      })
      .send()
      .await?;

    let token: TokenResponse = match Self::json("token refresh", resp).await {
      Ok(token) => token,
      Err(Error::Status { status, message, .. }) if status < 500 => {
        warn!(user = %stale.user.id, status, "refresh token rejected");
        return Err(Error::RefreshRejected(message));
      }
      Err(err) => return Err(err),
    };

    let fresh = token.into_session(self.inner.clock.now());
    *self.slot() = Some(fresh.clone());
    info!(user = %fresh.user.id, expires_at = %fresh.expires_at, "access token refreshed");
    self.emit(AuthEvent::TokenRefreshed(fresh.user.clone()));
    Ok(fresh)
  }

  fn adopt(&self, token: TokenResponse) -> Identity {
    let session = token.into_session(self.inner.clock.now());
    let identity = session.user.clone();
    *self.slot() = Some(session);
    identity
  }
}

// ─── IdentityProvider ────────────────────────────────────────────────────────

impl IdentityProvider for RemoteClient {
  async fn get_session(&self) -> qms_core::Result<Option<Identity>> {
    Ok(self.current_session().await?.map(|s| s.user))
  }

  /// `GET /auth/v1/user`
  async fn get_user(&self) -> qms_core::Result<Option<Identity>> {
    let Some(token) = self.access_token().await? else {
      return Ok(None);
    };
    let resp = self
      .request(reqwest::Method::GET, "/auth/v1/user")
      .bearer_auth(token)
      .send()
      .await
      .map_err(Error::from)?;
    let user: UserBody = Self::json("get user", resp).await?;
    Ok(Some(user.into_identity()))
  }

  /// `POST /auth/v1/token?grant_type=password`
  async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str,
  ) -> qms_core::Result<Identity> {
    let resp = self
      .request(reqwest::Method::POST, "/auth/v1/token")
      .query(&[("grant_type", "password")])
      .json(&PasswordGrant { email, password })
      .send()
      .await
      .map_err(Error::from)?;
    let token: TokenResponse = Self::json("sign in", resp).await?;

    let identity = self.adopt(token);
    info!(user = %identity.id, "signed in remotely");
    self.emit(AuthEvent::SignedIn(identity.clone()));
    Ok(identity)
  }

  /// `POST /auth/v1/signup`
  async fn sign_up(
    &self,
    email: &str,
    password: &str,
    metadata: &SignUpMetadata,
  ) -> qms_core::Result<Identity> {
    let resp = self
      .request(reqwest::Method::POST, "/auth/v1/signup")
      .json(&SignUpRequest {
        email,
        password,
        data: metadata,
      })
      .send()
      .await
      .map_err(Error::from)?;

    let body: SignUpResponse = Self::json("sign up", resp).await?;
    match body {
      SignUpResponse::Session(token) => {
        let identity = self.adopt(token);
        info!(user = %identity.id, "signed up with an immediate session");
        self.emit(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
      }
      SignUpResponse::User(user) => {
        let identity = user.into_identity();
        info!(user = %identity.id, "signed up; confirmation pending");
        Ok(identity)
      }
    }
  }

  /// `POST /auth/v1/logout`. The local session is dropped first; a token the
  /// service already considers dead counts as signed out.
  async fn sign_out(&self) -> qms_core::Result<()> {
    let held = self.slot().take();
    let Some(session) = held else {
      return Ok(());
    };
    self.emit(AuthEvent::SignedOut);

    let resp = self
      .request(reqwest::Method::POST, "/auth/v1/logout")
      .bearer_auth(&session.access_token)
      .send()
      .await
      .map_err(Error::from)?;

    match Self::check("sign out", resp).await {
      Ok(_) => Ok(()),
      Err(Error::Status {
        status: 401 | 403 | 404,
        ..
      }) => {
        debug!(user = %session.user.id, "session already gone remotely");
        Ok(())
      }
      Err(err) => Err(err.into()),
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.inner.events.subscribe() }
}
