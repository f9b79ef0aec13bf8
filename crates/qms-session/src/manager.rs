//! [`SessionManager`]: owner of the session state and its transitions.

use std::{
  pin::Pin,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use qms_core::{
  Error, ErrorClass, Result,
  backend::{IdentityProvider, ProfileStore, TenantStore},
  clock::{Clock, SystemClock},
  company::Company,
  context::{ConnectionStatus, SessionContext},
  identity::{AuthEvent, Identity, SignUpMetadata, validate_credentials},
  permission::{PermissionSet, PrivilegeOverride},
  profile::Profile,
  window::SessionWindow,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
  config::SessionConfig,
  escalator::{Escalation, Escalator},
  notice::Notice,
};

const NOTICE_CAPACITY: usize = 64;

// ─── State ───────────────────────────────────────────────────────────────────

/// Whether auth-state events from the provider may rebuild the context yet.
///
/// Stays `NotReady` until [`SessionManager::initialize`] has finished, so an
/// event fired while the listener is still being wired up cannot race the
/// initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerState {
  NotReady,
  Ready,
}

/// Work deferred to the command worker (see [`crate::tasks`]).
#[derive(Debug)]
pub(crate) enum Command {
  /// `generation` is the escalator generation the retry was scheduled in.
  Reconnect {
    after:      Duration,
    attempt:    u32,
    generation: u64,
  },
}

pub(crate) struct State {
  pub identity:  Option<Identity>,
  pub profile:   Option<Profile>,
  pub company:   Option<Company>,
  pub window:    Option<SessionWindow>,
  pub loading:   bool,
  pub status:    ConnectionStatus,
  pub escalator: Escalator,
  pub listener:  ListenerState,
}

impl State {
  fn new(config: &SessionConfig) -> Self {
    Self {
      identity:  None,
      profile:   None,
      company:   None,
      window:    None,
      loading:   true,
      status:    ConnectionStatus::Connecting,
      escalator: Escalator::new(config.retry_policy()),
      listener:  ListenerState::NotReady,
    }
  }

  /// Drop everything that belongs to a signed-in user.
  pub fn clear_user(&mut self) {
    self.identity = None;
    self.profile = None;
    self.company = None;
    self.window = None;
  }

  fn snapshot(&self, privilege: &PrivilegeOverride) -> SessionContext {
    SessionContext {
      identity:          self.identity.clone(),
      profile:           self.profile.clone(),
      company:           self.company.clone(),
      loading:           self.loading,
      connection_status: self.status,
      permissions:       PermissionSet::derive(self.profile.as_ref(), privilege),
      session_expiry:    self.window.map(|w| w.expires_at),
      last_activity:     self.window.map(|w| w.last_activity),
      has_auth_error:    self.escalator.is_flagged(),
    }
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub(crate) struct Inner<I, P, T> {
  pub identity:   I,
  pub profiles:   P,
  pub tenants:    T,
  pub config:     SessionConfig,
  pub clock:      Arc<dyn Clock>,
  pub state:      Mutex<State>,
  pub context:    watch::Sender<SessionContext>,
  pub notices:    broadcast::Sender<Notice>,
  pub commands:   mpsc::UnboundedSender<Command>,
  pub command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

/// Application-scoped session lifecycle manager.
///
/// Cloning is cheap; clones share the same state. All mutation goes through
/// the methods below; consumers read [`SessionContext`] snapshots.
pub struct SessionManager<I, P, T> {
  pub(crate) inner: Arc<Inner<I, P, T>>,
}

impl<I, P, T> Clone for SessionManager<I, P, T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<I, P, T> SessionManager<I, P, T>
where
  I: IdentityProvider,
  P: ProfileStore,
  T: TenantStore,
{
  pub fn new(identity: I, profiles: P, tenants: T, config: SessionConfig) -> Self {
    Self::with_clock(identity, profiles, tenants, config, SystemClock)
  }

  pub fn with_clock(
    identity: I,
    profiles: P,
    tenants: T,
    config: SessionConfig,
    clock: impl Clock,
  ) -> Self {
    let state = State::new(&config);
    let (context, _) = watch::channel(state.snapshot(&config.privilege_override));
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
    let (commands, command_rx) = mpsc::unbounded_channel();

    Self {
      inner: Arc::new(Inner {
        identity,
        profiles,
        tenants,
        config,
        clock: Arc::new(clock),
        state: Mutex::new(state),
        context,
        notices,
        commands,
        command_rx: Mutex::new(Some(command_rx)),
      }),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn config(&self) -> &SessionConfig { &self.inner.config }

  /// The current snapshot.
  pub fn context(&self) -> SessionContext { self.inner.context.borrow().clone() }

  /// A receiver that sees every published snapshot.
  pub fn subscribe(&self) -> watch::Receiver<SessionContext> {
    self.inner.context.subscribe()
  }

  pub fn notices(&self) -> broadcast::Receiver<Notice> { self.inner.notices.subscribe() }

  /// Reset the sticky auth-error flag and the retry budget.
  pub fn clear_auth_error(&self) {
    self.update(|st| st.escalator.clear());
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Determine the initial auth state from the provider's existing session.
  ///
  /// "Nobody is signed in" is a success that leaves the status `connected`.
  pub async fn initialize(&self) -> Result<()> {
    self.clear_auth_error();
    self.update(|st| {
      st.loading = true;
      st.status = ConnectionStatus::Connecting;
    });

    let result = match self.inner.identity.get_session().await {
      Ok(None) => {
        info!("no existing session");
        self.update(|st| {
          st.clear_user();
          st.status = ConnectionStatus::Connected;
          st.loading = false;
        });
        Ok(())
      }
      Ok(Some(identity)) => self.load_user_context(identity).await,
      Err(err) => {
        self.update(|st| {
          st.status = ConnectionStatus::Disconnected;
          st.loading = false;
        });
        self.handle_error(&err).await;
        Err(err)
      }
    };

    self.lock().listener = ListenerState::Ready;
    result
  }

  /// Fetch profile and company for `identity` and publish them together.
  ///
  /// A missing or inactive profile clears the session and flags an auth
  /// error. A missing or inactive company leaves the company empty.
  pub async fn load_user_context(&self, identity: Identity) -> Result<()> {
    let window =
      SessionWindow::open(self.inner.clock.now(), self.inner.config.session_lifetime());
    self.update(|st| st.loading = true);

    match self.fetch_user_context(&identity).await {
      Ok((profile, company)) => {
        info!(
          user = %identity.id,
          company = ?company.as_ref().map(|c| c.id),
          expires_at = %window.expires_at,
          "user context loaded"
        );
        if let PrivilegeOverride::Granted { granted_by, reason } =
          &self.inner.config.privilege_override
        {
          warn!(user = %identity.id, %granted_by, %reason, "privilege override applied");
        }
        self.update(|st| {
          st.identity = Some(identity);
          st.profile = Some(profile);
          st.company = company;
          st.window = Some(window);
          st.status = ConnectionStatus::Connected;
          st.loading = false;
        });
        Ok(())
      }
      Err(err) => {
        warn!(user = %identity.id, error = %err, "failed to load user context");
        let reached_backend = err.class() == ErrorClass::AccountState;
        self.update(|st| {
          st.clear_user();
          st.status = if reached_backend {
            ConnectionStatus::Connected
          } else {
            ConnectionStatus::Disconnected
          };
          st.loading = false;
        });
        self.handle_error(&err).await;
        Err(err)
      }
    }
  }

  async fn fetch_user_context(
    &self,
    identity: &Identity,
  ) -> Result<(Profile, Option<Company>)> {
    let profile = self
      .inner
      .profiles
      .get_profile(identity.id)
      .await?
      .ok_or(Error::ProfileNotFound(identity.id))?;

    if !profile.is_active {
      return Err(Error::ProfileInactive(profile.id));
    }

    let company = match profile.company_id {
      Some(company_id) => {
        let company = self.inner.tenants.get_active_company(company_id).await?;
        if company.as_ref().is_some_and(|c| !c.active) {
          debug!(company = %company_id, "store returned an inactive company; ignoring it");
        }
        company.filter(|c| c.active)
      }
      None => None,
    };

    Ok((profile, company))
  }

  /// Sign in with email and password.
  ///
  /// Obviously invalid credentials are rejected before the provider is
  /// contacted. Recording the last-login time is best effort.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
    validate_credentials(email, password)?;
    self.clear_auth_error();
    self.update(|st| st.loading = true);

    let identity = match self
      .inner
      .identity
      .sign_in_with_password(email, password)
      .await
    {
      Ok(identity) => identity,
      Err(err) => {
        self.update(|st| st.loading = false);
        self.handle_error(&err).await;
        return Err(err);
      }
    };

    if let Err(err) = self
      .inner
      .profiles
      .touch_last_login(identity.id, self.inner.clock.now())
      .await
    {
      warn!(user = %identity.id, error = %err, "failed to record last login");
    }

    self.load_user_context(identity).await?;
    info!("signed in");
    self.notify(Notice::SignedIn);
    Ok(())
  }

  /// Register a new account. Does not sign in by itself; providers that
  /// start a session on sign-up announce it through their auth events.
  pub async fn sign_up(
    &self,
    email: &str,
    password: &str,
    metadata: &SignUpMetadata,
  ) -> Result<Identity> {
    self.clear_auth_error();
    self.update(|st| st.loading = true);

    let result = self.inner.identity.sign_up(email, password, metadata).await;
    self.update(|st| st.loading = false);

    match result {
      Ok(identity) => {
        info!(user = %identity.id, "signed up");
        self.notify(Notice::SignedUp);
        Ok(identity)
      }
      Err(err) => {
        self.handle_error(&err).await;
        Err(err)
      }
    }
  }

  /// Sign out. Local state is cleared even when the provider call fails, and
  /// calling this while signed out is harmless.
  pub async fn sign_out(&self) {
    self.update(|st| st.loading = true);
    if let Err(err) = self.inner.identity.sign_out().await {
      warn!(error = %err, "remote sign-out failed; clearing local session anyway");
      self.notify(Notice::Error(err.to_string()));
    }

    self.update(|st| {
      st.clear_user();
      st.status = ConnectionStatus::Connected;
      st.loading = false;
    });
    info!("signed out");
    self.notify(Notice::SignedOut);
  }

  /// Terminal recovery action: clear everything, try to end the remote
  /// session, and tell the UI the session expired.
  pub async fn force_logout(&self) {
    self.update(|st| {
      st.clear_user();
      st.loading = true;
    });

    if let Err(err) = self.inner.identity.sign_out().await {
      warn!(error = %err, "remote sign-out failed during forced logout");
    }
    self.update(|st| st.loading = false);

    warn!("session ended by forced logout");
    self.notify(Notice::SessionExpired);
  }

  /// Re-fetch the remote session after the configured delay and rebuild the
  /// context from it.
  pub async fn reconnect(&self) -> Result<()> {
    self.update(|st| {
      st.status = ConnectionStatus::Connecting;
      st.loading = true;
    });

    tokio::time::sleep(self.inner.config.reconnect_delay()).await;

    match self.inner.identity.get_session().await {
      Ok(Some(identity)) => self.load_user_context(identity).await,
      Ok(None) => {
        info!("reconnect found no session");
        self.update(|st| {
          st.clear_user();
          st.status = ConnectionStatus::Disconnected;
          st.loading = false;
        });
        Ok(())
      }
      Err(err) => {
        self.update(|st| {
          st.status = ConnectionStatus::Disconnected;
          st.loading = false;
        });
        self.handle_error(&err).await;
        Err(err)
      }
    }
  }

  // ── Auth events ───────────────────────────────────────────────────────────

  /// React to a provider auth-state change.
  ///
  /// Dropped while the listener is not ready or while another auth step is
  /// loading (that step publishes the outcome itself).
  pub(crate) async fn on_auth_event(&self, event: AuthEvent) {
    let (ready, loading, current) = {
      let st = self.lock();
      (
        st.listener == ListenerState::Ready,
        st.loading,
        st.identity.as_ref().map(|i| i.id),
      )
    };

    if !ready {
      debug!(?event, "listener not ready; dropping auth event");
      return;
    }

    match event {
      AuthEvent::SignedOut => {
        if current.is_some() {
          info!("provider reported sign-out");
          self.update(|st| {
            st.clear_user();
            st.status = ConnectionStatus::Connected;
          });
        }
      }
      AuthEvent::SignedIn(identity)
      | AuthEvent::TokenRefreshed(identity)
      | AuthEvent::UserUpdated(identity) => {
        if loading || current == Some(identity.id) {
          debug!(user = %identity.id, "auth event already covered");
          return;
        }
        // Failures are escalated inside.
        let _ = self.load_user_context(identity).await;
      }
    }
  }

  // ── Errors ────────────────────────────────────────────────────────────────

  pub(crate) async fn handle_error(&self, err: &Error) {
    let (escalation, generation) = {
      let mut st = self.lock();
      let escalation = st.escalator.escalate(err);
      self.publish(&st);
      (escalation, st.escalator.generation())
    };

    match escalation {
      Escalation::Retry { attempt, delay } if self.worker_started() => {
        info!(attempt, ?delay, "token expired; scheduling reconnect");
        if self
          .inner
          .commands
          .send(Command::Reconnect {
            after: delay,
            attempt,
            generation,
          })
          .is_err()
        {
          warn!("command worker gone; forcing logout instead of retrying");
          self.force_logout().await;
        }
      }
      Escalation::Retry { attempt, delay } => {
        info!(attempt, ?delay, "token expired; no worker running, retrying inline");
        self.retry_inline(delay).await;
      }
      Escalation::ForceLogout { failures } => {
        warn!(failures, "token still expired after retries");
        self.force_logout().await;
      }
      Escalation::Notify(message) => {
        error!(error = %err, "auth error");
        self.notify(Notice::Error(message));
      }
    }
  }

  /// Sleep, then reconnect. Boxed because a failed reconnect re-enters
  /// [`Self::handle_error`].
  fn retry_inline(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      // Failures are escalated inside.
      let _ = self.reconnect().await;
    })
  }

  /// True once [`Self::start`] has handed the command queue to a worker.
  fn worker_started(&self) -> bool {
    self
      .inner
      .command_rx
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_none()
  }

  /// Whether a retry scheduled in `generation` still applies.
  pub(crate) fn retry_is_current(&self, generation: u64) -> bool {
    self.lock().escalator.generation() == generation
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Mutate state and publish the resulting snapshot.
  pub(crate) fn update(&self, f: impl FnOnce(&mut State)) {
    let mut st = self.lock();
    f(&mut st);
    self.publish(&st);
  }

  pub(crate) fn publish(&self, st: &State) {
    self
      .inner
      .context
      .send_replace(st.snapshot(&self.inner.config.privilege_override));
  }

  pub(crate) fn notify(&self, notice: Notice) {
    // No subscribers is fine.
    let _ = self.inner.notices.send(notice);
  }
}
