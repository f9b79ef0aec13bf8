//! Session validation, on demand and on a fixed interval.

use qms_core::{
  backend::{IdentityProvider, ProfileStore, TenantStore},
  context::SessionContext,
};
use serde::Serialize;
use tokio::{
  sync::watch,
  time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::manager::SessionManager;

/// Outcome of [`SessionManager::validate_session`]. Anything but `Valid`
/// has already forced a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
  Valid,
  /// Nobody was signed in.
  NoSession,
  /// The session window has passed.
  Expired,
  /// No activity for longer than the idle timeout.
  Idle,
  /// The provider no longer recognises the session.
  Rejected,
}

impl Validity {
  pub fn is_valid(self) -> bool { self == Self::Valid }
}

impl<I, P, T> SessionManager<I, P, T>
where
  I: IdentityProvider,
  P: ProfileStore,
  T: TenantStore,
{
  /// `now > expires_at` for the current window; false with no window.
  pub fn is_session_expired(&self) -> bool {
    let now = self.inner.clock.now();
    self.lock().window.is_some_and(|w| w.is_expired(now))
  }

  /// Check the session locally, then with the provider. Every failure ends
  /// in [`SessionManager::force_logout`].
  pub async fn validate_session(&self) -> Validity {
    let now = self.inner.clock.now();
    let idle_timeout = self.inner.config.idle_timeout();

    let (local, current) = {
      let st = self.lock();
      let local = match (&st.identity, &st.window) {
        (None, _) => Some(Validity::NoSession),
        (Some(_), Some(w)) if w.is_expired(now) => Some(Validity::Expired),
        (Some(_), Some(w)) if idle_timeout.is_some_and(|t| w.is_idle(now, t)) => {
          Some(Validity::Idle)
        }
        (Some(_), _) => None,
      };
      (local, st.identity.as_ref().map(|i| i.id))
    };

    if let Some(verdict) = local {
      info!(?verdict, "session failed local validation");
      self.force_logout().await;
      return verdict;
    }

    match self.inner.identity.get_user().await {
      Ok(Some(user)) if Some(user.id) == current => {
        debug!(user = %user.id, "session valid");
        Validity::Valid
      }
      Ok(Some(user)) => {
        warn!(user = %user.id, expected = ?current, "provider returned a different user");
        self.force_logout().await;
        Validity::Rejected
      }
      Ok(None) => {
        warn!("provider has no session for the current user");
        self.force_logout().await;
        Validity::Rejected
      }
      Err(err) => {
        warn!(error = %err, "session check failed");
        self.force_logout().await;
        Validity::Rejected
      }
    }
  }
}

/// Validate every `validation_interval` while a user is signed in.
///
/// The ticker is armed when an identity is published and torn down after the
/// first failed validation or when the user disappears. It re-arms on the
/// next sign-in.
pub(crate) async fn run<I, P, T>(
  manager: SessionManager<I, P, T>,
  mut context: watch::Receiver<SessionContext>,
) where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  let period = manager.config().validation_interval();

  loop {
    let armed = context.wait_for(|ctx| ctx.identity.is_some()).await.is_ok();
    if !armed {
      break;
    }
    debug!(?period, "session validator armed");

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      ticker.tick().await;

      let signed_in = context.borrow().identity.is_some();
      if !signed_in {
        debug!("user gone; session validator disarmed");
        break;
      }
      if !manager.validate_session().await.is_valid() {
        break;
      }
    }
  }
}
