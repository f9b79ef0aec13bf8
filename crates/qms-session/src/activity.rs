//! User activity bookkeeping.

use chrono::Duration;
use qms_core::{
  backend::{IdentityProvider, ProfileStore, TenantStore},
  window::ActivityKind,
};
use tracing::trace;

use crate::manager::SessionManager;

/// Activity stamps closer together than this are recorded but not
/// republished.
fn publish_granularity() -> Duration { Duration::seconds(1) }

impl<I, P, T> SessionManager<I, P, T>
where
  I: IdentityProvider,
  P: ProfileStore,
  T: TenantStore,
{
  /// Stamp `last_activity = now` for the current session. Ignored when
  /// nobody is signed in.
  ///
  /// Feeds the idle timeout checked by
  /// [`validate_session`](Self::validate_session); never extends the session
  /// window.
  pub fn record_activity(&self, kind: ActivityKind) {
    let now = self.inner.clock.now();
    let published = self.inner.context.borrow().last_activity;

    let mut st = self.lock();
    let Some(window) = st.window.as_mut() else {
      return;
    };
    window.touch(now);

    if published.is_none_or(|at| now - at >= publish_granularity()) {
      trace!(%kind, "activity recorded");
      self.publish(&st);
    }
  }
}
