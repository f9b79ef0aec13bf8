//! Background tasks: auth-event listener, command worker and validator.

use qms_core::{
  backend::{IdentityProvider, ProfileStore, TenantStore},
  identity::AuthEvent,
};
use tokio::{
  sync::{broadcast, mpsc},
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
  manager::{Command, SessionManager},
  validator,
};

/// Owns the background tasks started by [`SessionManager::start`].
///
/// Dropping it (or calling [`Supervisor::shutdown`]) aborts every task,
/// including pending retries.
#[must_use = "dropping the supervisor stops the background tasks"]
pub struct Supervisor {
  tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
  /// Abort every task now. Dropping the supervisor has the same effect.
  pub fn shutdown(self) { self.abort_all(); }

  fn abort_all(&self) {
    for task in &self.tasks {
      task.abort();
    }
  }

  /// True once every task has stopped.
  pub fn is_finished(&self) -> bool { self.tasks.iter().all(JoinHandle::is_finished) }
}

impl Drop for Supervisor {
  fn drop(&mut self) { self.abort_all(); }
}

impl<I, P, T> SessionManager<I, P, T>
where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  /// Spawn the background tasks. Call once, before [`Self::initialize`], so
  /// that no auth event is missed.
  ///
  /// The periodic validator is not started while a privilege override is
  /// configured.
  pub fn start(&self) -> Supervisor {
    let mut tasks = Vec::with_capacity(3);

    let events = self.inner.identity.subscribe();
    tasks.push(tokio::spawn(listen(self.clone(), events)));

    let command_rx = self
      .inner
      .command_rx
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .take();
    match command_rx {
      Some(rx) => tasks.push(tokio::spawn(work(self.clone(), rx))),
      None => warn!("session manager already started; retries will force logout"),
    }

    if self.inner.config.privilege_override.is_active() {
      warn!("privilege override configured; periodic session validation disabled");
    } else {
      tasks.push(tokio::spawn(validator::run(self.clone(), self.subscribe())));
    }

    info!(tasks = tasks.len(), "session tasks started");
    Supervisor { tasks }
  }
}

async fn listen<I, P, T>(
  manager: SessionManager<I, P, T>,
  mut events: broadcast::Receiver<AuthEvent>,
) where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  loop {
    match events.recv().await {
      Ok(event) => manager.on_auth_event(event).await,
      Err(broadcast::error::RecvError::Lagged(skipped)) => {
        warn!(skipped, "auth event listener lagged");
      }
      Err(broadcast::error::RecvError::Closed) => {
        debug!("identity provider closed its event stream");
        break;
      }
    }
  }
}

async fn work<I, P, T>(
  manager: SessionManager<I, P, T>,
  mut commands: mpsc::UnboundedReceiver<Command>,
) where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  while let Some(command) = commands.recv().await {
    match command {
      Command::Reconnect {
        after,
        attempt,
        generation,
      } => {
        tokio::time::sleep(after).await;
        if !manager.retry_is_current(generation) {
          debug!(attempt, "retry superseded; dropping it");
          continue;
        }
        debug!(attempt, "retrying session");
        // Failures re-enter the escalator, which may queue another attempt.
        let _ = manager.reconnect().await;
      }
    }
  }
}
