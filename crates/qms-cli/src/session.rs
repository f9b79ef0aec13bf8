//! Session commands, run against whichever backend is configured.

use std::path::Path;

use anyhow::{Context as _, bail};
use clap::Subcommand;
use qms_core::{
  backend::{IdentityProvider, ProfileStore, TenantStore},
  identity::SignUpMetadata,
};
use qms_session::{SessionConfig, SessionManager};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::persist::{self, Persist};

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
  /// Sign in with email and password.
  SignIn {
    email:    String,
    /// Read from stdin when omitted.
    #[arg(long, env = "QMS_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Register a new account.
  SignUp {
    email:      String,
    #[arg(long, env = "QMS_PASSWORD", hide_env_values = true)]
    password:   Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name:  Option<String>,
    /// Company the new profile belongs to.
    #[arg(long)]
    company:    Option<Uuid>,
  },
  /// End the current session.
  SignOut,
  /// Print the current session context as JSON.
  Status,
  /// Check the session now; exits non-zero when it is no longer valid.
  Validate,
  /// Keep the session alive and print every change until Ctrl-C.
  Watch,
}

/// Restore the saved session, run `command`, and save whatever session is
/// left afterwards.
pub async fn run<I, P, T>(
  identity: I,
  profiles: P,
  tenants: T,
  config: SessionConfig,
  session_file: &Path,
  command: SessionCommand,
) -> anyhow::Result<()>
where
  I: IdentityProvider + Persist + Clone + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  persist::load(&identity, session_file)?;
  let config = config_for(&command, config);
  let manager = SessionManager::new(identity.clone(), profiles, tenants, config);

  let result = execute(&manager, command).await;
  persist::save(&identity, session_file)?;
  result
}

/// `watch` sees no user input that could count as activity, so it runs
/// without the idle check.
fn config_for(command: &SessionCommand, mut config: SessionConfig) -> SessionConfig {
  if matches!(command, SessionCommand::Watch) && config.idle_timeout().is_some() {
    info!("idle timeout disabled while watching");
    config.idle_timeout_secs = None;
  }
  config
}

async fn execute<I, P, T>(
  manager: &SessionManager<I, P, T>,
  command: SessionCommand,
) -> anyhow::Result<()>
where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  if matches!(command, SessionCommand::Watch) {
    return watch(manager).await;
  }

  if let Err(err) = manager.initialize().await {
    warn!(error = %err, "could not restore the previous session");
  }

  match command {
    SessionCommand::SignIn { email, password } => {
      let password = password_or_prompt(password)?;
      manager
        .sign_in(&email, &password)
        .await
        .context("sign-in failed")?;
      print_json(&manager.context())
    }
    SessionCommand::SignUp {
      email,
      password,
      first_name,
      last_name,
      company,
    } => {
      let password = password_or_prompt(password)?;
      let metadata = SignUpMetadata {
        first_name,
        last_name,
        company_id: company,
        ..Default::default()
      };
      let identity = manager
        .sign_up(&email, &password, &metadata)
        .await
        .context("sign-up failed")?;
      print_json(&identity)
    }
    SessionCommand::SignOut => {
      manager.sign_out().await;
      info!("signed out");
      Ok(())
    }
    SessionCommand::Status => print_json(&manager.context()),
    SessionCommand::Validate => {
      let validity = manager.validate_session().await;
      print_json(&json!({ "validity": validity }))?;
      if !validity.is_valid() {
        bail!("session is not valid ({validity:?})");
      }
      Ok(())
    }
    // Handled above.
    SessionCommand::Watch => Ok(()),
  }
}

/// Run the background tasks and print every context change and notice as
/// one JSON line until interrupted.
async fn watch<I, P, T>(manager: &SessionManager<I, P, T>) -> anyhow::Result<()>
where
  I: IdentityProvider + 'static,
  P: ProfileStore + 'static,
  T: TenantStore + 'static,
{
  let mut context = manager.subscribe();
  let mut notices = manager.notices();
  let supervisor = manager.start();

  if let Err(err) = manager.initialize().await {
    warn!(error = %err, "could not restore the previous session");
  }
  print_line(&*context.borrow_and_update())?;

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      changed = context.changed() => {
        if changed.is_err() {
          break;
        }
        let snapshot = context.borrow_and_update().clone();
        print_line(&snapshot)?;
      }
      notice = notices.recv() => match notice {
        Ok(notice) => print_line(&notice)?,
        Err(RecvError::Lagged(skipped)) => warn!(skipped, "notice stream lagged"),
        Err(RecvError::Closed) => break,
      },
      _ = &mut ctrl_c => {
        info!("interrupted");
        break;
      }
    }
  }

  supervisor.shutdown();
  Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_line(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string(value)?);
  Ok(())
}

/// The `--password` value, or one line read from stdin.
fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
  if let Some(password) = password {
    return Ok(password);
  }
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
