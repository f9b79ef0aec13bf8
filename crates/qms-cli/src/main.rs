//! `qms`: session and tenant administration for the QMS backend.
//!
//! # Usage
//!
//! ```text
//! qms sign-in alice@example.com
//! qms status
//! qms watch
//! qms --backend local local add-company "Acme Quality GmbH" --module audits
//! ```
//!
//! Settings come from `config.toml` (or `--config`), then `QMS_*`
//! environment variables.

mod admin;
mod persist;
mod session;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use qms_remote::RemoteClient;
use qms_store_sqlite::{SqliteIdentityProvider, SqliteStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
  admin::LocalCommand,
  session::SessionCommand,
  settings::{BackendKind, Settings},
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Session and tenant administration for QMS")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Overrides `backend` from the settings.
  #[arg(long, value_enum)]
  backend: Option<BackendKind>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  #[command(flatten)]
  Session(SessionCommand),
  /// Print the effective settings.
  Config,
  /// Administer the local SQLite backend.
  #[command(subcommand)]
  Local(LocalCommand),
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut settings = Settings::load(&cli.config)?;
  if let Some(backend) = cli.backend {
    settings.backend = backend;
  }

  match cli.command {
    Command::Config => {
      print!("{}", settings.to_masked_toml()?);
      Ok(())
    }
    Command::Local(command) => {
      let store = open_store(&settings).await?;
      admin::run(&store, command).await
    }
    Command::Session(command) => match settings.backend {
      BackendKind::Local => {
        let store = open_store(&settings).await?;
        let provider = SqliteIdentityProvider::new(store.clone());
        session::run(
          provider,
          store.clone(),
          store,
          settings.session,
          &settings.session_file,
          command,
        )
        .await
      }
      BackendKind::Remote => {
        let client =
          RemoteClient::new(settings.remote()?.clone()).context("failed to build HTTP client")?;
        session::run(
          client.clone(),
          client.clone(),
          client,
          settings.session,
          &settings.session_file,
          command,
        )
        .await
      }
    },
  }
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
  let path = &settings.database;
  if let Some(dir) = path.parent() {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("creating directory {}", dir.display()))?;
  }
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}
