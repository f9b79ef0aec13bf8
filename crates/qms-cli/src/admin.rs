//! `qms local …`: administration of the SQLite backend.

use anyhow::{Context as _, anyhow};
use clap::Subcommand;
use qms_core::identity::Identity;
use qms_store_sqlite::{NewCompany, SqliteStore};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum LocalCommand {
  /// Create a company (tenant).
  AddCompany {
    name:    String,
    /// Defaults to the name, lowercased with dashes.
    #[arg(long)]
    slug:    Option<String>,
    /// Enabled module; repeat for several.
    #[arg(long = "module")]
    modules: Vec<String>,
  },
  /// Activate or deactivate a company.
  SetCompanyActive {
    company: Uuid,
    #[arg(action = clap::ArgAction::Set)]
    active:  bool,
  },
  /// Activate or deactivate a user's profile.
  SetProfileActive {
    email:  String,
    #[arg(action = clap::ArgAction::Set)]
    active: bool,
  },
  /// Set a user's role flags (omitted flags are revoked), optionally moving
  /// them to another company.
  Grant {
    email:         String,
    #[arg(long)]
    super_admin:   bool,
    #[arg(long)]
    company_admin: bool,
    #[arg(long)]
    company:       Option<Uuid>,
  },
}

pub async fn run(store: &SqliteStore, command: LocalCommand) -> anyhow::Result<()> {
  match command {
    LocalCommand::AddCompany {
      name,
      slug,
      modules,
    } => {
      let slug = slug.unwrap_or_else(|| slugify(&name));
      let company = store
        .create_company(NewCompany {
          name,
          slug,
          modules,
        })
        .await
        .context("creating company")?;
      info!(company = %company.id, slug = %company.slug, "company created");
      println!("{}", serde_json::to_string_pretty(&company)?);
    }
    LocalCommand::SetCompanyActive { company, active } => {
      store
        .set_company_active(company, active)
        .await
        .context("updating company")?;
      info!(%company, active, "company updated");
    }
    LocalCommand::SetProfileActive { email, active } => {
      let user = find(store, &email).await?;
      store
        .set_profile_active(user.id, active)
        .await
        .context("updating profile")?;
      info!(user = %user.id, active, "profile updated");
    }
    LocalCommand::Grant {
      email,
      super_admin,
      company_admin,
      company,
    } => {
      let user = find(store, &email).await?;
      if let Some(company) = company {
        store
          .assign_company(user.id, Some(company))
          .await
          .context("assigning company")?;
      }
      store
        .set_roles(user.id, super_admin, company_admin)
        .await
        .context("updating roles")?;
      let profile = store
        .profile(user.id)
        .await?
        .ok_or_else(|| anyhow!("profile for {email} disappeared"))?;
      println!(
        "{}",
        serde_json::to_string_pretty(&json!({
          "user": user.id,
          "company_id": profile.company_id,
          "is_super_admin": profile.is_super_admin,
          "is_company_admin": profile.is_company_admin,
        }))?
      );
    }
  }
  Ok(())
}

async fn find(store: &SqliteStore, email: &str) -> anyhow::Result<Identity> {
  store
    .find_user(email)
    .await?
    .ok_or_else(|| anyhow!("no user with email {email}"))
}

/// "Acme Quality GmbH" → "acme-quality-gmbh".
fn slugify(name: &str) -> String {
  name
    .split(|c: char| !c.is_alphanumeric())
    .filter(|part| !part.is_empty())
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("-")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugify_collapses_punctuation() {
    assert_eq!(slugify("Acme Quality GmbH"), "acme-quality-gmbh");
    assert_eq!(slugify("  Müller & Söhne  "), "müller-söhne");
    assert_eq!(slugify("---"), "");
  }

  #[tokio::test]
  async fn grant_updates_roles_and_company() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let company = store
      .create_company(NewCompany {
        name:    "Acme".into(),
        slug:    "acme".into(),
        modules: vec![],
      })
      .await
      .unwrap();
    let user = store
      .create_user("admin@example.com", "pw", &Default::default())
      .await
      .unwrap();

    run(
      &store,
      LocalCommand::Grant {
        email:         "Admin@Example.com".into(),
        super_admin:   false,
        company_admin: true,
        company:       Some(company.id),
      },
    )
    .await
    .unwrap();

    let profile = store.profile(user.id).await.unwrap().unwrap();
    assert!(profile.is_company_admin);
    assert!(!profile.is_super_admin);
    assert_eq!(profile.company_id, Some(company.id));
  }

  #[tokio::test]
  async fn unknown_email_is_an_error() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let err = run(
      &store,
      LocalCommand::SetProfileActive {
        email:  "ghost@example.com".into(),
        active: false,
      },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("ghost@example.com"));
  }
}
