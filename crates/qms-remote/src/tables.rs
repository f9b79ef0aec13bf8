//! Profile and company access through the table API.

use chrono::{DateTime, Utc};
use qms_core::{
  backend::{ProfileStore, TenantStore},
  company::Company,
  profile::Profile,
};
use reqwest::Method;
use serde_json::json;
use uuid::Uuid;

use crate::{Error, RemoteClient};

impl ProfileStore for RemoteClient {
  /// `GET /rest/v1/profiles?id=eq.<id>`
  async fn get_profile(&self, id: Uuid) -> qms_core::Result<Option<Profile>> {
    let resp = self
      .authorized(Method::GET, "/rest/v1/profiles")
      .await?
      .query(&[("id", format!("eq.{id}")), ("select", "*".to_owned())])
      .send()
      .await
      .map_err(Error::from)?;
    let rows: Vec<Profile> = Self::json("get profile", resp).await?;
    Ok(rows.into_iter().next())
  }

  /// `PATCH /rest/v1/profiles?id=eq.<id>`
  async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> qms_core::Result<()> {
    let resp = self
      .authorized(Method::PATCH, "/rest/v1/profiles")
      .await?
      .query(&[("id", format!("eq.{id}"))])
      .header("Prefer", "return=minimal")
      .json(&json!({ "last_login": at }))
      .send()
      .await
      .map_err(Error::from)?;
    Self::check("update last login", resp).await?;
    Ok(())
  }
}

impl TenantStore for RemoteClient {
  /// `GET /rest/v1/companies?id=eq.<id>&active=eq.true`
  async fn get_active_company(&self, id: Uuid) -> qms_core::Result<Option<Company>> {
    let resp = self
      .authorized(Method::GET, "/rest/v1/companies")
      .await?
      .query(&[
        ("id", format!("eq.{id}")),
        ("active", "eq.true".to_owned()),
        ("select", "*".to_owned()),
      ])
      .send()
      .await
      .map_err(Error::from)?;
    let rows: Vec<Company> = Self::json("get company", resp).await?;
    Ok(rows.into_iter().next())
  }
}
