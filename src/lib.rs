//! Grafana backend datasource plugin for OpenObserve.
//!
//! Panels send SQL through the standard data query path; the plugin
//! forwards it to OpenObserve's search API and shapes the hits into data
//! frames. A resource endpoint serves stream metadata to the query editor
//! for SQL completion, and the health check verifies the configured
//! endpoint and credentials.

use std::fmt;

use grafana_plugin_sdk::backend;
use grafana_plugin_sdk::prelude::*;
use serde::Deserialize;
use thiserror::Error;

pub mod client;
pub mod completion;
pub mod data;
pub mod diagnostics;
pub mod frames;
pub mod query;
pub mod resource;
pub mod sql;
pub mod variables;

/// Organization assumed when an instance does not configure one.
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Per-instance configuration stored by Grafana.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OpenObserveJsonData {
    /// The OpenObserve organization, stored as the instance's database.
    #[serde(default)]
    pub database: Option<String>,
}

/// Per-instance secrets, decrypted by Grafana before they reach the plugin.
#[derive(Clone, Default, Deserialize)]
pub struct OpenObserveSecureJsonData {
    #[serde(default)]
    pub password: Option<String>,
}

/// The plugin service. One per process; every request carries the settings
/// of the instance it targets.
#[derive(Clone, Debug, GrafanaPlugin)]
#[grafana_plugin(
    plugin_type = "datasource",
    json_data = "OpenObserveJsonData",
    secure_json_data = "OpenObserveSecureJsonData"
)]
pub struct OpenObservePlugin {
    http: reqwest::Client,
}

impl OpenObservePlugin {
    /// Creates the service with a shared HTTP client enforcing the request
    /// timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(client::HTTP_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// A client for the instance a request targets.
    pub(crate) fn client(&self, settings: &DatasourceSettings) -> client::Client {
        client::Client::new(
            self.http.clone(),
            &settings.url,
            &settings.username,
            &settings.password,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// An instance without a URL is refused rather than queried against
    /// whatever endpoint was saved before.
    #[error("datasource URL is not configured")]
    MissingUrl,
}

/// Connection settings resolved from one datasource instance.
#[derive(Clone)]
pub struct DatasourceSettings {
    pub url: String,
    pub organization: String,
    pub username: String,
    password: String,
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("url", &self.url)
            .field("organization", &self.organization)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DatasourceSettings {
    /// Resolves the settings of the instance a request targets.
    pub fn from_instance(
        settings: &backend::DataSourceInstanceSettings<
            OpenObserveJsonData,
            OpenObserveSecureJsonData,
        >,
    ) -> Result<Self, SettingsError> {
        Self::from_parts(
            &settings.url,
            &settings.user,
            &settings.json_data,
            &settings.decrypted_secure_json_data,
        )
    }

    fn from_parts(
        url: &str,
        user: &str,
        json_data: &OpenObserveJsonData,
        secure_json_data: &OpenObserveSecureJsonData,
    ) -> Result<Self, SettingsError> {
        if url.is_empty() {
            return Err(SettingsError::MissingUrl);
        }
        let organization = json_data
            .database
            .as_deref()
            .filter(|database| !database.is_empty())
            .unwrap_or(DEFAULT_ORGANIZATION)
            .to_string();
        Ok(Self {
            url: url.to_string(),
            organization,
            username: user.to_string(),
            password: secure_json_data.password.clone().unwrap_or_default(),
        })
    }
}
