//! Client configuration for the Apigee management API.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. `~/.apigee/config.toml` (or the file named by `--config`)
//! 2. Environment variables (`APIGEE_BASE_URL`, `APIGEE_ORG`, `APIGEE_USERNAME`,
//!    `APIGEE_PASSWORD`, `APIGEE_TOKEN`)
//! 3. Explicit command-line flags such as `--org`
//!
//! # File Format
//!
//! ```toml
//! base_url = "https://api.enterprise.apigee.com"
//! org = "acme"
//! username = "ops@acme.example"
//! password = "secret"
//! # token = "..."   # bearer token, preferred over username/password
//! ```
//!
//! Credentials are only attached to requests; obtaining or refreshing tokens is
//! left to whatever wrote the file or the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BASE_URL, ENV_BASE_URL, ENV_ORG, ENV_PASSWORD,
    ENV_TOKEN, ENV_USERNAME,
};
use crate::core::ApigeeError;

/// Settings needed to talk to one Apigee organization.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApigeeConfig {
    /// Management API root, without the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Organization every request is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Basic-auth username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Bearer token; used instead of basic auth when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ApigeeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            org: None,
            username: None,
            password: None,
            token: None,
        }
    }
}

// Keep secrets out of debug logs
impl fmt::Debug for ApigeeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApigeeConfig")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP basic auth.
    Basic {
        /// Account name
        username: String,
        /// Account password
        password: String,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish_non_exhaustive()
            }
            Self::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

impl ApigeeConfig {
    /// Load the configuration and apply environment overrides.
    ///
    /// With `path == None` the default location is used and a missing file
    /// yields the defaults. An explicitly named file must exist.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ApigeeError::ConfigError {
                        message: format!("config file not found: {}", path.display()),
                    }
                    .into());
                }
                Self::load_from(&path).await?
            }
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path).await?
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse a TOML config file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content).map_err(ApigeeError::from)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded config");
        Ok(config)
    }

    /// `~/.apigee/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?;
        Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Overlay values returned by `lookup` (normally `std::env::var`).
    ///
    /// Empty values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(base_url) = get(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(org) = get(ENV_ORG) {
            self.org = Some(org);
        }
        if let Some(username) = get(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.password = Some(password);
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.token = Some(token);
        }
        self
    }

    /// Replace the organization when `org` is `Some`.
    #[must_use]
    pub fn with_org(mut self, org: Option<String>) -> Self {
        if org.is_some() {
            self.org = org;
        }
        self
    }

    /// The configured organization, or a [`ApigeeError::ConfigError`].
    pub fn require_org(&self) -> Result<&str> {
        self.org.as_deref().ok_or_else(|| {
            ApigeeError::ConfigError {
                message: "no organization configured".to_string(),
            }
            .into()
        })
    }

    /// Credentials for requests: bearer token first, then username/password.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = &self.token {
            return Ok(Credentials::Bearer(token.clone()));
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(ApigeeError::ConfigError {
                message: "no credentials configured (need a token or username and password)"
                    .to_string(),
            }
            .into()),
        }
    }
}
