//! Read-only access to the Apigee Edge management API.
//!
//! The pull workflow needs exactly four calls, all `GET`s scoped to one
//! organization:
//!
//! | call | path under `/v1/organizations/<org>` |
//! |---|---|
//! | [`ResourceClient::export_api_proxy`] | `/apis/<api>/revisions/<rev>?format=bundle` |
//! | [`ResourceClient::get_keyvaluemap`] | `/environments/<env>/keyvaluemaps/<name>` |
//! | [`ResourceClient::get_targetserver`] | `/environments/<env>/targetservers/<name>` |
//! | [`ResourceClient::list_deployments`] | `/apis/<api>/deployments` |
//!
//! [`ManagementClient`] implements them over `reqwest`. Any non-2xx response
//! becomes [`ApigeeError::RemoteError`] carrying the status code; there are no
//! retries and the HTTP client's default timeouts apply.

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

use crate::config::{ApigeeConfig, Credentials};
use crate::core::ApigeeError;

/// The management API calls the pull workflow depends on.
///
/// Implemented by [`ManagementClient`] for real traffic and by
/// `test_utils::FakeClient` in tests.
pub trait ResourceClient: Send + Sync {
    /// Download one revision of an API proxy as a zip bundle.
    fn export_api_proxy(
        &self,
        api: &str,
        revision: u32,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Fetch a key-value map definition from an environment, as raw body text.
    fn get_keyvaluemap(
        &self,
        environment: &str,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Fetch a target server definition from an environment, as raw body text.
    fn get_targetserver(
        &self,
        environment: &str,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// List the environments and revisions an API proxy is deployed to.
    fn list_deployments(&self, api: &str) -> impl Future<Output = Result<ProxyDeployments>> + Send;
}

/// Deployment details of one API proxy across environments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDeployments {
    /// Proxy name
    #[serde(default)]
    pub name: String,
    /// One entry per environment with at least one deployed revision
    #[serde(default)]
    pub environment: Vec<EnvironmentDeployment>,
}

/// Revisions of a proxy deployed to one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDeployment {
    /// Environment name
    pub name: String,
    /// Deployed revisions
    #[serde(default)]
    pub revision: Vec<RevisionDeployment>,
}

/// A single deployed revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionDeployment {
    /// Revision number, as the API reports it (a string)
    pub name: String,
    /// Deployment state such as `deployed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ProxyDeployments {
    /// Highest revision deployed to `environment`, if any.
    #[must_use]
    pub fn deployed_revision(&self, environment: &str) -> Option<u32> {
        self.environment
            .iter()
            .filter(|env| env.name == environment)
            .flat_map(|env| &env.revision)
            .filter_map(|rev| rev.name.parse::<u32>().ok())
            .max()
    }
}

/// [`ResourceClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: Url,
    org: String,
    credentials: Credentials,
}

impl ManagementClient {
    /// Build a client for the organization and credentials in `config`.
    ///
    /// Fails with [`ApigeeError::ConfigError`] when either is missing or the
    /// base URL is unusable, before any request is made.
    pub fn new(config: &ApigeeConfig) -> Result<Self> {
        let org = config.require_org()?.to_string();
        let credentials = config.credentials()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| ApigeeError::ConfigError {
            message: format!("invalid base_url '{}': {e}", config.base_url),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApigeeError::ConfigError {
                message: format!("invalid base_url '{}'", config.base_url),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("apigee-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            org,
            credentials,
        })
    }

    /// Organization every request is scoped to.
    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }

    /// `<base_url>/v1/organizations/<org>/<segments...>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("base URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v1", "organizations", self.org.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, operation: &str) -> Result<reqwest::Response> {
        debug!(%url, operation, "GET");

        let request = self.http.get(url.clone()).header(ACCEPT, "application/json");
        let request = match &self.credentials {
            Credentials::Basic {
                username,
                password,
            } => request.basic_auth(username, Some(password)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await.map_err(|e| ApigeeError::NetworkError {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApigeeError::RemoteError {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        debug!(%url, status = status.as_u16(), "Response received");
        Ok(response)
    }
}

impl ResourceClient for ManagementClient {
    async fn export_api_proxy(&self, api: &str, revision: u32) -> Result<Vec<u8>> {
        let revision = revision.to_string();
        let mut url = self.endpoint(&["apis", api, "revisions", &revision])?;
        url.query_pairs_mut().append_pair("format", "bundle");

        let response = self.get(url, "export API proxy").await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read bundle for {api} revision {revision}"))?;
        Ok(bytes.to_vec())
    }

    async fn get_keyvaluemap(&self, environment: &str, name: &str) -> Result<String> {
        let url = self.endpoint(&["environments", environment, "keyvaluemaps", name])?;
        let response = self.get(url, "get key-value map").await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read key-value map {name} in {environment}"))
    }

    async fn get_targetserver(&self, environment: &str, name: &str) -> Result<String> {
        let url = self.endpoint(&["environments", environment, "targetservers", name])?;
        let response = self.get(url, "get target server").await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read target server {name} in {environment}"))
    }

    async fn list_deployments(&self, api: &str) -> Result<ProxyDeployments> {
        let url = self.endpoint(&["apis", api, "deployments"])?;
        let response = self.get(url, "list API proxy deployments").await?;
        response
            .json::<ProxyDeployments>()
            .await
            .with_context(|| format!("Failed to decode deployments of {api}"))
    }
}
