//! Test utilities for the Apigee client
//!
//! Compiled for unit tests and, through the `test-utils` feature, for the
//! integration suite. Provides:
//! - [`init_test_logging`] to see `tracing` output from a test run
//! - [`FakeClient`], an in-memory [`ResourceClient`] that counts its calls
//! - [`bundle_zip`] to build proxy bundle archives from `(path, contents)` pairs
//!
//! # Example
//!
//! ```rust,no_run
//! use apigee_cli::test_utils::{FakeClient, bundle_zip};
//!
//! let bundle = bundle_zip(&[("apiproxy/orders.xml", "<APIProxy name=\"orders\"/>")]);
//! let client = FakeClient::new()
//!     .with_bundle("orders", 3, bundle)
//!     .with_keyvaluemap("test", "kvm1", "{}");
//! assert_eq!(client.total_calls(), 0);
//! ```

use anyhow::Result;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::client::{EnvironmentDeployment, ProxyDeployments, ResourceClient, RevisionDeployment};
use crate::core::ApigeeError;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Build a zip archive holding `entries`, each a `(path, contents)` pair.
///
/// # Panics
///
/// Panics if the archive cannot be written, which only happens on invalid entry names.
#[must_use]
pub fn bundle_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(contents.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// In-memory [`ResourceClient`].
///
/// Unknown resources answer with a 404 [`ApigeeError::RemoteError`], so a
/// test only registers what it expects the pull to fetch.
#[derive(Debug, Default)]
pub struct FakeClient {
    bundles: HashMap<(String, u32), Vec<u8>>,
    keyvaluemaps: HashMap<(String, String), String>,
    targetservers: HashMap<(String, String), String>,
    deployments: HashMap<String, ProxyDeployments>,
    failures: HashMap<String, u16>,
    bundle_calls: AtomicUsize,
    keyvaluemap_calls: AtomicUsize,
    targetserver_calls: AtomicUsize,
    deployment_calls: AtomicUsize,
}

impl FakeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bundle` for revision `revision` of `api`.
    #[must_use]
    pub fn with_bundle(mut self, api: &str, revision: u32, bundle: Vec<u8>) -> Self {
        self.bundles.insert((api.to_string(), revision), bundle);
        self
    }

    #[must_use]
    pub fn with_keyvaluemap(mut self, environment: &str, name: &str, body: &str) -> Self {
        self.keyvaluemaps.insert((environment.to_string(), name.to_string()), body.to_string());
        self
    }

    #[must_use]
    pub fn with_targetserver(mut self, environment: &str, name: &str, body: &str) -> Self {
        self.targetservers.insert((environment.to_string(), name.to_string()), body.to_string());
        self
    }

    /// Report `revisions` of `api` as deployed to `environment`.
    #[must_use]
    pub fn with_deployments(mut self, api: &str, environment: &str, revisions: &[u32]) -> Self {
        let deployments =
            self.deployments.entry(api.to_string()).or_insert_with(|| ProxyDeployments {
                name: api.to_string(),
                environment: Vec::new(),
            });
        deployments.environment.push(EnvironmentDeployment {
            name: environment.to_string(),
            revision: revisions
                .iter()
                .map(|rev| RevisionDeployment {
                    name: rev.to_string(),
                    state: Some("deployed".to_string()),
                })
                .collect(),
        });
        self
    }

    /// Answer every request for a resource called `name` with HTTP `status`.
    #[must_use]
    pub fn failing(mut self, name: &str, status: u16) -> Self {
        self.failures.insert(name.to_string(), status);
        self
    }

    pub fn bundle_calls(&self) -> usize {
        self.bundle_calls.load(Ordering::SeqCst)
    }

    pub fn keyvaluemap_calls(&self) -> usize {
        self.keyvaluemap_calls.load(Ordering::SeqCst)
    }

    pub fn targetserver_calls(&self) -> usize {
        self.targetserver_calls.load(Ordering::SeqCst)
    }

    pub fn deployment_calls(&self) -> usize {
        self.deployment_calls.load(Ordering::SeqCst)
    }

    /// Requests of every kind made so far.
    pub fn total_calls(&self) -> usize {
        self.bundle_calls()
            + self.keyvaluemap_calls()
            + self.targetserver_calls()
            + self.deployment_calls()
    }

    fn lookup<T: Clone>(&self, name: &str, url: String, found: Option<&T>) -> Result<T> {
        if let Some(status) = self.failures.get(name) {
            return Err(ApigeeError::RemoteError {
                status: *status,
                url,
            }
            .into());
        }
        found.cloned().ok_or_else(|| {
            ApigeeError::RemoteError {
                status: 404,
                url,
            }
            .into()
        })
    }
}

impl ResourceClient for FakeClient {
    async fn export_api_proxy(&self, api: &str, revision: u32) -> Result<Vec<u8>> {
        self.bundle_calls.fetch_add(1, Ordering::SeqCst);
        let key = (api.to_string(), revision);
        self.lookup(api, format!("fake://apis/{api}/revisions/{revision}"), self.bundles.get(&key))
    }

    async fn get_keyvaluemap(&self, environment: &str, name: &str) -> Result<String> {
        self.keyvaluemap_calls.fetch_add(1, Ordering::SeqCst);
        let key = (environment.to_string(), name.to_string());
        self.lookup(
            name,
            format!("fake://environments/{environment}/keyvaluemaps/{name}"),
            self.keyvaluemaps.get(&key),
        )
    }

    async fn get_targetserver(&self, environment: &str, name: &str) -> Result<String> {
        self.targetserver_calls.fetch_add(1, Ordering::SeqCst);
        let key = (environment.to_string(), name.to_string());
        self.lookup(
            name,
            format!("fake://environments/{environment}/targetservers/{name}"),
            self.targetservers.get(&key),
        )
    }

    async fn list_deployments(&self, api: &str) -> Result<ProxyDeployments> {
        self.deployment_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failures.get(api) {
            return Err(ApigeeError::RemoteError {
                status: *status,
                url: format!("fake://apis/{api}/deployments"),
            }
            .into());
        }
        Ok(self.deployments.get(api).cloned().unwrap_or_else(|| ProxyDeployments {
            name: api.to_string(),
            environment: Vec::new(),
        }))
    }
}
