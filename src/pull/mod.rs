//! Pulling an API proxy revision and its environment dependencies into a work tree.
//!
//! A pull runs these stages in order, with no retries and no rollback:
//!
//! ```text
//! Start -> BundleFetched -> Unpacked -> Scanned -> DependenciesExported
//!       -> (Prefixed) -> (BasePathSet) -> Done
//! ```
//!
//! The bracketed stages only run when [`PullOptions::prefix`] or
//! [`PullOptions::basepath`] ask for them. Without `force`, an existing bundle
//! archive or proxy directory stops the pull before any request is made.
//!
//! # Layout
//!
//! ```text
//! <work_tree>/
//!   <api>/                              unpacked bundle, holds apiproxy/...
//!   keyvaluemaps/<environment>/<name>   raw key-value map body
//!   targetservers/<environment>/<name>  raw target server body
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use apigee_cli::client::ManagementClient;
//! use apigee_cli::config::ApigeeConfig;
//! use apigee_cli::pull::{Pull, PullConfig, PullOptions, ProxyPuller};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ApigeeConfig::load(None).await?;
//! let client = ManagementClient::new(&config)?;
//! let pull = Pull::new(
//!     client,
//!     PullConfig {
//!         org: "acme".to_string(),
//!         api_name: "orders".to_string(),
//!         revision: 3,
//!         environment: "test".to_string(),
//!         work_tree: "./orders-tree".into(),
//!     },
//! )?;
//! let report = pull
//!     .pull(PullOptions {
//!         prefix: Some("test-".to_string()),
//!         ..PullOptions::default()
//!     })
//!     .await?;
//! println!("{} files prefixed", report.prefixed_files.len());
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod rewrite;
pub mod scanner;

use anyhow::{Context, Result};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::ResourceClient;
use crate::constants::{APIPROXY_DIR, BUNDLE_EXTENSION};
use crate::core::ApigeeError;
use crate::utils::{atomic_write, ensure_dir, extract_zip, list_files, prepare_dir};

pub use export::{DependencyKind, ExportedDependency};
pub use rewrite::{BasePath, BasePathChange};

/// What to pull and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullConfig {
    /// Organization owning the proxy
    pub org: String,
    /// API proxy name
    pub api_name: String,
    /// Revision to export
    pub revision: u32,
    /// Environment dependencies are read from
    pub environment: String,
    /// Root directory receiving every artifact
    pub work_tree: PathBuf,
}

/// Paths derived from a [`PullConfig`], computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullLayout {
    work_tree: PathBuf,
    apiproxy_dir: PathBuf,
    bundle_path: PathBuf,
    keyvaluemaps_dir: PathBuf,
    targetservers_dir: PathBuf,
}

impl PullLayout {
    #[must_use]
    pub fn new(work_tree: &Path, environment: &str, api_name: &str) -> Self {
        Self {
            work_tree: work_tree.to_path_buf(),
            apiproxy_dir: work_tree.join(api_name),
            bundle_path: work_tree.join(format!("{api_name}.{BUNDLE_EXTENSION}")),
            keyvaluemaps_dir: work_tree
                .join(DependencyKind::KeyValueMap.dir_name())
                .join(environment),
            targetservers_dir: work_tree
                .join(DependencyKind::TargetServer.dir_name())
                .join(environment),
        }
    }

    #[must_use]
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// `<work_tree>/<api>`
    #[must_use]
    pub fn apiproxy_dir(&self) -> &Path {
        &self.apiproxy_dir
    }

    /// `<work_tree>/<api>.zip`, removed once unpacked
    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    #[must_use]
    pub fn keyvaluemaps_dir(&self) -> &Path {
        &self.keyvaluemaps_dir
    }

    #[must_use]
    pub fn targetservers_dir(&self) -> &Path {
        &self.targetservers_dir
    }

    #[must_use]
    pub fn dependency_dir(&self, kind: DependencyKind) -> &Path {
        match kind {
            DependencyKind::KeyValueMap => &self.keyvaluemaps_dir,
            DependencyKind::TargetServer => &self.targetservers_dir,
        }
    }
}

/// Per-call options of [`ProxyPuller::pull`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Extra names added to the prefixing pass, after the proxy name
    pub dependencies: Vec<String>,
    /// Overwrite existing files instead of failing
    pub force: bool,
    /// Prefix applied to every dependency reference in the work tree
    pub prefix: Option<String>,
    /// New `BasePath` for the proxy's default endpoint
    pub basepath: Option<String>,
}

/// Stages of a pull, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStage {
    Start,
    BundleFetched,
    Unpacked,
    Scanned,
    DependenciesExported,
    Prefixed,
    BasePathSet,
    Done,
}

impl fmt::Display for PullStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::BundleFetched => "bundle-fetched",
            Self::Unpacked => "unpacked",
            Self::Scanned => "scanned",
            Self::DependenciesExported => "dependencies-exported",
            Self::Prefixed => "prefixed",
            Self::BasePathSet => "basepath-set",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a successful pull wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Unpacked proxy directory
    pub apiproxy_dir: PathBuf,
    pub keyvaluemaps: Vec<ExportedDependency>,
    pub targetservers: Vec<ExportedDependency>,
    /// Files rewritten by the prefixing pass
    pub prefixed_files: Vec<PathBuf>,
    /// Base-path rewrite, when one was requested
    pub basepath: Option<BasePathChange>,
}

/// Operations making up a proxy pull.
///
/// [`ProxyPuller::pull`] sequences the others; each is usable on its own.
pub trait ProxyPuller {
    /// Every file under `directory`, recursively.
    fn get_apiproxy_files(&self, directory: &Path) -> Result<Vec<PathBuf>>;

    /// Key-value maps referenced by `files`.
    fn get_keyvaluemap_dependencies(&self, files: &[PathBuf]) -> Result<Vec<String>>;

    /// Fetch `names` into the key-value map directory.
    fn export_keyvaluemap_dependencies(
        &self,
        names: &[String],
        force: bool,
    ) -> impl Future<Output = Result<Vec<ExportedDependency>>> + Send;

    /// Target servers referenced by `files`.
    fn get_targetserver_dependencies(&self, files: &[PathBuf]) -> Result<Vec<String>>;

    /// Fetch `names` into the target server directory.
    fn export_targetserver_dependencies(
        &self,
        names: &[String],
        force: bool,
    ) -> impl Future<Output = Result<Vec<ExportedDependency>>> + Send;

    /// Prefix `strings` inside `files`, returning the files changed.
    fn prefix_strings_in_files(
        &self,
        files: &[PathBuf],
        strings: &[String],
        prefix: &str,
    ) -> Result<Vec<PathBuf>>;

    /// Prefix `dependencies` across the whole work tree.
    fn prefix_dependencies_in_work_tree(
        &self,
        dependencies: &[String],
        prefix: &str,
    ) -> Result<Vec<PathBuf>>;

    /// Current `BasePath` of the proxy unpacked in `directory`.
    fn get_apiproxy_basepath(&self, directory: &Path) -> Result<BasePath>;

    /// Rewrite the `BasePath` in `file` to `basepath`.
    fn set_apiproxy_basepath(&self, basepath: &str, file: &Path) -> Result<BasePathChange>;

    /// Run every stage of the pull.
    fn pull(&self, options: PullOptions) -> impl Future<Output = Result<PullReport>> + Send;
}

/// Pulls one proxy revision through a [`ResourceClient`].
#[derive(Debug)]
pub struct Pull<C> {
    client: C,
    config: PullConfig,
    layout: PullLayout,
}

impl<C: ResourceClient> Pull<C> {
    /// Create the work tree (with parents) and fix every derived path.
    pub fn new(client: C, mut config: PullConfig) -> Result<Self> {
        config.work_tree = prepare_dir(&config.work_tree)?;
        let layout = PullLayout::new(&config.work_tree, &config.environment, &config.api_name);
        Ok(Self {
            client,
            config,
            layout,
        })
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    #[must_use]
    pub fn layout(&self) -> &PullLayout {
        &self.layout
    }

    fn enter(&self, stage: PullStage) {
        debug!(api = %self.config.api_name, %stage, "Pull stage");
    }

    // Both targets are checked before the bundle request goes out
    fn check_unclaimed(&self) -> Result<()> {
        for path in [self.layout.bundle_path(), self.layout.apiproxy_dir()] {
            if path.exists() {
                return Err(ApigeeError::path_exists(path).into());
            }
        }
        Ok(())
    }

    async fn fetch_bundle(&self, force: bool) -> Result<()> {
        ensure_dir(self.layout.work_tree())?;
        if !force {
            self.check_unclaimed()?;
        }

        info!(
            org = %self.config.org,
            api = %self.config.api_name,
            revision = self.config.revision,
            "Exporting API proxy bundle"
        );
        let bundle = self
            .client
            .export_api_proxy(&self.config.api_name, self.config.revision)
            .await?;
        atomic_write(self.layout.bundle_path(), &bundle)?;
        Ok(())
    }

    fn unpack_bundle(&self) -> Result<()> {
        let bundle = self.layout.bundle_path();
        extract_zip(bundle, self.layout.apiproxy_dir())?;
        std::fs::remove_file(bundle)
            .with_context(|| format!("Failed to remove bundle: {}", bundle.display()))?;
        Ok(())
    }
}

impl<C: ResourceClient> ProxyPuller for Pull<C> {
    fn get_apiproxy_files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        list_files(directory, &[])
    }

    fn get_keyvaluemap_dependencies(&self, files: &[PathBuf]) -> Result<Vec<String>> {
        scanner::keyvaluemap_dependencies(files)
    }

    async fn export_keyvaluemap_dependencies(
        &self,
        names: &[String],
        force: bool,
    ) -> Result<Vec<ExportedDependency>> {
        export::export_dependencies(
            &self.client,
            DependencyKind::KeyValueMap,
            &self.config.environment,
            self.layout.keyvaluemaps_dir(),
            names,
            force,
        )
        .await
    }

    fn get_targetserver_dependencies(&self, files: &[PathBuf]) -> Result<Vec<String>> {
        scanner::targetserver_dependencies(files)
    }

    async fn export_targetserver_dependencies(
        &self,
        names: &[String],
        force: bool,
    ) -> Result<Vec<ExportedDependency>> {
        export::export_dependencies(
            &self.client,
            DependencyKind::TargetServer,
            &self.config.environment,
            self.layout.targetservers_dir(),
            names,
            force,
        )
        .await
    }

    fn prefix_strings_in_files(
        &self,
        files: &[PathBuf],
        strings: &[String],
        prefix: &str,
    ) -> Result<Vec<PathBuf>> {
        rewrite::prefix_strings_in_files(files, strings, prefix)
    }

    fn prefix_dependencies_in_work_tree(
        &self,
        dependencies: &[String],
        prefix: &str,
    ) -> Result<Vec<PathBuf>> {
        rewrite::prefix_dependencies_in_work_tree(self.layout.work_tree(), dependencies, prefix)
    }

    fn get_apiproxy_basepath(&self, directory: &Path) -> Result<BasePath> {
        rewrite::get_apiproxy_basepath(directory)
    }

    fn set_apiproxy_basepath(&self, basepath: &str, file: &Path) -> Result<BasePathChange> {
        rewrite::set_apiproxy_basepath(basepath, file)
    }

    async fn pull(&self, options: PullOptions) -> Result<PullReport> {
        self.enter(PullStage::Start);
        let mut dependencies = vec![self.config.api_name.clone()];
        dependencies.extend(options.dependencies.iter().cloned());

        self.fetch_bundle(options.force).await?;
        self.enter(PullStage::BundleFetched);

        self.unpack_bundle()?;
        self.enter(PullStage::Unpacked);

        let files = self.get_apiproxy_files(&self.layout.apiproxy_dir().join(APIPROXY_DIR))?;
        let keyvaluemaps = self.get_keyvaluemap_dependencies(&files)?;
        let targetservers = self.get_targetserver_dependencies(&files)?;
        debug!(files = files.len(), ?keyvaluemaps, ?targetservers, "Scanned bundle");
        self.enter(PullStage::Scanned);

        let exported_keyvaluemaps =
            self.export_keyvaluemap_dependencies(&keyvaluemaps, options.force).await?;
        dependencies.extend(keyvaluemaps);
        let exported_targetservers =
            self.export_targetserver_dependencies(&targetservers, options.force).await?;
        dependencies.extend(targetservers);
        self.enter(PullStage::DependenciesExported);

        let mut prefixed_files = Vec::new();
        if let Some(prefix) = options.prefix.as_deref().filter(|prefix| !prefix.is_empty()) {
            let names = export::dedup_names(&dependencies);
            prefixed_files = self.prefix_dependencies_in_work_tree(&names, prefix)?;
            self.enter(PullStage::Prefixed);
        }

        let mut basepath = None;
        if let Some(requested) = options.basepath.as_deref() {
            let current = self.get_apiproxy_basepath(self.layout.apiproxy_dir())?;
            basepath = Some(self.set_apiproxy_basepath(requested, &current.file)?);
            self.enter(PullStage::BasePathSet);
        }

        self.enter(PullStage::Done);
        Ok(PullReport {
            apiproxy_dir: self.layout.apiproxy_dir().to_path_buf(),
            keyvaluemaps: exported_keyvaluemaps,
            targetservers: exported_targetservers,
            prefixed_files,
            basepath,
        })
    }
}
