//! `apigee pull`: export a proxy revision and its dependencies into a work tree.
//!
//! ```bash
//! # Pull revision 3 of "orders" with the key-value maps and target servers of "test"
//! apigee pull --name orders --environment test --revision 3
//!
//! # Pull whatever revision is deployed to "test", renaming every dependency
//! apigee pull -n orders -e test --prefix test- --basepath /v1/test-orders
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::client::{ManagementClient, ResourceClient};
use crate::config::ApigeeConfig;
use crate::core::ApigeeError;
use crate::pull::{ProxyPuller, Pull, PullConfig, PullOptions, PullReport};
use crate::utils::resolve_path;

#[derive(Args, Debug)]
pub struct PullCommand {
    /// API proxy name
    #[arg(short, long)]
    name: String,

    /// Environment to read key-value maps and target servers from
    #[arg(short, long)]
    environment: String,

    /// Revision to export
    ///
    /// Defaults to the revision currently deployed to the environment.
    #[arg(short, long)]
    revision: Option<u32>,

    /// Organization, overriding the config file and APIGEE_ORG
    #[arg(short, long)]
    org: Option<String>,

    /// Directory receiving the proxy and its dependencies (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    work_tree: Option<String>,

    /// Extra names to include when prefixing
    #[arg(short, long, num_args = 1.., value_name = "NAME")]
    dependencies: Vec<String>,

    /// Overwrite files left by an earlier pull
    #[arg(short, long)]
    force: bool,

    /// Prefix applied to the proxy name and every dependency reference
    #[arg(short, long)]
    prefix: Option<String>,

    /// New base path for the proxy's default endpoint
    #[arg(short, long)]
    basepath: Option<String>,
}

impl PullCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config = ApigeeConfig::load(config_path).await?.with_org(self.org.clone());
        let client = ManagementClient::new(&config)?;
        let org = client.org().to_string();
        self.execute_with_client(client, org).await
    }

    /// Run the pull through `client`.
    pub async fn execute_with_client<C: ResourceClient>(
        self,
        client: C,
        org: String,
    ) -> Result<()> {
        let work_tree = match &self.work_tree {
            Some(dir) => resolve_path(dir)?,
            None => std::env::current_dir()?,
        };

        let revision = match self.revision {
            Some(revision) => revision,
            None => resolve_deployed_revision(&client, &self.name, &self.environment).await?,
        };

        let pull = Pull::new(
            client,
            PullConfig {
                org,
                api_name: self.name,
                revision,
                environment: self.environment,
                work_tree,
            },
        )?;

        let report = pull
            .pull(PullOptions {
                dependencies: self.dependencies,
                force: self.force,
                prefix: self.prefix,
                basepath: self.basepath,
            })
            .await?;

        print_report(pull.config().work_tree.as_path(), &report);
        Ok(())
    }
}

/// Revision of `api` deployed to `environment`.
pub async fn resolve_deployed_revision<C: ResourceClient>(
    client: &C,
    api: &str,
    environment: &str,
) -> Result<u32> {
    let deployments = client.list_deployments(api).await?;
    let revision =
        deployments.deployed_revision(environment).ok_or_else(|| ApigeeError::ConfigError {
            message: format!(
                "no revision of '{api}' is deployed to '{environment}'; pass --revision"
            ),
        })?;
    info!(api, environment, revision, "Resolved deployed revision");
    Ok(revision)
}

fn relative(work_tree: &Path, path: &Path) -> String {
    path.strip_prefix(work_tree).unwrap_or(path).display().to_string()
}

fn print_report(work_tree: &Path, report: &PullReport) {
    println!("{} {}", "Pulled".green().bold(), relative(work_tree, &report.apiproxy_dir));
    for exported in report.keyvaluemaps.iter().chain(&report.targetservers) {
        let kind = exported.kind.to_string();
        println!("  {} {}", kind.dimmed(), relative(work_tree, &exported.path));
    }
    for file in &report.prefixed_files {
        println!("{}  {}", "M".yellow(), relative(work_tree, file));
    }
    if let Some(change) = &report.basepath {
        println!("{} {} -> {}", "BasePath".cyan(), change.old, change.new.bold());
    }
}
