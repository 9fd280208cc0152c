//! Export of discovered dependencies into the work tree.
//!
//! Each dependency is written verbatim to
//! `<work_tree>/<kind dir>/<environment>/<name>`. Without `force`, every
//! destination of a kind is checked before the first fetch of that kind, so a
//! conflicting file stops the pull before any request for that kind is made.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::ResourceClient;
use crate::constants::{KEYVALUEMAPS_DIR, TARGETSERVERS_DIR};
use crate::core::ApigeeError;
use crate::utils::{atomic_write, ensure_dir};

/// The environment-scoped resources a proxy can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A key-value map read by `KeyValueMapOperations` policies.
    KeyValueMap,
    /// A target server referenced from a load balancer.
    TargetServer,
}

impl DependencyKind {
    /// Work-tree directory holding this kind.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::KeyValueMap => KEYVALUEMAPS_DIR,
            Self::TargetServer => TARGETSERVERS_DIR,
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyValueMap => f.write_str("KeyValueMap"),
            Self::TargetServer => f.write_str("TargetServer"),
        }
    }
}

/// One dependency written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDependency {
    /// Resource kind
    pub kind: DependencyKind,
    /// Resource name
    pub name: String,
    /// File holding the fetched body
    pub path: PathBuf,
}

/// Drop repeated names, keeping the first occurrence of each.
#[must_use]
pub fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names.iter().filter(|name| seen.insert(name.as_str())).cloned().collect()
}

/// Destination path of every name, failing on the first existing one unless `force`.
pub fn plan_destinations(
    destination_dir: &Path,
    names: &[String],
    force: bool,
) -> Result<Vec<(String, PathBuf)>> {
    let planned: Vec<(String, PathBuf)> =
        names.iter().map(|name| (name.clone(), destination_dir.join(name))).collect();

    if !force
        && let Some((_, existing)) = planned.iter().find(|(_, path)| path.exists())
    {
        return Err(ApigeeError::path_exists(existing).into());
    }
    Ok(planned)
}

/// Fetch every dependency of `kind` in `environment` and write it under `destination_dir`.
///
/// Names are de-duplicated first. Nothing written is rolled back if a later
/// fetch fails.
pub async fn export_dependencies<C: ResourceClient>(
    client: &C,
    kind: DependencyKind,
    environment: &str,
    destination_dir: &Path,
    names: &[String],
    force: bool,
) -> Result<Vec<ExportedDependency>> {
    ensure_dir(destination_dir)?;

    let planned = plan_destinations(destination_dir, &dedup_names(names), force)?;

    let mut exported = Vec::with_capacity(planned.len());
    for (name, path) in planned {
        info!(%kind, name = %name, path = %path.display(), "Pulling dependency");

        let body = match kind {
            DependencyKind::KeyValueMap => client.get_keyvaluemap(environment, &name).await?,
            DependencyKind::TargetServer => client.get_targetserver(environment, &name).await?,
        };
        atomic_write(&path, body.as_bytes())?;
        debug!(%kind, name = %name, bytes = body.len(), "Wrote dependency");

        exported.push(ExportedDependency {
            kind,
            name,
            path,
        });
    }
    Ok(exported)
}
