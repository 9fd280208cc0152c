//! Literal text rewriting across the work tree.
//!
//! Two passes share one primitive, [`rewrite_file`]: a file is read whole, rewritten only when
//! the text actually changes, and written back atomically. Files that are not
//! valid UTF-8 are never touched.
//!
//! - **Prefixing** renames dependency references, `<name>` becoming
//!   `<prefix><name>`, in every file of the work tree outside `.git`.
//! - **Base path** swaps the text of the `BasePath` element in
//!   `apiproxy/proxies/default.xml`.
//!
//! # Prefixing rules
//!
//! Each file is scanned once, left to right. At every position:
//!
//! 1. an occurrence that already reads `<prefix><name>` is copied unchanged
//! 2. otherwise the longest name starting there is replaced by `<prefix><name>`
//!
//! Replacement output is never scanned again, so with names `kvm1` and `kvm10`
//! the text `kvm10` becomes `test-kvm10` (never `test-kvm1` + `0`), and running
//! the pass twice gives the same result as running it once.

use anyhow::{Context, Result};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{DEFAULT_PROXY_ENDPOINT, VCS_METADATA_NAMES};
use crate::core::ApigeeError;
use crate::pull::export::dedup_names;
use crate::utils::{atomic_write, list_files};

const BASEPATH_ELEMENT: &str = "BasePath";

/// The `BasePath` currently configured for a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath {
    /// Text of the `BasePath` element
    pub value: String,
    /// File it was read from
    pub file: PathBuf,
}

/// Outcome of a base-path rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePathChange {
    /// Rewritten file
    pub file: PathBuf,
    /// Previous value
    pub old: String,
    /// Requested value
    pub new: String,
}

/// Rewrite `file` with the text `edit` returns for its current contents.
///
/// Both rewriting passes go through here. `edit` returns `None` to leave the
/// file alone. Files that are not valid UTF-8 are skipped without calling
/// `edit`. Returns whether the file was rewritten.
pub fn rewrite_file(
    file: &Path,
    edit: impl FnOnce(&str) -> Result<Option<String>>,
) -> Result<bool> {
    let Some(body) = read_text(file)? else {
        return Ok(false);
    };
    match edit(&body)? {
        Some(rewritten) if rewritten != body => {
            atomic_write(file, rewritten.as_bytes())?;
            debug!(file = %file.display(), "Rewrote file");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Names that still need prefixing, longest first.
///
/// Drops empty names, duplicates and names already starting with `prefix`.
#[must_use]
pub fn pending_names(dependencies: &[String], prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = dedup_names(dependencies)
        .into_iter()
        .filter(|name| !name.is_empty() && !name.starts_with(prefix))
        .collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    names
}

/// Apply the prefixing rules to `text`; `None` when nothing changes.
///
/// `names` must be ordered longest first, as [`pending_names`] returns them.
#[must_use]
pub fn prefix_text(text: &str, names: &[String], prefix: &str) -> Option<String> {
    if names.is_empty() || !names.iter().any(|name| text.contains(name.as_str())) {
        return None;
    }

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut rest = text;

    'scan: while !rest.is_empty() {
        if let Some(after_prefix) = rest.strip_prefix(prefix) {
            for name in names {
                if after_prefix.starts_with(name.as_str()) {
                    let len = prefix.len() + name.len();
                    out.push_str(&rest[..len]);
                    rest = &rest[len..];
                    continue 'scan;
                }
            }
        }

        for name in names {
            if let Some(after) = rest.strip_prefix(name.as_str()) {
                out.push_str(prefix);
                out.push_str(name);
                rest = after;
                changed = true;
                continue 'scan;
            }
        }

        let step = rest.chars().next().map_or(1, char::len_utf8);
        out.push_str(&rest[..step]);
        rest = &rest[step..];
    }

    changed.then_some(out)
}

/// Prefix `strings` in each of `files`; returns the files that were rewritten.
pub fn prefix_strings_in_files(
    files: &[PathBuf],
    strings: &[String],
    prefix: &str,
) -> Result<Vec<PathBuf>> {
    let names = pending_names(strings, prefix);
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut modified = Vec::new();
    for file in files {
        if rewrite_file(file, |body| Ok(prefix_text(body, &names, prefix)))? {
            info!(file = %file.display(), "M  {}", file.display());
            modified.push(file.clone());
        }
    }
    Ok(modified)
}

/// Prefix `dependencies` in every file under `work_tree`, skipping VCS metadata.
pub fn prefix_dependencies_in_work_tree(
    work_tree: &Path,
    dependencies: &[String],
    prefix: &str,
) -> Result<Vec<PathBuf>> {
    let names = pending_names(dependencies, prefix);
    info!(dependencies = ?names, prefix, "Prefixing dependencies");

    let files = list_files(work_tree, VCS_METADATA_NAMES)?;
    prefix_strings_in_files(&files, &names, prefix)
}

/// Read the `BasePath` of the default proxy endpoint under `directory`.
pub fn get_apiproxy_basepath(directory: &Path) -> Result<BasePath> {
    let file = directory.join(DEFAULT_PROXY_ENDPOINT);
    let body = read_endpoint(&file)?;
    let (value, _) = locate_basepath(&file, &body)?;
    Ok(BasePath {
        value,
        file,
    })
}

/// Replace the text of the `BasePath` element in `file` with `basepath`.
///
/// Only the element's text changes; every other byte of the file is kept.
pub fn set_apiproxy_basepath(basepath: &str, file: &Path) -> Result<BasePathChange> {
    let mut previous = None;
    rewrite_file(file, |body| {
        let (current, range) = locate_basepath(file, body)?;
        let rewritten = (current != basepath).then(|| {
            let mut spliced = String::with_capacity(body.len() + basepath.len());
            spliced.push_str(&body[..range.start]);
            spliced.push_str(&escape_text(basepath));
            spliced.push_str(&body[range.end..]);
            spliced
        });
        previous = Some(current);
        Ok(rewritten)
    })?;
    let current = previous.ok_or_else(|| not_utf8(file))?;

    info!(file = %file.display(), "{current} -> {basepath}");
    Ok(BasePathChange {
        file: file.to_path_buf(),
        old: current,
        new: basepath.to_string(),
    })
}

/// Text of the first `BasePath` element and the byte range of that text in `body`.
fn locate_basepath(file: &Path, body: &str) -> Result<(String, Range<usize>)> {
    let doc = roxmltree::Document::parse(body).map_err(|e| ApigeeError::ConfigurationDefect {
        file: file.display().to_string(),
        reason: format!("not well-formed XML: {e}"),
    })?;

    doc.descendants()
        .find(|node| node.has_tag_name(BASEPATH_ELEMENT))
        .and_then(|element| element.children().find(|child| child.is_text()))
        .and_then(|text| text.text().map(|value| (value.to_string(), text.range())))
        .ok_or_else(|| {
            ApigeeError::ConfigurationDefect {
                file: file.display().to_string(),
                reason: format!("no {BASEPATH_ELEMENT} found"),
            }
            .into()
        })
}

fn read_endpoint(file: &Path) -> Result<String> {
    read_text(file)?.ok_or_else(|| not_utf8(file))
}

fn not_utf8(file: &Path) -> anyhow::Error {
    ApigeeError::ConfigurationDefect {
        file: file.display().to_string(),
        reason: "not valid UTF-8".to_string(),
    }
    .into()
}

fn read_text(file: &Path) -> Result<Option<String>> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            debug!(file = %file.display(), "Not UTF-8, ignoring");
            Ok(None)
        }
    }
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
