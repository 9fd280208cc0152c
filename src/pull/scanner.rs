//! Dependency discovery over an unpacked proxy bundle.
//!
//! Every file is tried as an XML document. Files that cannot be read, are not
//! valid UTF-8, or are not well-formed XML (JavaScript resources, jars,
//! properties files) are skipped silently. Two rules run over each parsed document:
//!
//! - a root element `KeyValueMapOperations` contributes its `mapIdentifier`
//! - every `Server` element anywhere in the document contributes its `name`
//!
//! A matching element that lacks the attribute is a defect in the exported
//! configuration and fails the scan with [`ApigeeError::ConfigurationDefect`].
//! Results keep file-visit order and may contain duplicates.

use anyhow::Result;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::core::ApigeeError;

const KEYVALUEMAP_ROOT: &str = "KeyValueMapOperations";
const KEYVALUEMAP_ATTRIBUTE: &str = "mapIdentifier";
const SERVER_ELEMENT: &str = "Server";
const SERVER_ATTRIBUTE: &str = "name";

/// Key-value map names referenced by `KeyValueMapOperations` policies in `files`.
pub fn keyvaluemap_dependencies(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut keyvaluemaps = Vec::new();
    for file in files {
        let Some(text) = read_candidate(file) else {
            continue;
        };
        let Ok(doc) = roxmltree::Document::parse(&text) else {
            debug!(file = %file.display(), "Not XML, skipping");
            continue;
        };

        let root = doc.root_element();
        if root.has_tag_name(KEYVALUEMAP_ROOT) {
            let name = root.attribute(KEYVALUEMAP_ATTRIBUTE).ok_or_else(|| {
                defect(file, format!("{KEYVALUEMAP_ROOT} has no {KEYVALUEMAP_ATTRIBUTE} attribute"))
            })?;
            keyvaluemaps.push(checked_name(file, name)?);
        }
    }
    Ok(keyvaluemaps)
}

/// Target server names referenced by `Server` elements in `files`.
pub fn targetserver_dependencies(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut targetservers = Vec::new();
    for file in files {
        let Some(text) = read_candidate(file) else {
            continue;
        };
        let Ok(doc) = roxmltree::Document::parse(&text) else {
            debug!(file = %file.display(), "Not XML, skipping");
            continue;
        };

        for server in doc.descendants().filter(|node| node.has_tag_name(SERVER_ELEMENT)) {
            let name = server.attribute(SERVER_ATTRIBUTE).ok_or_else(|| {
                defect(file, format!("{SERVER_ELEMENT} has no {SERVER_ATTRIBUTE} attribute"))
            })?;
            targetservers.push(checked_name(file, name)?);
        }
    }
    Ok(targetservers)
}

/// File contents as text, or `None` for directories, unreadable files and
/// non-UTF-8 files.
fn read_candidate(file: &Path) -> Option<String> {
    if file.is_dir() {
        return None;
    }
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(file = %file.display(), error = %e, "Unreadable, skipping");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            debug!(file = %file.display(), "Not UTF-8, skipping");
            None
        }
    }
}

// Dependency names become file names under the work tree
fn checked_name(file: &Path, name: &str) -> Result<String> {
    let mut components = Path::new(name).components();
    let plain = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !name.contains(['/', '\\']);
    if !plain {
        return Err(defect(file, format!("'{name}' is not usable as a file name")));
    }
    Ok(name.to_string())
}

fn defect(file: &Path, reason: String) -> anyhow::Error {
    ApigeeError::ConfigurationDefect {
        file: file.display().to_string(),
        reason,
    }
    .into()
}
