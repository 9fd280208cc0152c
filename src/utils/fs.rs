//! File system helpers for the pull work tree.
//!
//! Everything here is synchronous and blocking. Writes that replace existing
//! content go through [`atomic_write`] so an interrupted pull never leaves a
//! half-written file behind.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::ApigeeError;

/// Create `path` and all missing parents.
///
/// Succeeds if the directory already exists; fails if `path` exists but is
/// not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Atomically replace the contents of `path` with `content`.
///
/// The bytes go to a temporary file in the same directory, are synced, and the
/// temporary file is then renamed over `path`. Readers see either the old or
/// the new content, never a mix.
///
/// A replaced file keeps its permissions. A new file gets the same default
/// permissions as `File::create`.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = tempfile::Builder::new()
        .make_in(parent, |temp_path| {
            fs::OpenOptions::new().write(true).create_new(true).open(temp_path)
        })
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;

    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    if let Ok(existing) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(existing.permissions())
            .with_context(|| format!("Failed to copy permissions of: {}", path.display()))?;
    }
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;

    temp.persist(path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| {
        format!(
            "Failed to expand path: {path}\n\n\
            Check for undefined environment variables (use $VAR or ${{VAR}})"
        )
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Create `path` (with parents) and return its canonical absolute form.
pub fn prepare_dir(path: &Path) -> Result<PathBuf> {
    ensure_dir(path)?;
    path.canonicalize()
        .with_context(|| format!("Failed to resolve directory: {}", path.display()))
}

/// Recursively list every regular file under `root`, in file-name order.
///
/// Entries whose name appears in `skip_names` are pruned, whether they are
/// directories or files (a submodule's `.git` is a file). Symlinks are not
/// followed. A missing `root` yields an empty list.
pub fn list_files(root: &Path, skip_names: &[&str]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !skip_names.iter().any(|skip| entry.file_name() == *skip)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Expand the zip archive at `archive` into `destination`.
///
/// Entry paths are kept as stored, so a proxy bundle lands as
/// `<destination>/apiproxy/...`. Existing files are truncated and rewritten.
/// An entry whose path would escape `destination` fails the extraction.
pub fn extract_zip(archive: &Path, destination: &Path) -> Result<()> {
    let archive_error = |reason: String| ApigeeError::ArchiveError {
        path: archive.display().to_string(),
        reason,
    };

    let file = fs::File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;

    ensure_dir(destination)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| archive_error(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(archive_error(format!("unsafe entry path '{}'", entry.name())).into());
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            ensure_dir(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        let mut out = fs::File::create(&target)
            .with_context(|| format!("Failed to create file: {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract: {}", target.display()))?;
    }

    tracing::debug!(
        archive = %archive.display(),
        destination = %destination.display(),
        entries = zip.len(),
        "Extracted archive"
    );
    Ok(())
}
