//! Utility functions shared across apigee modules.

pub mod fs;

pub use fs::{atomic_write, ensure_dir, extract_zip, list_files, prepare_dir, resolve_path};
