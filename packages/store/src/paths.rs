#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` data directory.
//!
//! All paths are relative to the project root's `data/` directory unless
//! `COUNCIL_DIVERSITY_DB` points somewhere else.

use std::path::{Path, PathBuf};

/// Environment variable overriding the diversity database location.
pub const DB_PATH_ENV: &str = "COUNCIL_DIVERSITY_DB";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`; falls back to the
/// current directory if the manifest is not nested as expected.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the diversity `DuckDB` file.
///
/// Honors [`DB_PATH_ENV`] when set and non-empty.
#[must_use]
pub fn diversity_db_path() -> PathBuf {
    match std::env::var(DB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => data_dir().join("diversity.duckdb"),
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_under_project_root() {
        assert!(data_dir().starts_with(project_root()));
        assert!(data_dir().ends_with("data"));
    }

    #[test]
    fn ensure_dir_ignores_empty_parent() {
        // `Path::new("file.duckdb").parent()` is the empty path.
        ensure_dir(Path::new("")).unwrap();
    }
}
