//! Purpose: Shared local store-directory and store-name path resolution helpers.
//! Exports: `default_store_dir` and `resolve_named_store_path`.
//! Role: Keep CLI and API-client path semantics aligned from one source.
//! Invariants: Default store directory is `$TABLEKV_DIR`, else `~/.tablekv/stores`.
//! Invariants: Named store refs must be non-empty and must not contain path separators.

use std::path::{Path, PathBuf};

pub const STORE_EXTENSION: &str = "tablekv";
pub const STORE_DIR_ENV: &str = "TABLEKV_DIR";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StoreNameResolveError {
    Empty,
    ContainsPathSeparator,
}

pub fn default_store_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(STORE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".tablekv").join("stores")
}

pub fn resolve_named_store_path(
    name: &str,
    store_dir: &Path,
) -> Result<PathBuf, StoreNameResolveError> {
    if name.is_empty() {
        return Err(StoreNameResolveError::Empty);
    }
    if name.contains('/') || (cfg!(windows) && name.contains('\\')) {
        return Err(StoreNameResolveError::ContainsPathSeparator);
    }
    if name.ends_with(&format!(".{STORE_EXTENSION}")) {
        return Ok(store_dir.join(name));
    }
    Ok(store_dir.join(format!("{name}.{STORE_EXTENSION}")))
}

/// Store name for a file in the store directory, if it carries the store extension.
pub fn store_name_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(STORE_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}
