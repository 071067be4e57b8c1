//! Purpose: Define the public client surface for local store resolution and lifecycle.
//! Exports: `StoreRef`, `StoreOptions`, `StoreInfo`, `LocalClient`.
//! Role: Stable boundary for callers and the CLI; mirrors CLI resolution rules.
//! Invariants: Store names resolve to `<store_dir>/<name>.tablekv`.
//! Invariants: Configuration is passed explicitly; there is no process-wide state.

use super::observer::ErrorObserver;
use super::store::Store;
use crate::core::error::{map_io_error_kind, Error, ErrorKind};
use crate::core::table::{Table, TableOptions};
use crate::store_paths::{
    default_store_dir, resolve_named_store_path, store_name_from_path, StoreNameResolveError,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_READ_CAPACITY: usize = 64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreRef {
    Name(String),
    Path(PathBuf),
}

impl StoreRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn describe(&self) -> String {
        match self {
            StoreRef::Name(name) => name.clone(),
            StoreRef::Path(path) => path.to_string_lossy().to_string(),
        }
    }

    pub(crate) fn resolve_local_path(&self, store_dir: &Path) -> ApiResult<PathBuf> {
        match self {
            StoreRef::Name(name) => {
                resolve_named_store_path(name, store_dir).map_err(map_store_name_resolve_error)
            }
            StoreRef::Path(path) => Ok(path.clone()),
        }
    }
}

impl From<&str> for StoreRef {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<String> for StoreRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&StoreRef> for StoreRef {
    fn from(store_ref: &StoreRef) -> Self {
        store_ref.clone()
    }
}

#[derive(Clone)]
pub struct StoreOptions {
    store_dir: PathBuf,
    cache_size: Option<usize>,
    read_capacity: usize,
    observer: Option<Arc<dyn ErrorObserver>>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            store_dir: default_store_dir(),
            cache_size: None,
            read_capacity: DEFAULT_READ_CAPACITY,
            observer: None,
        }
    }

    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.store_dir = store_dir.into();
        self
    }

    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Number of scanned records buffered ahead of a slow `ReadStream` consumer.
    pub fn with_read_capacity(mut self, capacity: usize) -> Self {
        self.read_capacity = capacity.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn read_capacity(&self) -> usize {
        self.read_capacity
    }

    pub(crate) fn table_options(&self) -> TableOptions {
        TableOptions {
            cache_size: self.cache_size,
        }
    }

    pub(crate) fn notify(&self, store: &str, err: &Error) {
        if let Some(observer) = &self.observer {
            observer.on_error(store, err);
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("store_dir", &self.store_dir)
            .field("cache_size", &self.cache_size)
            .field("read_capacity", &self.read_capacity)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreInfo {
    pub name: String,
    pub path: PathBuf,
    pub file_size: u64,
}

#[derive(Clone, Debug, Default)]
pub struct LocalClient {
    options: StoreOptions,
}

impl LocalClient {
    pub fn new() -> Self {
        Self {
            options: StoreOptions::new(),
        }
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self { options }
    }

    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.options = self.options.with_store_dir(store_dir);
        self
    }

    pub fn store_dir(&self) -> &Path {
        self.options.store_dir()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub async fn open(&self, store_ref: impl Into<StoreRef>) -> ApiResult<Store> {
        Store::open(store_ref, self.options.clone()).await
    }

    pub async fn drop_store(&self, store_ref: impl Into<StoreRef>) -> ApiResult<()> {
        Store::drop_store(store_ref, self.options.clone()).await
    }

    pub fn store_info(&self, store_ref: impl Into<StoreRef>) -> ApiResult<StoreInfo> {
        let store_ref = store_ref.into();
        let path = store_ref.resolve_local_path(self.store_dir())?;
        info_for_path(store_ref.describe(), &path)
    }

    pub fn list_stores(&self) -> ApiResult<Vec<StoreInfo>> {
        let store_dir = self.store_dir();
        let entries = match std::fs::read_dir(store_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::new(map_io_error_kind(&err))
                    .with_message("failed to read store directory")
                    .with_path(store_dir)
                    .with_source(err));
            }
        };

        let mut stores = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read store directory entry")
                    .with_path(store_dir)
                    .with_source(err)
            })?;
            let path = entry.path();
            let Some(name) = store_name_from_path(&path) else {
                continue;
            };
            stores.push(info_for_path(name, &path)?);
        }
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stores)
    }
}

fn info_for_path(name: String, path: &Path) -> ApiResult<StoreInfo> {
    let metadata = std::fs::metadata(path).map_err(|err| {
        Error::new(map_io_error_kind(&err))
            .with_message("failed to stat store")
            .with_path(path)
            .with_source(err)
    })?;
    Ok(StoreInfo {
        name,
        path: path.to_path_buf(),
        file_size: metadata.len(),
    })
}

pub(crate) fn open_table(path: &Path, options: &StoreOptions) -> ApiResult<Table> {
    Table::open(path, options.table_options())
}

fn map_store_name_resolve_error(err: StoreNameResolveError) -> Error {
    match err {
        StoreNameResolveError::Empty => {
            Error::new(ErrorKind::Usage).with_message("store name must not be empty")
        }
        StoreNameResolveError::ContainsPathSeparator => {
            Error::new(ErrorKind::Usage).with_message("store name must not contain path separators")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalClient, StoreOptions, StoreRef};
    use crate::core::error::ErrorKind;
    use std::path::PathBuf;

    #[test]
    fn store_ref_name_resolves_extension() {
        let dir = PathBuf::from(".scratch/stores");
        let path = StoreRef::name("chat").resolve_local_path(&dir).expect("path");
        assert_eq!(path, PathBuf::from(".scratch/stores/chat.tablekv"));
    }

    #[test]
    fn store_ref_path_is_used_verbatim() {
        let dir = PathBuf::from(".scratch/stores");
        let path = StoreRef::path("/tmp/x.db").resolve_local_path(&dir).expect("path");
        assert_eq!(path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn store_ref_name_rejects_slash() {
        let dir = PathBuf::from(".scratch/stores");
        let err = StoreRef::name("foo/bar")
            .resolve_local_path(&dir)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn read_capacity_is_at_least_one() {
        let options = StoreOptions::new().with_read_capacity(0);
        assert_eq!(options.read_capacity(), 1);
    }

    #[test]
    fn missing_store_dir_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_store_dir(temp.path().join("absent"));
        assert!(client.list_stores().expect("list").is_empty());
    }

    #[test]
    fn store_info_of_missing_store_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_store_dir(temp.path());
        let err = client.store_info("nope").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
