//! Purpose: Async store handle with point operations over one database file.
//! Exports: `Store`.
//! Role: Runs every engine call on a blocking worker and reports surfaced errors.
//! Invariants: Each operation runs in its own transaction and resolves exactly once.
//! Invariants: Handles are immutable after open; clones share one database.
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, StoreOptions, StoreRef, open_table};
use crate::core::error::{Error, ErrorKind, engine_error};
use crate::core::key::Key;
use crate::core::record::encode_record;
use crate::core::table::Table;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) name: String,
    pub(crate) table: Table,
    pub(crate) options: StoreOptions,
}

impl Store {
    /// Open (or create) the named store.
    ///
    /// An `Err` here is fatal for the handle: nothing retries or repairs the file.
    pub async fn open(store_ref: impl Into<StoreRef>, options: StoreOptions) -> ApiResult<Self> {
        let store_ref = store_ref.into();
        let name = store_ref.describe();
        let path = store_ref.resolve_local_path(options.store_dir())?;

        let table = {
            let options = options.clone();
            let path = path.clone();
            blocking(move || open_table(&path, &options)).await
        };
        match table {
            Ok(table) => {
                tracing::debug!(store = %name, path = %path.display(), "opened store");
                Ok(Self {
                    inner: Arc::new(Inner {
                        name,
                        table,
                        options,
                    }),
                })
            }
            Err(err) => {
                tracing::error!(store = %name, error = %err, "failed to open store");
                options.notify(&name, &err);
                Err(err)
            }
        }
    }

    /// Irreversibly delete the named store's database file.
    pub async fn drop_store(store_ref: impl Into<StoreRef>, options: StoreOptions) -> ApiResult<()> {
        let store_ref = store_ref.into();
        let name = store_ref.describe();
        let path = store_ref.resolve_local_path(options.store_dir())?;
        let target = path.clone();
        let result = blocking(move || Table::destroy(&target)).await;
        match &result {
            Ok(()) => tracing::debug!(store = %name, path = %path.display(), "dropped store"),
            Err(err) => {
                tracing::warn!(store = %name, error = %err, "drop failed");
                options.notify(&name, err);
            }
        }
        result
    }

    /// Release this handle. The file stays locked until every clone is gone.
    pub fn close(self) {
        tracing::debug!(store = %self.inner.name, "closed handle");
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        self.inner.table.path()
    }

    pub async fn count(&self) -> ApiResult<u64> {
        self.run("count", |table| table.count()).await
    }

    pub async fn has(&self, key: &Key) -> ApiResult<bool> {
        let encoded = self.encode_key(key)?;
        self.run("has", move |table| table.contains(&encoded)).await
    }

    /// Value stored under `key`; `ErrorKind::NotFound` when absent.
    pub async fn get(&self, key: &Key) -> ApiResult<Value> {
        let encoded = self.encode_key(key)?;
        let shown = key.clone();
        self.run("get", move |table| match table.get(&encoded)? {
            Some(record) => Ok(record.value),
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message("key not found")
                .with_key(shown)),
        })
        .await
    }

    /// Insert or replace the value under `key`.
    pub async fn put(&self, key: Key, value: Value) -> ApiResult<()> {
        let encoded = self.encode_key(&key)?;
        let bytes = encode_record(&key, &value).map_err(|err| err.with_key(&key))?;
        self.run("put", move |table| {
            table.write(|records| {
                records
                    .insert(encoded.as_slice(), bytes.as_slice())
                    .map_err(|err| engine_error("failed to write record", err))?;
                Ok(())
            })
        })
        .await
    }

    /// Remove `key` if present.
    pub async fn del(&self, key: &Key) -> ApiResult<()> {
        let encoded = self.encode_key(key)?;
        self.run("del", move |table| {
            table.write(|records| {
                records
                    .remove(encoded.as_slice())
                    .map_err(|err| engine_error("failed to delete record", err))?;
                Ok(())
            })
        })
        .await
    }

    pub async fn clear(&self) -> ApiResult<()> {
        self.run("clear", |table| table.clear()).await
    }

    pub(crate) fn encode_key(&self, key: &Key) -> ApiResult<Vec<u8>> {
        key.encode().map_err(|err| err.with_key(key))
    }

    /// Run `op` against the table on a blocking worker and report any surfaced error.
    pub(crate) async fn run<R, F>(&self, op: &'static str, apply: F) -> ApiResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Table) -> ApiResult<R> + Send + 'static,
    {
        tracing::debug!(store = %self.inner.name, op, "store op");
        let inner = Arc::clone(&self.inner);
        let result = blocking(move || apply(&inner.table)).await;
        if let Err(err) = &result {
            self.report(op, err);
        }
        result
    }

    pub(crate) fn report(&self, op: &str, err: &Error) {
        if err.is_not_found() {
            return;
        }
        tracing::warn!(store = %self.inner.name, op, kind = ?err.kind(), error = %err, "store op failed");
        self.inner.options.notify(&self.inner.name, err);
    }
}

pub(crate) async fn blocking<R, F>(work: F) -> ApiResult<R>
where
    R: Send + 'static,
    F: FnOnce() -> ApiResult<R> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(Error::new(ErrorKind::Internal)
            .with_message("store worker failed")
            .with_source(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use crate::api::client::StoreOptions;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::key::Key;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn options(dir: &tempfile::TempDir) -> StoreOptions {
        StoreOptions::new().with_store_dir(dir.path())
    }

    #[tokio::test]
    async fn point_ops_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open("points", options(&dir)).await.expect("open");
        let key = Key::from("a");

        store.put(key.clone(), json!({"n": 1})).await.expect("put");
        assert_eq!(store.get(&key).await.expect("get"), json!({"n": 1}));
        assert!(store.has(&key).await.expect("has"));
        assert_eq!(store.count().await.expect("count"), 1);

        store.put(key.clone(), json!(2)).await.expect("overwrite");
        assert_eq!(store.get(&key).await.expect("get"), json!(2));
        assert_eq!(store.count().await.expect("count"), 1);

        store.del(&key).await.expect("del");
        store.del(&key).await.expect("del missing");
        assert!(!store.has(&key).await.expect("has"));
        let err = store.get(&key).await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.key(), Some("\"a\""));
    }

    #[tokio::test]
    async fn not_found_is_not_observed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = move |store: &str, err: &Error| {
            if let Ok(mut seen) = sink.lock() {
                seen.push((store.to_string(), err.kind()));
            }
        };
        let store = Store::open("quiet", options(&dir).with_observer(Arc::new(observer)))
            .await
            .expect("open");
        store.get(&Key::from("x")).await.expect_err("missing");
        assert!(seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn nan_key_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open("nan", options(&dir)).await.expect("open");
        let err = store
            .put(Key::Number(f64::NAN), json!(1))
            .await
            .expect_err("nan");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
