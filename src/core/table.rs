// Database file handle: creation, per-operation transactions, and deletion.
use std::fmt;
use std::path::{Path, PathBuf};

use redb::{Database, ReadOnlyTable, ReadableTableMetadata, TableDefinition};

use crate::core::error::{engine_error, map_io_error_kind, Error, ErrorKind};
use crate::core::record::{decode_record, Record};

/// The single records table in every database file, keyed by encoded `Key` bytes.
pub(crate) const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

pub(crate) type RecordsTable = ReadOnlyTable<&'static [u8], &'static [u8]>;
pub(crate) type RecordsTableMut<'txn> = redb::Table<'txn, &'static [u8], &'static [u8]>;

#[derive(Clone, Copy, Debug, Default)]
pub struct TableOptions {
    /// Engine page cache size in bytes; engine default when unset.
    pub cache_size: Option<usize>,
}

pub struct Table {
    db: Database,
    path: PathBuf,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("path", &self.path).finish()
    }
}

impl Table {
    /// Open the database at `path`, creating the file and its records table on first use.
    pub fn open(path: &Path, options: TableOptions) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    Error::new(map_io_error_kind(&err))
                        .with_message("failed to create store directory")
                        .with_path(parent)
                        .with_source(err)
                })?;
            }
        }

        let mut builder = Database::builder();
        if let Some(cache_size) = options.cache_size {
            builder.set_cache_size(cache_size);
        }
        let db = builder
            .create(path)
            .map_err(|err| engine_error("failed to open database", err).with_path(path))?;

        let table = Self {
            db,
            path: path.to_path_buf(),
        };
        if table.ensure_records_table()? {
            tracing::debug!(path = %path.display(), "created records table");
        }
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_records_table(&self) -> Result<bool, Error> {
        let exists = {
            let txn = self.db.begin_read().map_err(|err| self.fail("failed to begin read", err))?;
            match txn.open_table(RECORDS) {
                Ok(_) => true,
                Err(redb::TableError::TableDoesNotExist(_)) => false,
                Err(err) => return Err(self.fail("failed to open records table", err)),
            }
        };
        if exists {
            return Ok(false);
        }
        self.write(|_| Ok(()))?;
        Ok(true)
    }

    /// Open the records table in a fresh read-only transaction.
    pub(crate) fn read(&self) -> Result<RecordsTable, Error> {
        let txn = self
            .db
            .begin_read()
            .map_err(|err| self.fail("failed to begin read transaction", err))?;
        txn.open_table(RECORDS)
            .map_err(|err| self.fail("failed to open records table", err))
    }

    /// Run `apply` inside one read-write transaction; commit on `Ok`, abort on `Err`.
    pub(crate) fn write<R>(
        &self,
        apply: impl FnOnce(&mut RecordsTableMut<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let txn = self
            .db
            .begin_write()
            .map_err(|err| self.fail("failed to begin write transaction", err))?;
        let result = {
            let mut table = txn
                .open_table(RECORDS)
                .map_err(|err| self.fail("failed to open records table", err))?;
            apply(&mut table)
        };
        match result {
            Ok(value) => {
                txn.commit()
                    .map_err(|err| self.fail("failed to commit transaction", err))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "abort after failed write also failed");
                }
                Err(err)
            }
        }
    }

    pub(crate) fn count(&self) -> Result<u64, Error> {
        let table = self.read()?;
        table
            .len()
            .map_err(|err| self.fail("failed to count records", err))
    }

    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Record>, Error> {
        let table = self.read()?;
        read_record(&table, key).map_err(|err| err.with_path(&self.path))
    }

    pub(crate) fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        let table = self.read()?;
        let found = table
            .get(key)
            .map_err(|err| self.fail("failed to read record", err))?;
        Ok(found.is_some())
    }

    /// Remove every record, keeping the (recreated) records table.
    pub(crate) fn clear(&self) -> Result<(), Error> {
        let txn = self
            .db
            .begin_write()
            .map_err(|err| self.fail("failed to begin write transaction", err))?;
        txn.delete_table(RECORDS)
            .map_err(|err| self.fail("failed to delete records table", err))?;
        txn.open_table(RECORDS)
            .map_err(|err| self.fail("failed to recreate records table", err))?;
        txn.commit()
            .map_err(|err| self.fail("failed to commit transaction", err))
    }

    /// Delete the database file at `path`. A missing file is not an error.
    pub fn destroy(path: &Path) -> Result<(), Error> {
        if !path.exists() {
            return Ok(());
        }
        match Database::open(path) {
            Ok(db) => drop(db),
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                return Err(Error::new(ErrorKind::Busy)
                    .with_message("delete blocked: database is still open")
                    .with_hint("Close every handle to the store before dropping it.")
                    .with_path(path));
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "deleting unreadable database");
            }
        }
        std::fs::remove_file(path).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to delete database")
                .with_path(path)
                .with_source(err)
        })
    }

    fn fail(&self, context: &str, err: impl Into<redb::Error>) -> Error {
        engine_error(context, err).with_path(&self.path)
    }
}

/// Point lookup of the full record stored under `key`.
pub(crate) fn read_record(table: &RecordsTable, key: &[u8]) -> Result<Option<Record>, Error> {
    let guard = table
        .get(key)
        .map_err(|err| engine_error("failed to read record", err))?;
    match guard {
        Some(bytes) => decode_record(key, bytes.value()).map(Some),
        None => Ok(None),
    }
}
