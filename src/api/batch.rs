//! Purpose: Apply a list of puts and deletes atomically.
//! Exports: `BatchOp`.
//! Role: JSON-decodable write operations shared by the API and the CLI `batch` command.
//! Invariants: All operations commit together or none do; list order is preserved.
//! Invariants: Unrecognized operation types are skipped, never rejected.
#![allow(clippy::result_large_err)]

use super::client::ApiResult;
use super::store::Store;
use crate::core::error::{Error, engine_error};
use crate::core::key::Key;
use crate::core::record::encode_record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One write in a batch, decoded from `{"type": "put" | "del", "key": .., "value": ..}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOp {
    Put {
        key: Key,
        #[serde(default)]
        value: Value,
    },
    Del {
        key: Key,
    },
    #[serde(other)]
    Unknown,
}

impl BatchOp {
    pub fn put(key: impl Into<Key>, value: Value) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    pub fn del(key: impl Into<Key>) -> Self {
        Self::Del { key: key.into() }
    }
}

enum Prepared {
    Put(Vec<u8>, Vec<u8>),
    Del(Vec<u8>),
}

impl Store {
    /// Apply `ops` in order inside one write transaction.
    pub async fn batch(&self, ops: Vec<BatchOp>) -> ApiResult<()> {
        let mut prepared = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    let encoded = self.encode_key(&key)?;
                    let bytes = encode_record(&key, &value).map_err(|err| err.with_key(&key))?;
                    prepared.push(Prepared::Put(encoded, bytes));
                }
                BatchOp::Del { key } => prepared.push(Prepared::Del(self.encode_key(&key)?)),
                BatchOp::Unknown => {
                    tracing::debug!(store = %self.name(), "skipping unknown batch op");
                }
            }
        }

        self.run("batch", move |table| {
            table.write(|records| {
                for op in &prepared {
                    match op {
                        Prepared::Put(key, bytes) => {
                            records
                                .insert(key.as_slice(), bytes.as_slice())
                                .map_err(|err| batch_error("failed to write record", err))?;
                        }
                        Prepared::Del(key) => {
                            records
                                .remove(key.as_slice())
                                .map_err(|err| batch_error("failed to delete record", err))?;
                        }
                    }
                }
                Ok(())
            })
        })
        .await
    }
}

fn batch_error(context: &str, err: redb::StorageError) -> Error {
    engine_error(context, err).with_hint("No operation in the batch was applied.")
}
