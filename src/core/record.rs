// Stored record shape: `{"key": <key>, "value": <value>}` as JSON bytes.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::key::Key;

/// Name of the primary-key field inside a stored record.
pub const PRIMARY_KEY_FIELD: &str = "key";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub value: Value,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    key: &'a Key,
    value: &'a Value,
}

pub(crate) fn encode_record(key: &Key, value: &Value) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(&RecordRef { key, value }).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to encode record")
            .with_key(key)
            .with_source(err)
    })
}

/// Decode a stored record and check it belongs under `stored_key`.
pub(crate) fn decode_record(stored_key: &[u8], bytes: &[u8]) -> Result<Record, Error> {
    let record: Record = serde_json::from_slice(bytes).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("invalid record json")
            .with_source(err)
    })?;
    if record.key.encode()? != stored_key {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message("record key does not match its position")
            .with_key(&record.key));
    }
    Ok(record)
}
