// Record keys with a total order and an order-preserving byte encoding.
//
// Encoded form: one tag byte per key, then
//   Number/Date: 8 bytes, sign-flipped IEEE-754 big-endian
//   String/Binary: bytes with 0x00 escaped as 0x00 0xFF, terminated by 0x00 0x00
//   Array: encoded elements, terminated by 0x00
// so bytewise comparison of encodings equals `Key` ordering.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

const TAG_NUMBER: u8 = 0x10;
const TAG_DATE: u8 = 0x20;
const TAG_STRING: u8 = 0x30;
const TAG_BINARY: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;
const END: u8 = 0x00;
const ESCAPE: u8 = 0xFF;

const DATE_FIELD: &str = "$date";
const BINARY_FIELD: &str = "$binary";
const NUMBER_FIELD: &str = "$number";
const INFINITY_TEXT: &str = "Infinity";
const NEG_INFINITY_TEXT: &str = "-Infinity";

/// A record key.
///
/// Keys of different types order as Number < Date < String < Binary < Array.
/// `NaN` is not a valid number or date; `-0.0` is the same key as `0.0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Key {
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    pub fn number(value: f64) -> Result<Self, Error> {
        let key = Key::Number(value);
        key.validate()?;
        Ok(key)
    }

    pub fn date_ms(ms: f64) -> Result<Self, Error> {
        let key = Key::Date(ms);
        key.validate()?;
        Ok(key)
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Key::Binary(bytes.into())
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Key::Number(value) | Key::Date(value) if value.is_nan() => {
                Err(Error::new(ErrorKind::Usage).with_message("NaN is not a valid key"))
            }
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        self.validate()?;
        let mut out = Vec::with_capacity(16);
        self.encode_into(&mut out);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut pos = 0;
        let key = decode_at(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(corrupt("trailing bytes after key"));
        }
        Ok(key)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Key::Number(value) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&sortable_f64(*value));
            }
            Key::Date(ms) => {
                out.push(TAG_DATE);
                out.extend_from_slice(&sortable_f64(*ms));
            }
            Key::String(text) => {
                out.push(TAG_STRING);
                escape_bytes(text.as_bytes(), out);
            }
            Key::Binary(bytes) => {
                out.push(TAG_BINARY);
                escape_bytes(bytes, out);
            }
            Key::Array(items) => {
                out.push(TAG_ARRAY);
                for item in items {
                    item.encode_into(out);
                }
                out.push(END);
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => TAG_NUMBER,
            Key::Date(_) => TAG_DATE,
            Key::String(_) => TAG_STRING,
            Key::Binary(_) => TAG_BINARY,
            Key::Array(_) => TAG_ARRAY,
        }
    }
}

fn normalize(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

fn sortable_f64(value: f64) -> [u8; 8] {
    let bits = normalize(value).to_bits();
    let bits = if bits >> 63 == 0 {
        bits | (1 << 63)
    } else {
        !bits
    };
    bits.to_be_bytes()
}

fn unsortable_f64(bytes: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(bytes);
    let bits = if bits >> 63 == 1 {
        bits & !(1 << 63)
    } else {
        !bits
    };
    f64::from_bits(bits)
}

fn escape_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        out.push(byte);
        if byte == END {
            out.push(ESCAPE);
        }
    }
    out.push(END);
    out.push(END);
}

fn unescape_bytes(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    loop {
        let byte = *bytes.get(*pos).ok_or_else(|| corrupt("unterminated key bytes"))?;
        *pos += 1;
        if byte != END {
            out.push(byte);
            continue;
        }
        let marker = *bytes.get(*pos).ok_or_else(|| corrupt("unterminated key bytes"))?;
        *pos += 1;
        match marker {
            END => return Ok(out),
            ESCAPE => out.push(END),
            _ => return Err(corrupt("invalid escape in key bytes")),
        }
    }
}

fn decode_at(bytes: &[u8], pos: &mut usize) -> Result<Key, Error> {
    let tag = *bytes.get(*pos).ok_or_else(|| corrupt("empty key"))?;
    *pos += 1;
    match tag {
        TAG_NUMBER | TAG_DATE => {
            let end = *pos + 8;
            let raw: [u8; 8] = bytes
                .get(*pos..end)
                .and_then(|slice| slice.try_into().ok())
                .ok_or_else(|| corrupt("truncated numeric key"))?;
            *pos = end;
            let value = unsortable_f64(raw);
            Ok(if tag == TAG_NUMBER {
                Key::Number(value)
            } else {
                Key::Date(value)
            })
        }
        TAG_STRING => {
            let raw = unescape_bytes(bytes, pos)?;
            let text = String::from_utf8(raw).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("string key is not utf-8")
                    .with_source(err)
            })?;
            Ok(Key::String(text))
        }
        TAG_BINARY => Ok(Key::Binary(unescape_bytes(bytes, pos)?)),
        TAG_ARRAY => {
            let mut items = Vec::new();
            loop {
                match bytes.get(*pos) {
                    Some(&END) => {
                        *pos += 1;
                        return Ok(Key::Array(items));
                    }
                    Some(_) => items.push(decode_at(bytes, pos)?),
                    None => return Err(corrupt("unterminated array key")),
                }
            }
        }
        other => Err(corrupt(format!("unknown key tag 0x{other:02x}"))),
    }
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) | (Key::Date(a), Key::Date(b)) => {
                normalize(*a).total_cmp(&normalize(*b))
            }
            (Key::String(a), Key::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Key::Number(value) | Key::Date(value) => normalize(*value).to_bits().hash(state),
            Key::String(text) => text.hash(state),
            Key::Binary(bytes) => bytes.hash(state),
            Key::Array(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Number(value) => match serde_json::Number::from_f64(*value) {
                Some(number) => Value::Number(number),
                None => tagged(NUMBER_FIELD, non_finite_json(*value)),
            },
            Key::Date(ms) => tagged(DATE_FIELD, float_json(*ms)),
            Key::String(text) => Value::String(text.clone()),
            Key::Binary(bytes) => tagged(BINARY_FIELD, Value::String(to_hex(bytes))),
            Key::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
        }
    }
}

fn tagged(field: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_string(), value);
    Value::Object(map)
}

/// JSON numbers cannot carry infinities; those travel as `"Infinity"` / `"-Infinity"`.
fn float_json(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| non_finite_json(value))
}

fn non_finite_json(value: f64) -> Value {
    if value.is_nan() {
        return Value::Null;
    }
    let text = if value.is_sign_negative() {
        NEG_INFINITY_TEXT
    } else {
        INFINITY_TEXT
    };
    Value::String(text.to_string())
}

fn float_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) if text == INFINITY_TEXT => Some(f64::INFINITY),
        Value::String(text) if text == NEG_INFINITY_TEXT => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        Value::from(&key)
    }
}

impl TryFrom<&Value> for Key {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(number) => {
                let value = number.as_f64().ok_or_else(|| invalid_key(value))?;
                Key::number(value)
            }
            Value::String(text) => Ok(Key::String(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Key::Array),
            Value::Object(map) if map.len() == 1 => {
                if let Some(ms) = map.get(DATE_FIELD) {
                    let ms = float_from_json(ms).ok_or_else(|| invalid_key(value))?;
                    return Key::date_ms(ms);
                }
                if let Some(number) = map.get(NUMBER_FIELD) {
                    let number = float_from_json(number).ok_or_else(|| invalid_key(value))?;
                    return Key::number(number);
                }
                if let Some(hex) = map.get(BINARY_FIELD).and_then(Value::as_str) {
                    return from_hex(hex).map(Key::Binary).ok_or_else(|| invalid_key(value));
                }
                Err(invalid_key(value))
            }
            _ => Err(invalid_key(value)),
        }
    }
}

impl TryFrom<Value> for Key {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Key::try_from(&value)
    }
}

fn invalid_key(value: &Value) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("not a valid key: {value}"))
        .with_hint(
            "Keys are numbers, strings, arrays, {\"$number\": \"Infinity\"}, {\"$date\": ms} or {\"$binary\": hex}.",
        )
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::String(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Number(f64::from(value))
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::Key;
    use crate::core::error::ErrorKind;
    use serde_json::json;

    fn sample_keys() -> Vec<Key> {
        vec![
            Key::Number(f64::NEG_INFINITY),
            Key::Number(-10.5),
            Key::Number(-1.0),
            Key::Number(0.0),
            Key::Number(0.25),
            Key::Number(3.0),
            Key::Number(1e300),
            Key::Number(f64::INFINITY),
            Key::Date(-1.0),
            Key::Date(1_700_000_000_000.0),
            Key::from(""),
            Key::from("a"),
            Key::from("a\0"),
            Key::from("a\0b"),
            Key::from("ab"),
            Key::from("b"),
            Key::from("\u{ff}"),
            Key::binary(vec![]),
            Key::binary(vec![0]),
            Key::binary(vec![0, 0]),
            Key::binary(vec![1]),
            Key::binary(vec![0xff, 0xff]),
            Key::Array(vec![]),
            Key::Array(vec![Key::from(1)]),
            Key::Array(vec![Key::from(1), Key::from("x")]),
            Key::Array(vec![Key::from("a")]),
            Key::Array(vec![Key::from("a"), Key::from(1)]),
            Key::Array(vec![Key::from("a\0")]),
            Key::Array(vec![Key::Array(vec![])]),
        ]
    }

    #[test]
    fn encoding_preserves_key_order() {
        let keys = sample_keys();
        for pair in keys.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a < b, "{a} should sort before {b}");
            let (ea, eb) = (a.encode().expect("encode"), b.encode().expect("encode"));
            assert!(ea < eb, "encoding of {a} should sort before {b}");
        }
    }

    #[test]
    fn decode_inverts_encode() {
        for key in sample_keys() {
            let bytes = key.encode().expect("encode");
            assert_eq!(Key::decode(&bytes).expect("decode"), key);
        }
    }

    #[test]
    fn negative_zero_is_zero() {
        let neg = Key::Number(-0.0);
        let pos = Key::Number(0.0);
        assert_eq!(neg, pos);
        assert_eq!(neg.encode().expect("encode"), pos.encode().expect("encode"));
    }

    #[test]
    fn nan_is_rejected() {
        let err = Key::number(f64::NAN).expect_err("nan");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let nested = Key::Array(vec![Key::from(1), Key::Date(f64::NAN)]);
        assert_eq!(nested.encode().expect_err("nan").kind(), ErrorKind::Usage);
    }

    #[test]
    fn truncated_bytes_are_corrupt() {
        let bytes = Key::from("abc").encode().expect("encode");
        let err = Key::decode(&bytes[..bytes.len() - 1]).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = Key::decode(&[0x99]).expect_err("tag");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn json_forms() {
        let key: Key = serde_json::from_value(json!(["KX", 7, {"$date": 86400000}, {"$binary": "00ff"}]))
            .expect("key");
        assert_eq!(
            key,
            Key::Array(vec![
                Key::from("KX"),
                Key::from(7),
                Key::Date(86_400_000.0),
                Key::binary(vec![0x00, 0xff]),
            ])
        );
        let back = serde_json::to_value(&key).expect("json");
        assert_eq!(back, json!(["KX", 7.0, {"$date": 86400000.0}, {"$binary": "00ff"}]));
    }

    #[test]
    fn infinities_survive_json() {
        let keys = [
            Key::Number(f64::INFINITY),
            Key::Number(f64::NEG_INFINITY),
            Key::Date(f64::INFINITY),
            Key::Date(f64::NEG_INFINITY),
        ];
        for key in keys {
            let value = serde_json::to_value(&key).expect("json");
            assert!(!value.is_null(), "{key:?} lost in json");
            let back: Key = serde_json::from_value(value).expect("key");
            assert_eq!(back, key);
        }
        assert_eq!(
            serde_json::to_value(Key::Number(f64::NEG_INFINITY)).expect("json"),
            json!({"$number": "-Infinity"})
        );
        assert_eq!(
            serde_json::to_value(Key::Date(f64::INFINITY)).expect("json"),
            json!({"$date": "Infinity"})
        );
    }

    #[test]
    fn invalid_json_keys_are_usage_errors() {
        for value in [
            json!(null),
            json!(true),
            json!({"a": 1}),
            json!({"$binary": "0g"}),
            json!({"$number": "NaN"}),
            json!({"$date": "soon"}),
        ] {
            let err = Key::try_from(&value).expect_err("invalid");
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }
}
