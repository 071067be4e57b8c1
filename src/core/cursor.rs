// Ordered key cursor: one step per call, resuming strictly after (or before) the last key.
use std::ops::Bound;

use crate::core::error::{engine_error, Error};
use crate::core::range::{bounds_are_empty, EncodedRange};
use crate::core::table::RecordsTable;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Next,
    /// Descending; primary keys are unique so every position is distinct.
    PrevUnique,
}

#[derive(Debug)]
pub struct Cursor {
    range: EncodedRange,
    direction: Direction,
    position: Option<Vec<u8>>,
    exhausted: bool,
}

impl Cursor {
    pub(crate) fn new(range: EncodedRange, direction: Direction) -> Self {
        Self {
            range,
            direction,
            position: None,
            exhausted: false,
        }
    }

    /// Encoded key at the current position, if the cursor has moved.
    pub fn position(&self) -> Option<&[u8]> {
        self.position.as_deref()
    }

    /// Move to the next key in range; `None` once the range is exhausted.
    pub(crate) fn advance(&mut self, table: &RecordsTable) -> Result<Option<Vec<u8>>, Error> {
        if self.exhausted {
            return Ok(None);
        }

        let (lower, upper) = self.window();
        if bounds_are_empty(lower, upper) {
            self.exhausted = true;
            return Ok(None);
        }

        let mut range = table
            .range::<&[u8]>((lower, upper))
            .map_err(|err| engine_error("failed to open cursor", err))?;
        let entry = match self.direction {
            Direction::Next => range.next(),
            Direction::PrevUnique => range.next_back(),
        };
        let key = match entry {
            Some(Ok((key, _))) => key.value().to_vec(),
            Some(Err(err)) => return Err(engine_error("failed to advance cursor", err)),
            None => {
                self.exhausted = true;
                return Ok(None);
            }
        };

        self.position = Some(key.clone());
        Ok(Some(key))
    }

    fn window(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let lower = self.range.lower.as_ref().map(Vec::as_slice);
        let upper = self.range.upper.as_ref().map(Vec::as_slice);
        match (&self.position, self.direction) {
            (None, _) => (lower, upper),
            (Some(at), Direction::Next) => (Bound::Excluded(at.as_slice()), upper),
            (Some(at), Direction::PrevUnique) => (lower, Bound::Excluded(at.as_slice())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cursor, Direction};
    use crate::core::key::Key;
    use crate::core::range::{EncodedRange, KeyRange};
    use crate::core::record::encode_record;
    use crate::core::table::{Table, TableOptions};
    use serde_json::json;

    fn table_with(keys: &[Key]) -> (tempfile::TempDir, Table) {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = Table::open(&dir.path().join("c.tablekv"), TableOptions::default()).expect("open");
        table
            .write(|records| {
                for key in keys {
                    let encoded = key.encode()?;
                    let bytes = encode_record(key, &json!(null))?;
                    records
                        .insert(encoded.as_slice(), bytes.as_slice())
                        .map_err(|err| crate::core::error::engine_error("insert", err))?;
                }
                Ok(())
            })
            .expect("write");
        (dir, table)
    }

    fn drain(table: &Table, range: Option<KeyRange>, direction: Direction) -> Vec<Key> {
        let records = table.read().expect("read");
        let encoded = EncodedRange::from_range(range.as_ref()).expect("range");
        let mut cursor = Cursor::new(encoded, direction);
        let mut out = Vec::new();
        while let Some(key) = cursor.advance(&records).expect("advance") {
            assert_eq!(cursor.position(), Some(key.as_slice()));
            out.push(Key::decode(&key).expect("decode"));
        }
        assert!(cursor.advance(&records).expect("advance").is_none());
        out
    }

    #[test]
    fn walks_forward_and_backward() {
        let keys: Vec<Key> = (0..5).map(Key::from).collect();
        let (_dir, table) = table_with(&keys);

        assert_eq!(drain(&table, None, Direction::Next), keys);
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_eq!(drain(&table, None, Direction::PrevUnique), reversed);
    }

    #[test]
    fn respects_bounds_in_both_directions() {
        let keys: Vec<Key> = (0..10).map(Key::from).collect();
        let (_dir, table) = table_with(&keys);
        let range = KeyRange::bound(Key::from(2), Key::from(6), true, false);

        let forward = drain(&table, Some(range.clone()), Direction::Next);
        assert_eq!(forward, vec![Key::from(3), Key::from(4), Key::from(5), Key::from(6)]);
        let backward = drain(&table, Some(range), Direction::PrevUnique);
        assert_eq!(backward, vec![Key::from(6), Key::from(5), Key::from(4), Key::from(3)]);
    }

    #[test]
    fn inverted_range_yields_nothing() {
        let keys: Vec<Key> = (0..3).map(Key::from).collect();
        let (_dir, table) = table_with(&keys);
        let range = KeyRange::bound(Key::from(2), Key::from(1), false, false);
        assert!(drain(&table, Some(range), Direction::Next).is_empty());
    }

    #[test]
    fn empty_table_yields_nothing() {
        let (_dir, table) = table_with(&[]);
        assert!(drain(&table, None, Direction::PrevUnique).is_empty());
    }
}
