// Core modules: key model, ranges, cursor, storage handle, and error modeling.
pub mod cursor;
pub mod error;
pub mod key;
pub mod range;
pub mod record;
pub mod table;
