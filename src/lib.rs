//! Purpose: Embedded ordered key-value store over JSON values, backed by one file per store.
//! Exports: `api` (store handle, reads, batches, errors) and `core` (keys, ranges, cursor, table).
//! Role: Library backing the `tablekv` CLI and tests.
//! Invariants: Keys sort by type tag first (number < date < string < binary < array).
//! Invariants: Every engine call happens on a blocking worker, never on an async task.
pub mod api;
pub mod core;
mod store_paths;
