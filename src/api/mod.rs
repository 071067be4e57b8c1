//! Purpose: Define the stable public Rust API boundary for tablekv.
//! Exports: Store handle, key and range types, read streaming, batches, and errors.
//! Role: Public, additive-only surface; hides the engine and cursor internals.
//! Invariants: This module is the only public path to storage primitives.
//! Invariants: Engine types never appear in public signatures.

mod batch;
mod client;
mod observer;
mod read;
mod store;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::key::Key;
pub use crate::core::range::{KeyRange, RangeBound, RangeOptions, build_range};
pub use crate::core::record::Record;
pub use crate::store_paths::{STORE_DIR_ENV, STORE_EXTENSION, default_store_dir};
pub use batch::BatchOp;
pub use client::{ApiResult, DEFAULT_READ_CAPACITY, LocalClient, StoreInfo, StoreOptions, StoreRef};
pub use observer::ErrorObserver;
pub use read::{ReadEvent, ReadOptions, ReadStream};
pub use store::Store;
