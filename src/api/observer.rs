//! Purpose: Per-handle error observation for transport-level failures.
//! Exports: `ErrorObserver`.
//! Role: Observability tap passed through `StoreOptions`; never alters results.
//! Invariants: Invoked once per surfaced engine/transport error, never for `NotFound`.

use crate::core::error::Error;

/// Receives every transport-level error a store handle surfaces, alongside the returned `Err`.
///
/// Closures of the shape `Fn(&str, &Error)` implement this trait; the first argument is
/// the store name.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, store: &str, err: &Error);
}

impl<F> ErrorObserver for F
where
    F: Fn(&str, &Error) + Send + Sync,
{
    fn on_error(&self, store: &str, err: &Error) {
        self(store, err)
    }
}
