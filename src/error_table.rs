//! # Error Side Table
//!
//! Errors referenced from the event ring carry only an opaque `u64`
//! handle; the payload itself lives here, in an ordinary allocation kept
//! entirely off the realtime path. The event processor is the sole
//! consumer: it looks a handle up, hands the error to the delegate, and
//! releases the entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::EngineError;

/// Concurrent map from an atomically incremented handle to a deferred
/// [`EngineError`] payload.
///
/// Only ever written to by the decoder worker (the sole producer of
/// `Error` events) and drained by the event processor, so the mutex here
/// is held only for the instant of an insert or a take — never while
/// decoding or dispatching to a delegate.
pub struct ErrorTable {
    next_handle: AtomicU64,
    entries: Mutex<HashMap<u64, EngineError>>,
}

impl ErrorTable {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `error` and returns the handle to reference it by.
    pub fn insert(&self, error: EngineError) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(handle, error);
        handle
    }

    /// Removes and returns the error for `handle`, if it is still present.
    pub fn take(&self, handle: u64) -> Option<EngineError> {
        self.entries.lock().remove(&handle)
    }

    /// Number of entries awaiting consumption.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_take_round_trips() {
        let table = ErrorTable::new();
        let handle = table.insert(EngineError::DecodeFailed("boom".into()));
        assert_eq!(table.len(), 1);
        let error = table.take(handle).unwrap();
        assert!(matches!(error, EngineError::DecodeFailed(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn handles_are_unique_and_increasing() {
        let table = ErrorTable::new();
        let a = table.insert(EngineError::InternalError("a".into()));
        let b = table.insert(EngineError::InternalError("b".into()));
        assert!(b > a);
    }

    #[test]
    fn take_on_unknown_handle_returns_none() {
        let table = ErrorTable::new();
        assert!(table.take(42).is_none());
    }
}
