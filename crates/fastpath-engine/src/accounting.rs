//! Shared byte accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A byte counter owned by the external accounting subsystem.
///
/// Entries hold [`Weak`] references to the counter, so an entry can detect
/// that the owner released the counter instead of writing through a dangling
/// reference. Callers are still expected to delete entries before releasing
/// the counters they point at; the weak handle just makes the other order
/// survivable.
#[derive(Debug, Default)]
pub struct ByteCounter {
    bytes: AtomicU64,
}

impl ByteCounter {
    /// Creates a fresh counter, returning the owning handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds forwarded bytes to the counter.
    pub fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns the accumulated byte count.
    pub fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Adds bytes through a weak counter reference, if the owner still holds it.
pub(crate) fn account(counter: &Weak<ByteCounter>, bytes: u64) {
    if let Some(counter) = counter.upgrade() {
        counter.add(bytes);
    }
}
